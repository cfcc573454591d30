//! Board-level operations: filesystem statistics, the real-time clock
//! and raw flash dumps.
//!
//! These live on the connection handle rather than on a path — they
//! describe the device, not a file.

use std::collections::VecDeque;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::error::{Error, Result};
use crate::literal::quote_str;
use crate::repl::{MpyRepl, ReplCore};

use super::path::BLOCK_SIZE;
use super::stat::VfsStat;

impl MpyRepl {
    /// Filesystem statistics for the mount containing `path`.
    pub fn statvfs(&self, path: &str) -> Result<VfsStat> {
        let value = self.evaluate(&format!(
            "import os; print(os.statvfs({}))",
            quote_str(path)
        ))?;
        VfsStat::from_tuple(&value)
    }

    /// Read the board's RTC as wall time.
    ///
    /// The board returns `(year, month, day, weekday, hour, minute,
    /// second, subsecond)` where the subsecond field counts *down* from
    /// 255 in 1/256-second units.
    pub fn read_rtc(&self) -> Result<NaiveDateTime> {
        let value = self.evaluate("import pyb; print(pyb.RTC().datetime())")?;
        let items = value.items()?;
        if items.len() != 8 {
            return Err(Error::Literal(format!(
                "RTC tuple has {} fields, expected 8",
                items.len()
            )));
        }
        let field = |i: usize| items[i].as_int();
        let subsecond = field(7)?;
        let micros = (999_999 * (255 - subsecond)) / 256;
        let out_of_range = || Error::Literal("RTC fields out of range".into());
        let date = NaiveDate::from_ymd_opt(field(0)? as i32, field(1)? as u32, field(2)? as u32)
            .ok_or_else(out_of_range)?;
        date.and_hms_micro_opt(
            field(4)? as u32,
            field(5)? as u32,
            field(6)? as u32,
            micros as u32,
        )
        .ok_or_else(out_of_range)
    }

    /// Set the board's RTC.
    ///
    /// Weekday on the wire is 1–7 with Monday as 1; the subsecond field
    /// is the inverse of [`read_rtc`](Self::read_rtc)'s conversion.
    pub fn set_rtc(&self, t: NaiveDateTime) -> Result<()> {
        let micros = i64::from(t.nanosecond() / 1000);
        let subsecond = 255 - (255 * micros) / 999_999;
        self.exec(
            &format!(
                "import pyb; print(pyb.RTC().datetime(({},{},{},{},{},{},{},{})))",
                t.year(),
                t.month(),
                t.day(),
                t.weekday().number_from_monday(),
                t.hour(),
                t.minute(),
                t.second(),
                subsecond,
            ),
            crate::config::EXEC_TIMEOUT,
        )?;
        Ok(())
    }

    /// Set the board's RTC from the host clock.
    pub fn set_rtc_now(&self) -> Result<()> {
        self.set_rtc(chrono::Local::now().naive_local())
    }

    /// The board's `sys.implementation` line, e.g.
    /// `(name='micropython', version=(1, 19, 1))`. Used by board
    /// detection to probe candidate ports.
    pub fn implementation(&self) -> Result<String> {
        let out = self.exec("import sys; print(sys.implementation)", crate::config::EXEC_TIMEOUT)?;
        Ok(out.trim().to_string())
    }

    /// Stream `length` bytes of the internal flash block device starting
    /// at byte offset `start`. A negative `length` dumps to the end of
    /// the device (block count via `ioctl(4, 0)`).
    pub fn read_flash_as_stream(&self, start: u64, length: i64) -> Result<FlashStream> {
        let core = self.core();
        let total_blocks = {
            let value = core.evaluate(
                "import pyb; _bd = pyb.Flash()\nprint(_bd.ioctl(4, 0))",
            )?;
            value.as_int()? as u64
        };
        let device_bytes = total_blocks * BLOCK_SIZE as u64;
        if start > device_bytes {
            return Err(Error::Value(format!(
                "start {start} beyond device end {device_bytes}"
            )));
        }
        let wanted = if length < 0 {
            device_bytes - start
        } else {
            (length as u64).min(device_bytes - start)
        };

        core.exec_default(
            "import ubinascii\n\
             _mem = memoryview(bytearray(512))\n\
             def _rb(block, count):\n\
             \x20 print(\"[\")\n\
             \x20 for i in range(count):\n\
             \x20   _bd.readblocks(block + i, _mem)\n\
             \x20   print(ubinascii.b2a_base64(_mem), \",\")\n\
             \x20 print(\"]\")",
        )?;

        let first_block = start / BLOCK_SIZE as u64;
        let last_block = (start + wanted).div_ceil(BLOCK_SIZE as u64);
        Ok(FlashStream {
            repl: core,
            next_block: first_block,
            blocks_left: last_block - first_block,
            skip: (start % BLOCK_SIZE as u64) as usize,
            bytes_left: wanted,
            blocks_per_batch: u64::from((self.baudrate() / 5120).max(1)),
            pending: VecDeque::new(),
            finished: false,
        })
    }
}

/// Finite lazy sequence of flash content blocks produced by
/// [`MpyRepl::read_flash_as_stream`].
pub struct FlashStream {
    repl: Arc<ReplCore>,
    next_block: u64,
    blocks_left: u64,
    /// Bytes to drop from the first block (unaligned start).
    skip: usize,
    bytes_left: u64,
    blocks_per_batch: u64,
    pending: VecDeque<Vec<u8>>,
    finished: bool,
}

impl FlashStream {
    fn fetch_batch(&mut self) -> Result<()> {
        let count = self.blocks_per_batch.min(self.blocks_left);
        if count == 0 {
            return self.teardown();
        }
        let value = self
            .repl
            .evaluate(&format!("_rb({}, {count})", self.next_block))?;
        self.next_block += count;
        self.blocks_left -= count;
        for block in value.items()? {
            let raw = block.as_bytes()?;
            let trimmed = trim_ascii_end(raw);
            let mut decoded = BASE64
                .decode(trimmed)
                .map_err(|e| Error::Literal(format!("bad base64 block: {e}")))?;
            if self.skip > 0 {
                let skip = self.skip.min(decoded.len());
                decoded.drain(..skip);
                self.skip -= skip;
            }
            if (decoded.len() as u64) > self.bytes_left {
                decoded.truncate(self.bytes_left as usize);
            }
            self.bytes_left -= decoded.len() as u64;
            if !decoded.is_empty() {
                self.pending.push_back(decoded);
            }
        }
        if self.bytes_left == 0 {
            return self.teardown();
        }
        Ok(())
    }

    fn teardown(&mut self) -> Result<()> {
        self.finished = true;
        self.repl.exec_default("del _bd, _rb, _mem")?;
        Ok(())
    }
}

impl Iterator for FlashStream {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(block) = self.pending.pop_front() {
                return Some(Ok(block));
            }
            if self.finished {
                return None;
            }
            if let Err(e) = self.fetch_batch() {
                self.finished = true;
                return Some(Err(e));
            }
        }
    }
}

impl Drop for FlashStream {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.repl.exec_default("del _bd, _rb, _mem") {
                log::debug!("flash stream cleanup failed: {e}");
            }
        }
    }
}

fn trim_ascii_end(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0 && data[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    &data[..end]
}
