//! Byte-oriented wire access.
//!
//! Concrete transports:
//! - serial ports (USB CDC and UART bridges), opened exclusively
//! - TCP sockets (`socket://host:port`, e.g. telnet-style WebREPL bridges)
//!
//! The reader thread and the exec engine need independent halves, so the
//! wire is surfaced as a [`WireRead`]/[`WireWrite`] pair cloned from one
//! underlying handle.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use crate::config::{LinkConfig, READ_TIMEOUT};
use crate::error::{Error, Result};

/// Read half of a wire. Owned by the reader thread once it starts.
pub trait WireRead: Send {
    /// Read up to `buf.len()` bytes. `Ok(0)` means the read window
    /// elapsed without data; hard transport failures are errors.
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Throw away whatever is pending on the wire. Serial ports clear
    /// their input buffer; sockets read until silent.
    fn discard_input(&mut self) -> Result<()>;
}

/// Write half of a wire. Owned by the exec engine; surrendered to the
/// terminal passthrough by `stop()`.
pub trait WireWrite: Send {
    fn write_all(&mut self, data: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

// ── Serial ───────────────────────────────────────────────────

struct SerialHalf {
    port: Box<dyn serialport::SerialPort>,
}

impl WireRead for SerialHalf {
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn discard_input(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }
}

impl WireWrite for SerialHalf {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        Write::write_all(&mut self.port, data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Write::flush(&mut self.port)?;
        Ok(())
    }
}

// ── TCP ──────────────────────────────────────────────────────

struct TcpHalf {
    stream: TcpStream,
}

impl WireRead for TcpHalf {
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn discard_input(&mut self) -> Result<()> {
        // sockets have no clear-buffer call, read until silent instead
        self.stream
            .set_read_timeout(Some(Duration::from_millis(20)))?;
        let mut buf = [0u8; 4096];
        loop {
            match self.read_some(&mut buf) {
                Ok(0) => break,
                Ok(n) => log::trace!("drained {n} stale bytes"),
                Err(e) => {
                    self.stream.set_read_timeout(Some(READ_TIMEOUT))?;
                    return Err(e);
                }
            }
        }
        self.stream.set_read_timeout(Some(READ_TIMEOUT))?;
        Ok(())
    }
}

impl WireWrite for TcpHalf {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        Write::write_all(&mut self.stream, data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Write::flush(&mut self.stream)?;
        Ok(())
    }
}

// ── Port URL resolution ──────────────────────────────────────

/// Open the configured port and return the read/write halves.
///
/// `socket://host:port` connects a TCP stream; `hwgrep://<pattern>` scans
/// the available serial ports; anything else is taken as a device path.
pub fn open_wire(config: &LinkConfig) -> Result<(Box<dyn WireRead>, Box<dyn WireWrite>)> {
    if let Some(addr) = config.port.strip_prefix("socket://") {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        stream.set_nodelay(true)?;
        let read = TcpHalf {
            stream: stream.try_clone()?,
        };
        let write = TcpHalf { stream };
        return Ok((Box::new(read), Box::new(write)));
    }

    let device = if let Some(pattern) = config.port.strip_prefix("hwgrep://") {
        find_port(pattern)?
    } else {
        config.port.clone()
    };

    log::debug!("opening {device} at {} baud", config.baudrate);
    let port = serialport::new(&device, config.baudrate)
        .timeout(READ_TIMEOUT)
        .open()?;
    let read = SerialHalf {
        port: port.try_clone()?,
    };
    let write = SerialHalf { port };
    Ok((Box::new(read), Box::new(write)))
}

/// Find the first serial port whose description matches `pattern`
/// (case-insensitive substring over device name, VID:PID and the USB
/// product / manufacturer / serial strings).
fn find_port(pattern: &str) -> Result<String> {
    let needle = pattern.to_ascii_lowercase();
    let ports = serialport::available_ports()?;
    for info in ports {
        if port_description(&info).to_ascii_lowercase().contains(&needle) {
            return Ok(info.port_name);
        }
    }
    Err(Error::PortNotFound(pattern.to_string()))
}

fn port_description(info: &serialport::SerialPortInfo) -> String {
    match &info.port_type {
        serialport::SerialPortType::UsbPort(usb) => format!(
            "{} USB VID:PID={:04X}:{:04X} {} {} {}",
            info.port_name,
            usb.vid,
            usb.pid,
            usb.product.as_deref().unwrap_or(""),
            usb.manufacturer.as_deref().unwrap_or(""),
            usb.serial_number.as_deref().unwrap_or(""),
        ),
        _ => info.port_name.clone(),
    }
}

// ── Login sub-protocol ───────────────────────────────────────

/// Wait until the exact `prompt` bytes appear on the wire.
///
/// Used for the `Login as: ` / `Password: ` handshake of socket tunneled
/// boards, before the reader thread exists.
pub fn wait_for_prompt(read: &mut dyn WireRead, prompt: &[u8], deadline: Duration) -> Result<()> {
    let end = Instant::now() + deadline;
    let mut window: Vec<u8> = Vec::new();
    let mut buf = [0u8; 256];
    while Instant::now() < end {
        let n = read.read_some(&mut buf)?;
        if n == 0 {
            continue;
        }
        window.extend_from_slice(&buf[..n]);
        if window.windows(prompt.len()).any(|w| w == prompt) {
            return Ok(());
        }
        // only the tail can still complete the prompt
        if window.len() > prompt.len() {
            window.drain(..window.len() - prompt.len());
        }
    }
    Err(Error::Timeout)
}

// ── Tests ────────────────────────────────────────────────────
