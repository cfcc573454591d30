//! Exec engine — drives the raw REPL as a remote-execution transport.
//!
//! **Wire-decoupled**: the engine owns a [`WireWrite`] half and the packet
//! channel fed by the reader thread; any byte transport works. One request
//! is in flight at a time (the session lives behind a mutex — the board
//! cannot pipeline), responses are strictly FIFO, and every response is
//! `OK` + stdout + `\x04` + stderr.
//!
//! A timeout or malformed response leaves the session in an *unknown*
//! state; the next exec resynchronizes first (interrupt, drain, re-enter
//! raw mode) instead of pairing a stale response with a fresh request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::config::{EXEC_TIMEOUT, LinkConfig, MODE_SETTLE, READ_TIMEOUT};
use crate::error::{Error, Result, classify_traceback};
use crate::link::{CTRL_A, CTRL_B, CTRL_C, CTRL_D, ReaderHandle, WireRead, WireWrite, open_wire, reader, wire};
use crate::literal::{self, Value};

/// Poll slice while waiting for a response; keeps interrupt forwarding
/// responsive without spinning.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Window granted to the login prompts of socket tunneled boards.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// In raw mode, synchronized, ready for the next exec.
    Ready,
    /// A timeout or desync happened; resynchronize before the next exec.
    Unknown,
    /// Stopped or closed; the wire is gone.
    Detached,
}

struct Session {
    state: SessionState,
    // rx before reader: drop the receiver first so a send-blocked reader
    // thread can fail out before the join in ReaderHandle::drop
    rx: Option<Receiver<Vec<u8>>>,
    reader: Option<ReaderHandle>,
    writer: Option<Box<dyn WireWrite>>,
}

pub(crate) struct ReplCore {
    session: Mutex<Session>,
    interrupt: Arc<AtomicBool>,
    baudrate: u32,
}

/// Connection handle to a board's raw REPL.
///
/// Cheap to clone; path objects hold a weak reference, so dropping the
/// last `MpyRepl` tears the connection down even while paths are alive.
#[derive(Clone)]
pub struct MpyRepl {
    core: Arc<ReplCore>,
}

impl MpyRepl {
    /// Open the configured port, run the login handshake if credentials
    /// are set, enter raw REPL mode and start the reader thread.
    pub fn connect(config: &LinkConfig) -> Result<Self> {
        let (mut read, mut write) = open_wire(config)?;

        if let Some(user) = &config.user {
            wire::wait_for_prompt(read.as_mut(), b"Login as: ", LOGIN_TIMEOUT)?;
            write.write_all(user.as_bytes())?;
            write.write_all(b"\r\n")?;
        }
        if let Some(password) = &config.password {
            wire::wait_for_prompt(read.as_mut(), b"Password: ", LOGIN_TIMEOUT)?;
            write.write_all(password.as_bytes())?;
            write.write_all(b"\r\n")?;
        }

        // cancel whatever runs, leave then re-enter raw mode, drop the
        // prompt chatter before the framer gets to see the wire
        write.write_all(&[CTRL_C, CTRL_B])?;
        write.flush()?;
        std::thread::sleep(MODE_SETTLE);
        write.write_all(&[CTRL_C, CTRL_A])?;
        write.flush()?;
        std::thread::sleep(MODE_SETTLE);
        read.discard_input()?;

        Self::attach(read, write, config.baudrate)
    }

    /// Adopt a wire that is already sitting at the raw REPL prompt.
    ///
    /// Used for pre-authenticated tunnels and by tests; `connect` is the
    /// entry point that performs the mode dance.
    pub fn attach(
        read: Box<dyn WireRead>,
        write: Box<dyn WireWrite>,
        baudrate: u32,
    ) -> Result<Self> {
        let (reader, rx) = reader::spawn(read)?;
        Ok(Self {
            core: Arc::new(ReplCore {
                session: Mutex::new(Session {
                    state: SessionState::Ready,
                    rx: Some(rx),
                    reader: Some(reader),
                    writer: Some(write),
                }),
                interrupt: Arc::new(AtomicBool::new(false)),
                baudrate,
            }),
        })
    }

    /// Execute `code` and return `(stdout, stderr)` undecoded by the
    /// error classifier. A zero timeout submits without waiting
    /// (fire-and-forget, used before handing the wire to a terminal).
    pub fn exec_raw(&self, code: &str, timeout: Duration) -> Result<(String, String)> {
        self.core.exec_raw(code, timeout)
    }

    /// Execute `code`; a remote traceback is classified into a typed
    /// error, otherwise the program's stdout is returned.
    pub fn exec(&self, code: &str, timeout: Duration) -> Result<String> {
        self.core.exec(code, timeout)
    }

    /// Execute `code` and parse its printed output as a literal.
    pub fn evaluate(&self, code: &str) -> Result<Value> {
        self.core.evaluate(code)
    }

    /// Stop currently running code (`CTRL-C` twice).
    pub fn interrupt(&self) -> Result<()> {
        let mut s = self.core.lock_session();
        let writer = s.writer.as_mut().ok_or(Error::LinkClosed)?;
        writer.write_all(&[CTRL_C, CTRL_C])?;
        writer.flush()?;
        Ok(())
    }

    /// Flag checked while an exec waits for its response; setting it
    /// (e.g. from a SIGINT handler) forwards one `CTRL-C` to the board
    /// and keeps waiting for the resulting traceback.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.core.interrupt)
    }

    /// Reset the interpreter.
    ///
    /// With `run_main` the board leaves raw mode first so `boot.py` /
    /// `main.py` execute, and raw mode is re-entered afterwards. Without
    /// it the reset happens inside raw mode, which suppresses autostart;
    /// an empty exec then consumes the boot banner.
    pub fn soft_reset(&self, run_main: bool) -> Result<()> {
        {
            let mut s = self.core.lock_session();
            let writer = s.writer.as_mut().ok_or(Error::LinkClosed)?;
            if run_main {
                writer.write_all(&[CTRL_C, CTRL_C, CTRL_B, CTRL_D, CTRL_A])?;
                writer.flush()?;
                // the re-entry banner has no terminator; resynchronize
                // before the next exec
                s.state = SessionState::Unknown;
                return Ok(());
            }
            writer.write_all(&[CTRL_C, CTRL_C, CTRL_D])?;
            writer.flush()?;
            std::thread::sleep(MODE_SETTLE);
            if let Some(reader) = &s.reader {
                reader.request_framer_reset();
            }
            if let Some(rx) = &s.rx {
                while let Ok(stale) = rx.try_recv() {
                    log::debug!("soft reset: dropping {} stale bytes", stale.len());
                }
            }
        }
        self.core.exec(" ", EXEC_TIMEOUT).map(|_| ())
    }

    /// Stop the reader thread but keep the port open, surrendering the
    /// write half so a terminal passthrough can reuse the connection.
    pub fn stop(&self, interrupt: bool) -> Result<Box<dyn WireWrite>> {
        let mut s = self.core.lock_session();
        let mut writer = s.writer.take().ok_or(Error::LinkClosed)?;
        Self::leave_raw(&mut *writer, interrupt)?;
        s.rx = None;
        if let Some(reader) = s.reader.take() {
            reader.shutdown();
        }
        s.state = SessionState::Detached;
        Ok(writer)
    }

    /// Leave raw mode, stop the reader thread and release the port.
    pub fn close(&self, interrupt: bool) -> Result<()> {
        self.stop(interrupt).map(|_| ())
    }

    /// Baud rate of the underlying wire; paces streamed transfers.
    pub fn baudrate(&self) -> u32 {
        self.core.baudrate
    }

    pub(crate) fn downgrade(&self) -> Weak<ReplCore> {
        Arc::downgrade(&self.core)
    }

    pub(crate) fn core(&self) -> Arc<ReplCore> {
        Arc::clone(&self.core)
    }

    fn leave_raw(writer: &mut dyn WireWrite, interrupt: bool) -> Result<()> {
        if interrupt {
            writer.write_all(&[CTRL_C, CTRL_B])?;
        } else {
            writer.write_all(&[CTRL_B])?;
        }
        writer.flush()
    }
}

impl ReplCore {
    fn lock_session(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn baudrate(&self) -> u32 {
        self.baudrate
    }

    pub(crate) fn exec_raw(&self, code: &str, timeout: Duration) -> Result<(String, String)> {
        let mut s = self.lock_session();
        match s.state {
            SessionState::Detached => return Err(Error::LinkClosed),
            SessionState::Unknown => self.resynchronize(&mut s)?,
            SessionState::Ready => {}
        }

        log::trace!("exec: {code:?}");
        let Session {
            state, rx, writer, ..
        } = &mut *s;
        let rx = rx.as_ref().ok_or(Error::LinkClosed)?;
        let writer = writer.as_mut().ok_or(Error::LinkClosed)?;

        // a waiting packet means an earlier exchange went wrong
        while let Ok(stale) = rx.try_recv() {
            log::warn!("discarding unexpected response: {stale:?}");
        }

        writer.write_all(code.as_bytes())?;
        writer.write_all(&[CTRL_D])?;
        writer.flush()?;

        if timeout.is_zero() {
            return Ok((String::new(), String::new()));
        }

        let deadline = Instant::now() + timeout;
        let mut forwarded = false;
        let packet = loop {
            if self.interrupt.swap(false, Ordering::Relaxed) && !forwarded {
                log::debug!("forwarding interrupt to board");
                writer.write_all(&[CTRL_C])?;
                writer.flush()?;
                forwarded = true;
            }
            let now = Instant::now();
            if now >= deadline {
                *state = SessionState::Unknown;
                return Err(Error::Timeout);
            }
            match rx.recv_timeout(WAIT_SLICE.min(deadline - now)) {
                Ok(packet) => break packet,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Err(Error::LinkClosed),
            }
        };

        match split_packet(&packet) {
            Ok(pair) => Ok(pair),
            Err(e) => {
                *state = SessionState::Unknown;
                Err(e)
            }
        }
    }

    pub(crate) fn exec(&self, code: &str, timeout: Duration) -> Result<String> {
        let code = if code.ends_with('\n') {
            code.to_string()
        } else {
            format!("{code}\n")
        };
        let (out, err) = self.exec_raw(&code, timeout)?;
        if !err.is_empty() {
            log::trace!("exec stderr: {err:?}");
            return Err(classify_traceback(&err));
        }
        Ok(out)
    }

    pub(crate) fn exec_default(&self, code: &str) -> Result<String> {
        self.exec(code, EXEC_TIMEOUT)
    }

    pub(crate) fn evaluate(&self, code: &str) -> Result<Value> {
        let out = self.exec_default(code)?;
        literal::parse(&out)
    }

    /// Bring an unknown session back to a known prompt: interrupt, wait
    /// one read window for the resulting traceback, drain, and if the
    /// board stayed silent re-enter raw mode and drop partial frames.
    fn resynchronize(&self, s: &mut Session) -> Result<()> {
        log::debug!("resynchronizing after timeout/desync");
        let Session { rx, writer, reader, .. } = &mut *s;
        let rx = rx.as_ref().ok_or(Error::LinkClosed)?;
        let writer = writer.as_mut().ok_or(Error::LinkClosed)?;

        writer.write_all(&[CTRL_C])?;
        writer.flush()?;
        match rx.recv_timeout(READ_TIMEOUT) {
            Ok(packet) => {
                log::debug!("resync: discarded {} byte response", packet.len());
            }
            Err(RecvTimeoutError::Timeout) => {
                // no reaction: assume raw mode was lost
                writer.write_all(&[CTRL_C, CTRL_A])?;
                writer.flush()?;
                std::thread::sleep(MODE_SETTLE);
                if let Some(reader) = reader {
                    reader.request_framer_reset();
                }
            }
            Err(RecvTimeoutError::Disconnected) => return Err(Error::LinkClosed),
        }
        while let Ok(stale) = rx.try_recv() {
            log::debug!("resync: dropping {} stale bytes", stale.len());
        }
        s.state = SessionState::Ready;
        Ok(())
    }
}

/// Split a framed response into its stdout/stderr halves.
///
/// Grammar: `OK` + stdout + `\x04` + stderr (the closing `\x04>` was
/// consumed by the framer). The acceptance marker is searched, not
/// anchored, because reset banners can precede it; everything before is
/// discarded.
fn split_packet(packet: &[u8]) -> Result<(String, String)> {
    let sep = packet
        .iter()
        .position(|&b| b == CTRL_D)
        .ok_or_else(|| Error::Desync(packet.to_vec()))?;
    let (out, err) = packet.split_at(sep);
    let err = &err[1..];

    let ok = out
        .windows(2)
        .position(|w| w == b"OK")
        .ok_or_else(|| Error::NotAccepted(out.to_vec()))?;
    if ok > 0 {
        log::debug!("ignoring {ok} bytes before acceptance marker");
    }
    let out = &out[ok + 2..];

    Ok((
        std::str::from_utf8(out)?.to_string(),
        std::str::from_utf8(err)?.to_string(),
    ))
}

// ── Tests ────────────────────────────────────────────────────
