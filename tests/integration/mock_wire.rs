//! Scripted mock wire for protocol-level tests.
//!
//! Plays the board's role: every submitted program (terminated by the
//! `\x04` run-now byte) releases the next scripted response onto the
//! read side, and every write is recorded so tests can assert on the
//! generated programs and control bytes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use replfs::error::Result;
use replfs::link::{WireRead, WireWrite};
use replfs::{LinkConfig, MpyRepl};

#[derive(Default)]
struct MockState {
    /// Responses released in order, one per program submission.
    responses: VecDeque<Vec<u8>>,
    /// Responses released when a lone `CTRL-C` arrives (interrupt
    /// forwarding and resynchronization paths).
    interrupt_responses: VecDeque<Vec<u8>>,
    /// Bytes waiting to be read by the reader thread.
    outbox: VecDeque<Vec<u8>>,
    /// Everything ever written, verbatim.
    writes: Vec<u8>,
    /// Program texts, split at each `\x04`, control bytes stripped.
    programs: Vec<String>,
    current: Vec<u8>,
}

/// Handle the test keeps to script and inspect the board side.
#[derive(Clone)]
pub struct MockBoard {
    state: Arc<Mutex<MockState>>,
}

impl MockBoard {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Attach a REPL to this board at the default baud rate.
    pub fn attach(&self) -> MpyRepl {
        let read = MockRead {
            state: Arc::clone(&self.state),
        };
        let write = MockWrite {
            state: Arc::clone(&self.state),
        };
        MpyRepl::attach(Box::new(read), Box::new(write), LinkConfig::default().baudrate)
            .expect("attach mock wire")
    }

    /// Queue a raw response, exactly as the wire would carry it.
    pub fn push_raw(&self, bytes: &[u8]) {
        self.state.lock().unwrap().responses.push_back(bytes.to_vec());
    }

    /// Queue a well-formed `OK` response with the given streams.
    pub fn push_ok(&self, stdout: &str, stderr: &str) {
        let mut packet = b"OK".to_vec();
        packet.extend_from_slice(stdout.as_bytes());
        packet.push(0x04);
        packet.extend_from_slice(stderr.as_bytes());
        packet.extend_from_slice(b"\x04>");
        self.push_raw(&packet);
    }

    /// Queue a response released by a lone `CTRL-C` instead of a program.
    pub fn push_on_interrupt(&self, stdout: &str, stderr: &str) {
        let mut packet = b"OK".to_vec();
        packet.extend_from_slice(stdout.as_bytes());
        packet.push(0x04);
        packet.extend_from_slice(stderr.as_bytes());
        packet.extend_from_slice(b"\x04>");
        self.state
            .lock()
            .unwrap()
            .interrupt_responses
            .push_back(packet);
    }

    /// Put bytes on the read side immediately, tied to no submission —
    /// the way a late response from a timed-out exchange shows up.
    pub fn inject(&self, bytes: &[u8]) {
        self.state.lock().unwrap().outbox.push_back(bytes.to_vec());
    }

    /// Programs submitted so far (text between `\x04` separators).
    pub fn programs(&self) -> Vec<String> {
        self.state.lock().unwrap().programs.clone()
    }

    /// Raw write log.
    pub fn writes(&self) -> Vec<u8> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Number of scripted responses not yet consumed.
    pub fn unconsumed(&self) -> usize {
        self.state.lock().unwrap().responses.len()
    }
}

/// A well-formed traceback response for a remote exception.
pub fn traceback(last_line: &str) -> String {
    format!(
        "Traceback (most recent call last):\n  File \"<stdin>\", line 1, in <module>\n{last_line}"
    )
}

struct MockRead {
    state: Arc<Mutex<MockState>>,
}

impl WireRead for MockRead {
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        // pace the reader thread like a real port would
        std::thread::sleep(Duration::from_millis(1));
        let mut state = self.state.lock().unwrap();
        match state.outbox.pop_front() {
            Some(mut chunk) => {
                if chunk.len() > buf.len() {
                    let rest = chunk.split_off(buf.len());
                    state.outbox.push_front(rest);
                }
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            None => Ok(0),
        }
    }

    fn discard_input(&mut self) -> Result<()> {
        self.state.lock().unwrap().outbox.clear();
        Ok(())
    }
}

struct MockWrite {
    state: Arc<Mutex<MockState>>,
}

impl WireWrite for MockWrite {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.writes.extend_from_slice(data);
        for &byte in data {
            match byte {
                0x04 => {
                    let text = String::from_utf8_lossy(&state.current).into_owned();
                    state.current.clear();
                    state.programs.push(text);
                    if let Some(response) = state.responses.pop_front() {
                        state.outbox.push_back(response);
                    }
                }
                0x03 => {
                    // interrupt: the board aborts and prints a traceback
                    if let Some(response) = state.interrupt_responses.pop_front() {
                        state.outbox.push_back(response);
                    }
                }
                0x01 | 0x02 => {}
                byte => state.current.push(byte),
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
