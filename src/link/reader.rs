//! Dedicated reader thread.
//!
//! One thread owns the read half of the wire, feeds every chunk through
//! the packet framer and hands completed packets to the exec engine over
//! a bounded channel of depth 1. The shallow depth is deliberate: a
//! second buffered packet would mean a response nobody asked for, and a
//! deeper queue would hide that desynchronization.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, bounded};

use super::framer::PacketFramer;
use super::wire::WireRead;

const READ_BUF_SIZE: usize = 1024;

/// Handle to the reader thread; dropping it stops and joins the thread.
pub struct ReaderHandle {
    stop: Arc<AtomicBool>,
    reset_framer: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// Spawn the reader thread for `wire`, returning the handle and the
/// packet channel.
pub fn spawn(mut wire: Box<dyn WireRead>) -> crate::error::Result<(ReaderHandle, Receiver<Vec<u8>>)> {
    let (tx, rx) = bounded(1);
    let stop = Arc::new(AtomicBool::new(false));
    let reset_framer = Arc::new(AtomicBool::new(false));

    let thread_stop = Arc::clone(&stop);
    let thread_reset = Arc::clone(&reset_framer);
    let thread = std::thread::Builder::new()
        .name("repl-reader".into())
        .spawn(move || read_loop(wire.as_mut(), &tx, &thread_stop, &thread_reset))?;

    Ok((
        ReaderHandle {
            stop,
            reset_framer,
            thread: Some(thread),
        },
        rx,
    ))
}

fn read_loop(
    wire: &mut dyn WireRead,
    tx: &Sender<Vec<u8>>,
    stop: &AtomicBool,
    reset: &AtomicBool,
) {
    let mut framer = PacketFramer::new();
    let mut buf = [0u8; READ_BUF_SIZE];
    while !stop.load(Ordering::Relaxed) {
        if reset.swap(false, Ordering::Relaxed) {
            log::debug!("reader: framer reset, {} bytes dropped", framer.pending());
            framer.reset();
        }
        let n = match wire.read_some(&mut buf) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(e) => {
                log::warn!("reader: wire error, stopping: {e}");
                break;
            }
        };
        for packet in framer.feed(&buf[..n]) {
            log::trace!("reader: packet of {} bytes", packet.len());
            // blocks while the previous packet is unconsumed; a closed
            // receiver means the session is shutting down
            if tx.send(packet).is_err() {
                return;
            }
        }
    }
}

impl ReaderHandle {
    /// Ask the thread to drop its partial framer buffer before the next
    /// append (resynchronization after a timeout).
    pub fn request_framer_reset(&self) {
        self.reset_framer.store(true, Ordering::Relaxed);
    }

    /// Stop and join the thread. The receiver side of the packet channel
    /// must already be dropped or drained so a blocked send can fail out.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

// ── Tests ────────────────────────────────────────────────────
