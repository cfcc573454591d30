//! Response packet framer.
//!
//! The raw REPL prints `\x04>` at the end of every response. The framer
//! accumulates incoming bytes and cuts a packet at every occurrence of
//! that two-byte terminator. There are no escape sequences on the wire,
//! so a plain scan is exact.

use super::TERMINATOR;

/// Streaming terminator-based packet cutter.
pub struct PacketFramer {
    buf: Vec<u8>,
}

impl Default for PacketFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketFramer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Feed bytes, returning every packet completed by this chunk.
    ///
    /// A packet is everything before a `\x04>` terminator; the terminator
    /// itself is consumed. Bytes after the last terminator stay buffered
    /// for the next call.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(data);
        let mut packets = Vec::new();
        loop {
            match find_terminator(&self.buf) {
                Some(pos) => {
                    let mut packet: Vec<u8> = self.buf.drain(..pos + TERMINATOR.len()).collect();
                    packet.truncate(pos);
                    packets.push(packet);
                }
                None => break,
            }
        }
        packets
    }

    /// Drop any partially accumulated packet (resynchronization).
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Number of buffered bytes not yet terminated.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(TERMINATOR.len())
        .position(|w| w == TERMINATOR)
}

// ── Tests ────────────────────────────────────────────────────
