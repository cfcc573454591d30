//! Fuzz target: `PacketFramer::feed`
//!
//! Drives arbitrary byte sequences into the streaming framer and asserts
//! that it never panics, never emits a packet containing the terminator,
//! and accounts for every byte either as a packet or as pending buffer.
//!
//! cargo fuzz run fuzz_framer

#![no_main]

use libfuzzer_sys::fuzz_target;
use replfs::link::PacketFramer;

fuzz_target!(|data: &[u8]| {
    let mut framer = PacketFramer::new();

    let mut packet_bytes = 0usize;
    let mut packets = 0usize;
    for chunk in data.chunks(7) {
        for packet in framer.feed(chunk) {
            assert!(
                !packet.windows(2).any(|w| w == b"\x04>"),
                "terminator leaked into a packet"
            );
            packet_bytes += packet.len();
            packets += 1;
        }
    }

    // every input byte is either delivered, consumed as a terminator,
    // or still pending
    assert_eq!(data.len(), packet_bytes + packets * 2 + framer.pending());

    // after a reset the framer accepts bytes cleanly again
    framer.reset();
    let _ = framer.feed(data);
});
