//! Serial link layer: wire access, response framing, reader thread.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       Link Stack                         │
//! │                                                          │
//! │  ┌──────────┐   ┌──────────┐   ┌──────────────────────┐  │
//! │  │ WireRead │──▶│  Framer  │──▶│ bounded(1) channel   │  │
//! │  │ (thread) │   │ (\x04>)  │   │  → exec engine       │  │
//! │  └──────────┘   └──────────┘   └──────────────────────┘  │
//! │  ┌──────────┐                                            │
//! │  │ WireWrite│◀── programs, control bytes                 │
//! │  └──────────┘                                            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The board understands four session-scoped control bytes; none of them
//! can be escaped, which is why `run` of a file containing them is not
//! supported through this transport.

pub mod framer;
pub mod reader;
pub mod wire;

/// Enter raw REPL mode.
pub const CTRL_A: u8 = 0x01;

/// Leave raw REPL mode.
pub const CTRL_B: u8 = 0x02;

/// Interrupt running code.
pub const CTRL_C: u8 = 0x03;

/// End of code — execute the submitted program now. Doubles as the
/// stdout/stderr separator inside responses.
pub const CTRL_D: u8 = 0x04;

/// End-of-response marker the board prints in raw mode.
pub const TERMINATOR: &[u8] = b"\x04>";

pub use framer::PacketFramer;
pub use reader::ReaderHandle;
pub use wire::{WireRead, WireWrite, open_wire};
