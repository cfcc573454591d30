//! Remote code execution and file transfer for MicroPython boards.
//!
//! The board's raw REPL is driven as a remote-execution transport: every
//! filesystem operation becomes a small program the board runs and prints
//! the answer for. On top of that sit a path-object façade ([`MpyPath`])
//! and a hash-aware sync engine ([`Sync`]).
//!
//! The protocol uses MicroPython-specific control codes to switch into
//! raw REPL mode, so this is not a generic driver for arbitrary Python
//! REPLs.
//!
//! ```no_run
//! use replfs::{LinkConfig, MpyRepl, Result};
//!
//! fn main() -> Result<()> {
//!     let repl = MpyRepl::connect(&LinkConfig::from_env())?;
//!     for entry in repl.path("/").iterdir()? {
//!         println!("{} {} bytes", entry, entry.stat()?.size);
//!     }
//!     repl.close(true)
//! }
//! ```

#![deny(unused_must_use)]

pub mod config;
pub mod error;
pub mod escape;
pub mod fs;
pub mod link;
pub mod literal;
pub mod repl;
pub mod sync;

pub use config::LinkConfig;
pub use error::{Error, Result};
pub use fs::{FlashStream, MpyPath, ReadStream, RemoteStat, VfsStat, Walk, WalkEntry};
pub use repl::MpyRepl;
pub use sync::{LocalNode, RemoteNode, Sync, SyncNode, SyncStats};
