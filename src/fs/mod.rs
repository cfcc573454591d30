//! Remote filesystem façade.
//!
//! Path objects synthesize small programs, send them through the exec
//! engine and parse the printed literals back into host values:
//!
//! ```text
//!  MpyPath ──▶ program text ──▶ MpyRepl::exec ──▶ printed literal
//!     ▲                                                │
//!     └───────────────── parsed host value ◀───────────┘
//! ```

pub mod device;
pub mod glob;
pub mod path;
pub mod stat;
pub mod walk;

pub use device::FlashStream;
pub use glob::{Glob, fnmatch, is_pattern};
pub use path::{BLOCK_SIZE, MpyPath, ReadStream};
pub use stat::{RemoteStat, VfsStat};
pub use walk::{Walk, WalkEntry};
