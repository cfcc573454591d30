//! Stat records returned by the board.
//!
//! `os.stat()` and `os.statvfs()` print plain 10-tuples; these types give
//! the fields names and carry the POSIX mode-bit helpers the rest of the
//! crate needs. Boards usually fill only mode, size and the timestamps —
//! uid/gid/nlink come back as zeros unless fake attributes are requested
//! (the FUSE adapter wants a coherent owner).

use crate::error::{Error, Result};
use crate::literal::Value;

/// Directory bit of `st_mode`.
pub const S_IFDIR: u32 = 0o040_000;

/// Regular-file bit of `st_mode`.
pub const S_IFREG: u32 = 0o100_000;

/// One `os.stat()` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    /// File type and permission bits.
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    /// Seconds since the board epoch.
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl RemoteStat {
    /// Build from the printed 10-tuple
    /// `(mode, ino, dev, nlink, uid, gid, size, atime, mtime, ctime)`.
    pub fn from_tuple(value: &Value) -> Result<Self> {
        let items = value.items()?;
        if items.len() != 10 {
            return Err(Error::Literal(format!(
                "stat tuple has {} fields, expected 10",
                items.len()
            )));
        }
        Ok(Self {
            mode: items[0].as_int()? as u32,
            nlink: items[3].as_int()? as u32,
            uid: items[4].as_int()? as u32,
            gid: items[5].as_int()? as u32,
            size: items[6].as_int()? as u64,
            atime: items[7].as_int()?,
            mtime: items[8].as_int()?,
            ctime: items[9].as_int()?,
        })
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFDIR != 0
    }

    pub fn is_file(&self) -> bool {
        self.mode & S_IFREG != 0
    }

    /// Copy with read/write permissions and the host process's uid/gid
    /// substituted, for consumers that present the board to the local OS.
    pub fn with_fake_attrs(mut self) -> Self {
        self.mode |= 0o660;
        self.uid = host_uid();
        self.gid = host_gid();
        self
    }
}

#[cfg(unix)]
fn host_uid() -> u32 {
    // SAFETY: getuid cannot fail and touches no memory
    unsafe { libc::getuid() }
}

#[cfg(unix)]
fn host_gid() -> u32 {
    // SAFETY: see host_uid
    unsafe { libc::getgid() }
}

#[cfg(not(unix))]
fn host_uid() -> u32 {
    0
}

#[cfg(not(unix))]
fn host_gid() -> u32 {
    0
}

/// One `os.statvfs()` result:
/// `(f_bsize, f_frsize, f_blocks, f_bfree, f_bavail, f_files, f_ffree,
/// f_favail, f_flag, f_namemax)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VfsStat {
    pub bsize: u64,
    pub frsize: u64,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub favail: u64,
    pub flag: u64,
    pub namemax: u64,
}

impl VfsStat {
    pub fn from_tuple(value: &Value) -> Result<Self> {
        let items = value.items()?;
        if items.len() != 10 {
            return Err(Error::Literal(format!(
                "statvfs tuple has {} fields, expected 10",
                items.len()
            )));
        }
        let field = |i: usize| -> Result<u64> { Ok(items[i].as_int()? as u64) };
        Ok(Self {
            bsize: field(0)?,
            frsize: field(1)?,
            blocks: field(2)?,
            bfree: field(3)?,
            bavail: field(4)?,
            files: field(5)?,
            ffree: field(6)?,
            favail: field(7)?,
            flag: field(8)?,
            namemax: field(9)?,
        })
    }

    pub fn total_bytes(&self) -> u64 {
        self.bsize * self.blocks
    }

    pub fn free_bytes(&self) -> u64 {
        self.bsize * self.bfree
    }

    pub fn used_bytes(&self) -> u64 {
        self.total_bytes() - self.free_bytes()
    }
}

// ── Tests ────────────────────────────────────────────────────
