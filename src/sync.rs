//! File and directory synchronization.
//!
//! The engine copies one way between any two trees — local→remote
//! ("push"), remote→local ("pull"), and the local↔local / remote↔remote
//! combinations fall out for free — by talking to both sides through the
//! [`SyncNode`] trait. Files already up to date (same size, same SHA-256)
//! are skipped; a dry run logs intended actions and mutates nothing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fs::MpyPath;

/// Directory names never copied by `sync_directory`.
pub const EXCLUDE_DIRS: &[&str] = &["__pycache__", ".git"];

/// Size of the read chunks hashed on the local side; matches the block
/// size the board-side hash program uses.
const HASH_CHUNK: usize = 512;

// ── Tree-node seam ───────────────────────────────────────────

/// One node of a syncable tree. The engine consumes both sides of a copy
/// through this trait, which is what makes the direction irrelevant.
pub trait SyncNode {
    /// Display form for logs and errors.
    fn location(&self) -> String;

    /// Final path component.
    fn name(&self) -> String;

    fn exists(&self) -> Result<bool>;

    /// False (not an error) when the node does not exist.
    fn is_dir(&self) -> Result<bool>;

    fn is_file(&self) -> Result<bool>;

    fn size(&self) -> Result<u64>;

    /// SHA-256 of the content; the empty digest when the node is absent,
    /// so an absent destination always reads as "different".
    fn sha256(&self) -> Result<Vec<u8>>;

    fn read_bytes(&self) -> Result<Vec<u8>>;

    fn write_bytes(&self, data: &[u8]) -> Result<()>;

    /// Create this directory and any missing ancestors.
    fn mkdir_all(&self) -> Result<()>;

    fn unlink(&self) -> Result<()>;

    /// Remove this (empty) directory.
    fn rmdir(&self) -> Result<()>;

    fn child(&self, name: &str) -> Box<dyn SyncNode>;

    fn list_dir(&self) -> Result<Vec<Box<dyn SyncNode>>>;
}

// ── Local implementation ─────────────────────────────────────

/// A node on the host filesystem.
pub struct LocalNode {
    path: PathBuf,
}

impl LocalNode {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SyncNode for LocalNode {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn exists(&self) -> Result<bool> {
        Ok(self.path.exists())
    }

    fn is_dir(&self) -> Result<bool> {
        Ok(self.path.is_dir())
    }

    fn is_file(&self) -> Result<bool> {
        Ok(self.path.is_file())
    }

    fn size(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    fn sha256(&self) -> Result<Vec<u8>> {
        use std::io::Read;
        let mut file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut hash = hmac_sha256::Hash::new();
        let mut chunk = [0u8; HASH_CHUNK];
        loop {
            let n = file.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            hash.update(&chunk[..n]);
        }
        Ok(hash.finalize().to_vec())
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(&self.path)?)
    }

    fn write_bytes(&self, data: &[u8]) -> Result<()> {
        Ok(std::fs::write(&self.path, data)?)
    }

    fn mkdir_all(&self) -> Result<()> {
        Ok(std::fs::create_dir_all(&self.path)?)
    }

    fn unlink(&self) -> Result<()> {
        Ok(std::fs::remove_file(&self.path)?)
    }

    fn rmdir(&self) -> Result<()> {
        Ok(std::fs::remove_dir(&self.path)?)
    }

    fn child(&self, name: &str) -> Box<dyn SyncNode> {
        Box::new(Self::new(self.path.join(name)))
    }

    fn list_dir(&self) -> Result<Vec<Box<dyn SyncNode>>> {
        let mut entries: Vec<Box<dyn SyncNode>> = Vec::new();
        let mut names: Vec<PathBuf> = std::fs::read_dir(&self.path)?
            .map(|e| e.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        names.sort();
        for path in names {
            entries.push(Box::new(Self::new(path)));
        }
        Ok(entries)
    }
}

// ── Remote implementation ────────────────────────────────────

/// A node on the board.
pub struct RemoteNode {
    path: MpyPath,
}

impl RemoteNode {
    pub fn new(path: MpyPath) -> Self {
        Self { path }
    }
}

impl SyncNode for RemoteNode {
    fn location(&self) -> String {
        self.path.as_str().to_string()
    }

    fn name(&self) -> String {
        self.path.name().to_string()
    }

    fn exists(&self) -> Result<bool> {
        self.path.exists()
    }

    fn is_dir(&self) -> Result<bool> {
        self.path.is_dir()
    }

    fn is_file(&self) -> Result<bool> {
        self.path.is_file()
    }

    fn size(&self) -> Result<u64> {
        Ok(self.path.stat()?.size)
    }

    fn sha256(&self) -> Result<Vec<u8>> {
        self.path.sha256()
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        self.path.read_bytes()
    }

    fn write_bytes(&self, data: &[u8]) -> Result<()> {
        self.path.write_bytes(data).map(|_| ())
    }

    fn mkdir_all(&self) -> Result<()> {
        self.path.mkdir(true, true)
    }

    fn unlink(&self) -> Result<()> {
        self.path.unlink()
    }

    fn rmdir(&self) -> Result<()> {
        self.path.rmdir()
    }

    fn child(&self, name: &str) -> Box<dyn SyncNode> {
        Box::new(Self::new(self.path.join(name)))
    }

    fn list_dir(&self) -> Result<Vec<Box<dyn SyncNode>>> {
        let entries = self.path.iterdir()?;
        Ok(entries
            .into_iter()
            .map(|p| Box::new(Self::new(p)) as Box<dyn SyncNode>)
            .collect())
    }
}

// ── Engine ───────────────────────────────────────────────────

/// Copy / skip counters of one engine run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Files copied (or removed, for the removal helpers).
    pub copied: usize,
    /// Files skipped: already up to date, or everything during a dry run.
    pub skipped: usize,
}

/// One-way tree synchronization with hash-based change detection.
pub struct Sync {
    /// Log intended actions, mutate nothing, count everything as skipped.
    pub dry_run: bool,
    /// Copy even when size and hash say the file is up to date.
    pub force: bool,
    /// Compare SHA-256 digests (in addition to sizes). Without it only
    /// sizes decide, which misses same-length edits.
    pub use_hash: bool,
    exclude: HashSet<String>,
    stats: SyncStats,
}

impl Default for Sync {
    fn default() -> Self {
        Self::new()
    }
}

impl Sync {
    pub fn new() -> Self {
        Self {
            dry_run: false,
            force: false,
            use_hash: true,
            exclude: EXCLUDE_DIRS.iter().map(|s| (*s).to_string()).collect(),
            stats: SyncStats::default(),
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn use_hash(mut self, use_hash: bool) -> Self {
        self.use_hash = use_hash;
        self
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Copy one file if the destination differs. A destination that is an
    /// existing directory receives `src`'s name inside it.
    pub fn sync_file(&mut self, src: &dyn SyncNode, dst: &dyn SyncNode) -> Result<()> {
        if self.dry_run {
            self.stats.skipped += 1;
            log::info!("dry run: {} -> {}", src.location(), dst.location());
            return Ok(());
        }
        let target: Box<dyn SyncNode>;
        let dst: &dyn SyncNode = if dst.is_dir()? {
            target = dst.child(&src.name());
            target.as_ref()
        } else {
            dst
        };
        if self.force || self.files_differ(src, dst)? {
            self.stats.copied += 1;
            log::info!("{} -> {}", src.location(), dst.location());
            dst.write_bytes(&src.read_bytes()?)?;
        } else {
            self.stats.skipped += 1;
            log::debug!("{}: already up to date", dst.location());
        }
        Ok(())
    }

    /// Copy a directory tree. The destination must exist and be a
    /// directory (checked only outside dry runs). Subdirectories named in
    /// the exclude set are pruned.
    pub fn sync_directory(
        &mut self,
        src: &dyn SyncNode,
        dst: &dyn SyncNode,
        recursive: bool,
    ) -> Result<()> {
        if !self.dry_run {
            if !src.is_dir()? {
                return Err(Error::Value(format!(
                    "source must be a directory: {}",
                    src.location()
                )));
            }
            if !dst.is_dir()? {
                return Err(Error::Value(format!(
                    "destination must be an existing directory: {}",
                    dst.location()
                )));
            }
        }
        if recursive {
            self.copy_tree(src, dst.child(&src.name()).as_ref())
        } else {
            let dst_dir = dst.child(&src.name());
            if !self.dry_run {
                dst_dir.mkdir_all()?;
            }
            for entry in src.list_dir()? {
                if entry.is_file()? {
                    self.sync_file(entry.as_ref(), dst_dir.as_ref())?;
                }
            }
            Ok(())
        }
    }

    fn copy_tree(&mut self, src_dir: &dyn SyncNode, dst_dir: &dyn SyncNode) -> Result<()> {
        if !self.dry_run {
            dst_dir.mkdir_all()?;
        }
        for entry in src_dir.list_dir()? {
            if entry.is_dir()? {
                if self.exclude.contains(&entry.name()) {
                    log::debug!("excluded: {}", entry.location());
                    continue;
                }
                self.copy_tree(entry.as_ref(), dst_dir.child(&entry.name()).as_ref())?;
            } else {
                self.sync_file(entry.as_ref(), dst_dir)?;
            }
        }
        Ok(())
    }

    /// Delete one file.
    pub fn remove_file(&mut self, path: &dyn SyncNode) -> Result<()> {
        log::info!("rm {}", path.location());
        if self.dry_run {
            self.stats.skipped += 1;
            return Ok(());
        }
        self.stats.copied += 1;
        path.unlink()
    }

    /// Delete a directory; with `recursive` its contents go first,
    /// bottom-up.
    pub fn remove_directory(&mut self, path: &dyn SyncNode, recursive: bool) -> Result<()> {
        if recursive {
            for entry in path.list_dir()? {
                if entry.is_dir()? {
                    self.remove_directory(entry.as_ref(), true)?;
                } else {
                    self.remove_file(entry.as_ref())?;
                }
            }
        }
        log::info!("rmdir {}", path.location());
        if !self.dry_run {
            path.rmdir()?;
        }
        Ok(())
    }

    /// "Different" iff sizes differ or (with hashing enabled) digests
    /// differ; an absent destination is always different.
    fn files_differ(&self, src: &dyn SyncNode, dst: &dyn SyncNode) -> Result<bool> {
        if !dst.exists()? {
            return Ok(true);
        }
        if src.size()? != dst.size()? {
            return Ok(true);
        }
        if self.use_hash && src.sha256()? != dst.sha256()? {
            return Ok(true);
        }
        Ok(false)
    }
}

// ── Tests ────────────────────────────────────────────────────
