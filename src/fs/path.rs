//! `MpyPath` — a path on the board, bound to a REPL connection.
//!
//! The path itself is pure data: constructing, joining and taking parents
//! never touches the device. Only the operation methods talk to the board,
//! through a weak reference to the connection, so a closed link fails
//! explicitly instead of keeping the port alive behind forgotten paths.
//!
//! Each operation synthesizes a small program whose only output is a
//! printed literal; see the module docs of [`crate::literal`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::{Error, Result};
use crate::literal::quote_str;
use crate::repl::{MpyRepl, ReplCore};

use super::glob::Glob;
use super::stat::RemoteStat;
use super::walk::Walk;

/// Transfer block size for streamed reads and writes. Matches the buffer
/// the generated programs allocate on the board.
pub const BLOCK_SIZE: usize = 512;

impl MpyRepl {
    /// A path on this board. Relative input is re-anchored at `/` — the
    /// board has no current-directory concept.
    pub fn path(&self, path: &str) -> MpyPath {
        let anchored = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        MpyPath {
            repl: self.downgrade(),
            path: normalize(&anchored),
            stat_cache: RefCell::new(None),
        }
    }
}

/// A file or directory on the board (existing or not).
#[derive(Clone)]
pub struct MpyPath {
    repl: Weak<ReplCore>,
    path: String,
    stat_cache: RefCell<Option<RemoteStat>>,
}

impl std::fmt::Debug for MpyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MpyPath").field(&self.path).finish()
    }
}

impl std::fmt::Display for MpyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)
    }
}

impl PartialEq for MpyPath {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for MpyPath {}

fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let joined = path
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

// ── Pure path algebra ────────────────────────────────────────

impl MpyPath {
    /// The path as a POSIX string.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Final component; empty for the root.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    /// Extension including the dot, if any.
    pub fn suffix(&self) -> Option<&str> {
        let name = self.name();
        name.rfind('.')
            .filter(|&i| i > 0)
            .map(|i| &name[i..])
    }

    pub fn is_absolute(&self) -> bool {
        self.path.starts_with('/')
    }

    /// Parent directory; the root is its own parent.
    pub fn parent(&self) -> MpyPath {
        let parent = match self.path.rfind('/') {
            Some(0) => "/".to_string(),
            Some(i) => self.path[..i].to_string(),
            None => String::new(),
        };
        self.sibling(parent)
    }

    /// Append a path fragment; an absolute fragment replaces the path.
    pub fn join(&self, fragment: &str) -> MpyPath {
        let joined = if fragment.starts_with('/') {
            fragment.to_string()
        } else if self.path == "/" {
            format!("/{fragment}")
        } else {
            format!("{}/{fragment}", self.path)
        };
        self.sibling(normalize(&joined))
    }

    /// Same parent, different final component.
    pub fn with_name(&self, name: &str) -> MpyPath {
        self.parent().join(name)
    }

    /// Segments of this path relative to `base`, or `None` when `base`
    /// is not an ancestor.
    pub fn relative_to(&self, base: &MpyPath) -> Option<Vec<String>> {
        let mine: Vec<&str> = self.segments().collect();
        let theirs: Vec<&str> = base.segments().collect();
        if mine.len() < theirs.len() || mine[..theirs.len()] != theirs[..] {
            return None;
        }
        Some(mine[theirs.len()..].iter().map(|s| (*s).to_string()).collect())
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }

    fn sibling(&self, path: String) -> MpyPath {
        MpyPath {
            repl: self.repl.clone(),
            path,
            stat_cache: RefCell::new(None),
        }
    }

    fn repl(&self) -> Result<Arc<ReplCore>> {
        self.repl.upgrade().ok_or(Error::LinkClosed)
    }

    /// The path quoted as a board string literal.
    fn quoted(&self) -> String {
        quote_str(&self.path)
    }

    pub(crate) fn preset_stat(&self, st: RemoteStat) {
        *self.stat_cache.borrow_mut() = Some(st);
    }

    fn invalidate_stat(&self) {
        *self.stat_cache.borrow_mut() = None;
    }
}

// ── Remote operations ────────────────────────────────────────

impl MpyPath {
    /// Stat this path. Results are cached per path object until a
    /// mutation through the same object invalidates them.
    pub fn stat(&self) -> Result<RemoteStat> {
        if let Some(st) = *self.stat_cache.borrow() {
            return Ok(st);
        }
        let repl = self.repl()?;
        let value = repl.evaluate(&format!("import os; print(os.stat({}))", self.quoted()))?;
        let st = RemoteStat::from_tuple(&value)?;
        self.preset_stat(st);
        Ok(st)
    }

    /// [`stat`](Self::stat) with synthesized permission and owner fields.
    pub fn stat_fake_attrs(&self) -> Result<RemoteStat> {
        Ok(self.stat()?.with_fake_attrs())
    }

    pub fn exists(&self) -> Result<bool> {
        match self.stat() {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn is_dir(&self) -> Result<bool> {
        match self.stat() {
            Ok(st) => Ok(st.is_dir()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn is_file(&self) -> Result<bool> {
        match self.stat() {
            Ok(st) => Ok(st.is_file()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete the file.
    pub fn unlink(&self) -> Result<()> {
        self.invalidate_stat();
        let repl = self.repl()?;
        repl.evaluate(&format!("import os; print(os.remove({}))", self.quoted()))?;
        Ok(())
    }

    /// Rename within the same directory, returning the new sibling path.
    ///
    /// The board's `os.rename` cannot move across filesystems and this
    /// API keeps the stronger same-parent guarantee; a cross-directory
    /// move is a read/write/unlink sequence the caller must opt into.
    pub fn rename(&self, new_name: &str) -> Result<MpyPath> {
        if new_name.contains('/') || new_name.is_empty() {
            return Err(Error::Value(format!(
                "rename target must be a plain name: {new_name:?}"
            )));
        }
        let target = self.with_name(new_name);
        self.invalidate_stat();
        let repl = self.repl()?;
        repl.evaluate(&format!(
            "import os; print(os.rename({}, {}))",
            self.quoted(),
            target.quoted()
        ))?;
        Ok(target)
    }

    /// Create the directory. `parents` creates missing ancestors;
    /// `exist_ok` suppresses the error when the directory is there.
    pub fn mkdir(&self, parents: bool, exist_ok: bool) -> Result<()> {
        if parents {
            let ancestors: Vec<String> = {
                let mut chain = Vec::new();
                let mut cur = self.parent();
                while cur.path != "/" && !cur.path.is_empty() {
                    chain.push(cur.path.clone());
                    cur = cur.parent();
                }
                chain.reverse();
                chain
            };
            for ancestor in ancestors {
                match self.sibling(ancestor).mkdir_plain() {
                    Ok(()) | Err(Error::FileExists) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        match self.mkdir_plain() {
            Ok(()) => Ok(()),
            Err(Error::FileExists) if exist_ok => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn mkdir_plain(&self) -> Result<()> {
        self.invalidate_stat();
        let repl = self.repl()?;
        repl.evaluate(&format!("import os; print(os.mkdir({}))", self.quoted()))?;
        Ok(())
    }

    /// Remove the (empty) directory.
    pub fn rmdir(&self) -> Result<()> {
        self.invalidate_stat();
        let repl = self.repl()?;
        repl.evaluate(&format!("import os; print(os.rmdir({}))", self.quoted()))?;
        Ok(())
    }

    /// Set the file length. Boards without `file.truncate()` accept the
    /// append-seek-write idiom, which this uses. Returns the new size.
    pub fn truncate(&self, length: u64) -> Result<u64> {
        self.invalidate_stat();
        let repl = self.repl()?;
        let value = repl.evaluate(&format!(
            "_f = open({}, \"ab\")\nprint(_f.seek({length}))\n_f.write(b\"\")\n_f.close(); del _f",
            self.quoted()
        ))?;
        Ok(value.as_int()? as u64)
    }

    /// List the directory, stat information included.
    ///
    /// One remote call returns names *and* stat tuples so that listing,
    /// walking and mounting do not pay a round trip per entry. The
    /// returned children carry their stat pre-cached.
    pub fn iterdir(&self) -> Result<Vec<MpyPath>> {
        if !self.is_absolute() {
            return Err(Error::Value(format!(
                "only absolute paths are supported (beginning with \"/\"): {self}"
            )));
        }
        // pre-anchored with a trailing slash so joining works at "/"
        let with_slash = if self.path.ends_with('/') {
            self.path.clone()
        } else {
            format!("{}/", self.path)
        };
        let repl = self.repl()?;
        let value = repl.evaluate(&format!(
            "import os; print(\"[\")\nfor n in os.listdir({}): print(\"[\", repr(n), \",\", os.stat({} + n), \"],\")\nprint(\"]\")",
            self.quoted(),
            quote_str(&with_slash),
        ))?;

        let mut children = Vec::new();
        for entry in value.items()? {
            let pair = entry.items()?;
            if pair.len() != 2 {
                return Err(Error::Literal("iterdir entry is not a pair".into()));
            }
            let name = pair[0].as_str()?;
            let st = RemoteStat::from_tuple(&pair[1])?;
            let child = self.join(name);
            child.preset_stat(st);
            children.push(child);
        }
        Ok(children)
    }

    /// Lazy stream over the file contents in 512-byte blocks.
    ///
    /// The board keeps the file open between batches; the stream closes
    /// it when exhausted or dropped early.
    pub fn read_as_stream(&self) -> Result<ReadStream> {
        let repl = self.repl()?;
        repl.exec_default(&format!(
            "import ubinascii\n\
             _f = open({}, \"rb\")\n\
             _mem = memoryview(bytearray({BLOCK_SIZE}))\n\
             def _b(blocks=8):\n\
             \x20 print(\"[\")\n\
             \x20 for _ in range(blocks):\n\
             \x20   n = _f.readinto(_mem)\n\
             \x20   if not n: break\n\
             \x20   print(ubinascii.b2a_base64(_mem[:n]), \",\")\n\
             \x20 print(\"]\")",
            self.quoted()
        ))?;
        // one batch per second of wire time
        let blocks_per_batch = (repl.baudrate() / 5120).max(1);
        Ok(ReadStream {
            repl,
            blocks_per_batch,
            pending: VecDeque::new(),
            finished: false,
        })
    }

    /// Read the whole file.
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        for block in self.read_as_stream()? {
            data.extend_from_slice(&block?);
        }
        Ok(data)
    }

    /// Overwrite the file with `data`, base64-chunked in 512-byte blocks.
    pub fn write_bytes(&self, data: &[u8]) -> Result<usize> {
        self.invalidate_stat();
        let repl = self.repl()?;
        repl.exec_default(&format!(
            "from ubinascii import a2b_base64 as a2b\n_f = open({}, \"wb\")",
            self.quoted()
        ))?;
        for chunk in data.chunks(BLOCK_SIZE) {
            repl.exec_default(&format!("_f.write(a2b('{}'))", BASE64.encode(chunk)))?;
        }
        repl.exec_default("_f.close(); del _f, a2b")?;
        Ok(data.len())
    }

    /// SHA-256 of the file contents.
    ///
    /// Hashes on the board when `uhashlib` is available; otherwise the
    /// content is streamed here and hashed locally. A missing file hashes
    /// to the empty digest so callers treat it as "must copy".
    pub fn sha256(&self) -> Result<Vec<u8>> {
        let repl = self.repl()?;
        let hashed = repl.exec_default(&format!(
            "import uhashlib\n\
             _h = uhashlib.sha256()\n\
             _mem = memoryview(bytearray({BLOCK_SIZE}))\n\
             with open({}, \"rb\") as _f:\n\
             \x20 while True:\n\
             \x20   n = _f.readinto(_mem)\n\
             \x20   if not n: break\n\
             \x20   _h.update(_mem[:n])\n\
             del n, _f, _mem",
            self.quoted()
        ));
        match hashed {
            Ok(_) => {
                let value = repl.evaluate("print(_h.digest()); del _h")?;
                Ok(value.as_bytes()?.to_vec())
            }
            Err(Error::Import(_)) => self.sha256_host_side(),
            Err(
                Error::FileNotFound
                | Error::FileExists
                | Error::PermissionDenied
                | Error::NoSuchDevice
                | Error::Os(_),
            ) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Fallback for boards without `uhashlib`: pull the content over the
    /// wire and hash here.
    fn sha256_host_side(&self) -> Result<Vec<u8>> {
        let stream = match self.read_as_stream() {
            Ok(stream) => stream,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut hash = hmac_sha256::Hash::new();
        for block in stream {
            hash.update(&block?);
        }
        Ok(hash.finalize().to_vec())
    }

    /// Pattern match below this path; see [`Glob`].
    pub fn glob(&self, pattern: &str) -> Glob {
        Glob::new(self.clone(), pattern)
    }

    /// Recursive directory traversal; see [`Walk`].
    pub fn walk(&self, topdown: bool) -> Walk {
        Walk::new(self.clone(), topdown)
    }
}

// ── Streamed read ────────────────────────────────────────────

/// Finite lazy sequence of byte blocks produced by
/// [`MpyPath::read_as_stream`].
pub struct ReadStream {
    repl: Arc<ReplCore>,
    blocks_per_batch: u32,
    pending: VecDeque<Vec<u8>>,
    finished: bool,
}

impl ReadStream {
    fn fetch_batch(&mut self) -> Result<()> {
        let value = self
            .repl
            .evaluate(&format!("_b({})", self.blocks_per_batch))?;
        let blocks = value.items()?;
        if blocks.is_empty() {
            self.finished = true;
            self.repl.exec_default("_f.close(); del _f, _b, _mem")?;
            return Ok(());
        }
        for block in blocks {
            let text = block.as_bytes()?;
            let trimmed = trim_ascii_end(text);
            let decoded = BASE64
                .decode(trimmed)
                .map_err(|e| Error::Literal(format!("bad base64 block: {e}")))?;
            self.pending.push_back(decoded);
        }
        Ok(())
    }
}

impl Iterator for ReadStream {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(block) = self.pending.pop_front() {
                return Some(Ok(block));
            }
            if self.finished {
                return None;
            }
            if let Err(e) = self.fetch_batch() {
                self.finished = true;
                return Some(Err(e));
            }
        }
    }
}

impl Drop for ReadStream {
    fn drop(&mut self) {
        if !self.finished {
            // consumer stopped early: tear down the remote reader state
            if let Err(e) = self.repl.exec_default("_f.close(); del _f, _b, _mem") {
                log::debug!("stream cleanup failed: {e}");
            }
        }
    }
}

fn trim_ascii_end(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0 && data[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    &data[..end]
}

// ── Tests ────────────────────────────────────────────────────
