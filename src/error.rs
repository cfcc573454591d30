//! Unified error types for the REPL link and the remote filesystem.
//!
//! A single `Error` enum that every layer funnels into, keeping error
//! handling uniform from the wire up to the sync engine. Remote tracebacks
//! are classified into typed variants by [`classify_traceback`] so that
//! callers recover by inspecting the kind, not by scraping text.

use std::fmt;

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug)]
pub enum Error {
    /// No response packet arrived within the allotted window. The session
    /// is left in an unknown state and resynchronizes on the next exec.
    Timeout,
    /// A response packet was missing the `\x04` stdout/stderr separator.
    Desync(Vec<u8>),
    /// The board did not acknowledge the submitted program with `OK`.
    /// Carries the raw stdout bytes for diagnostics.
    NotAccepted(Vec<u8>),
    /// The transport behind a path object is gone (closed or detached).
    LinkClosed,
    /// No serial port matched the requested `hwgrep://` pattern.
    PortNotFound(String),
    /// Underlying serial port failure.
    Serial(serialport::Error),
    /// Underlying socket or host filesystem failure.
    Io(std::io::Error),
    /// Response text was not valid UTF-8.
    Utf8(std::str::Utf8Error),
    /// The board printed something outside the expected literal grammar.
    Literal(String),

    /// Remote `OSError` with errno 2.
    FileNotFound,
    /// Remote `OSError` with errno 17.
    FileExists,
    /// Remote `OSError` with errno 13.
    PermissionDenied,
    /// Remote `OSError` with errno 19.
    NoSuchDevice,
    /// Any other remote `OSError`, by errno.
    Os(i32),
    /// Remote or local `ValueError` (e.g. relative path where an absolute
    /// one is required).
    Value(String),
    /// Remote `KeyError`.
    Key(String),
    /// Remote `ImportError` (e.g. `uhashlib` missing on the board).
    Import(String),
    /// Any other remote traceback, as opaque text.
    Remote(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout waiting for response"),
            Self::Desync(data) => {
                write!(f, "CTRL-D missing in response: {}", printable(data))
            }
            Self::NotAccepted(data) => {
                write!(f, "data was not accepted: {}", printable(data))
            }
            Self::LinkClosed => write!(f, "connection to board is closed"),
            Self::PortNotFound(pattern) => write!(f, "no port matching {pattern:?}"),
            Self::Serial(e) => write!(f, "serial port: {e}"),
            Self::Io(e) => write!(f, "I/O: {e}"),
            Self::Utf8(e) => write!(f, "response not UTF-8: {e}"),
            Self::Literal(msg) => write!(f, "unparsable response: {msg}"),
            Self::FileNotFound => write!(f, "file not found"),
            Self::FileExists => write!(f, "file already exists"),
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::NoSuchDevice => write!(f, "no such device"),
            Self::Os(errno) => write!(f, "OSError: {errno}"),
            Self::Value(msg) => write!(f, "ValueError: {msg}"),
            Self::Key(msg) => write!(f, "KeyError: {msg}"),
            Self::Import(msg) => write!(f, "ImportError: {msg}"),
            Self::Remote(text) => write!(f, "execution failed: {text}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serial(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Utf8(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serialport::Error> for Error {
    fn from(e: serialport::Error) -> Self {
        Self::Serial(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::Utf8(e)
    }
}

impl Error {
    /// True for the variants that mean "the path does not exist remotely".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::FileNotFound)
    }

    /// True when the error left the session state unknown and the next
    /// exec must resynchronize first.
    pub fn poisons_session(&self) -> bool {
        matches!(self, Self::Timeout | Self::Desync(_) | Self::NotAccepted(_))
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;

fn printable(data: &[u8]) -> String {
    data.iter()
        .flat_map(|b| std::ascii::escape_default(*b))
        .map(char::from)
        .collect()
}

// ── Traceback classification ─────────────────────────────────

/// Convert the stderr text of a failed exec into a typed error.
///
/// Matches `OSError: [Errno N] ...` and the bare `OSError: N` form on the
/// last traceback line, then `ValueError` / `KeyError` / `ImportError`.
/// Anything else is surfaced as an opaque [`Error::Remote`].
pub fn classify_traceback(stderr: &str) -> Error {
    let mut lines = stderr.lines();
    let Some(first) = lines.next() else {
        return Error::Remote(stderr.to_string());
    };
    if !first.starts_with("Traceback") {
        return Error::Remote(stderr.to_string());
    }
    let last = lines.last().unwrap_or(first);

    if let Some(errno) = parse_oserror(last) {
        return match errno {
            2 => Error::FileNotFound,
            13 => Error::PermissionDenied,
            17 => Error::FileExists,
            19 => Error::NoSuchDevice,
            n => Error::Os(n),
        };
    }
    if let Some(rest) = last.strip_prefix("ValueError: ") {
        return Error::Value(rest.to_string());
    }
    if let Some(rest) = last.strip_prefix("KeyError: ") {
        return Error::Key(rest.to_string());
    }
    if let Some(rest) = last.strip_prefix("ImportError: ") {
        return Error::Import(rest.to_string());
    }
    Error::Remote(stderr.to_string())
}

/// Parse `OSError: [Errno N] ...` or `OSError: N`, returning N.
fn parse_oserror(line: &str) -> Option<i32> {
    let rest = line.strip_prefix("OSError: ")?;
    let digits = rest.strip_prefix("[Errno ").unwrap_or(rest);
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse().ok()
}

// ── Tests ────────────────────────────────────────────────────
