//! Link configuration.
//!
//! All tunable parameters for a board connection. Defaults follow the
//! conventions of the MicroPython ecosystem; the `MPY_*` environment
//! variables override them the same way the command line tools do.

use std::time::Duration;

/// Default port URL when nothing is configured: any USB serial adapter.
pub const DEFAULT_PORT: &str = "hwgrep://USB";

/// Default baud rate of MicroPython boards.
pub const DEFAULT_BAUDRATE: u32 = 115_200;

/// Floor for wire read timeouts. The reader thread wakes at least this
/// often to check its stop flag.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Settle delay between the mode-control writes during raw REPL entry.
pub const MODE_SETTLE: Duration = Duration::from_millis(200);

/// Default timeout for filesystem-sized execs.
pub const EXEC_TIMEOUT: Duration = Duration::from_secs(3);

/// Connection parameters for a board.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Port URL: a device path (`/dev/ttyACM0`), a hardware search pattern
    /// (`hwgrep://USB`, matched against device name, VID:PID and product
    /// strings), or a TCP tunnel (`socket://host:port`).
    pub port: String,
    /// Serial baud rate. Also paces the streamed-read batch size.
    pub baudrate: u32,
    /// Response to a `Login as: ` prompt, for network-attached boards.
    pub user: Option<String>,
    /// Response to a `Password: ` prompt.
    pub password: Option<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baudrate: DEFAULT_BAUDRATE,
            user: None,
            password: None,
        }
    }
}

impl LinkConfig {
    /// Configuration for a concrete port at the default baud rate.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by the `MPY_PORT`, `MPY_BAUDRATE`, `MPY_USER`
    /// and `MPY_PASSWORD` environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(port) = std::env::var("MPY_PORT") {
            cfg.port = port;
        }
        if let Ok(baud) = std::env::var("MPY_BAUDRATE") {
            if let Ok(baud) = baud.parse() {
                cfg.baudrate = baud;
            }
        }
        cfg.user = std::env::var("MPY_USER").ok();
        cfg.password = std::env::var("MPY_PASSWORD").ok();
        cfg
    }

    /// Number of 512-byte blocks per streamed-read batch, sized so one
    /// batch fits in roughly a second of wire time at the current baud.
    pub fn blocks_per_batch(&self) -> u32 {
        (self.baudrate / 5120).max(1)
    }
}

// ── Tests ────────────────────────────────────────────────────
