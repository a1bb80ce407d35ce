//! Shared configuration for the Ramona console.
//!
//! Configuration is layered by `ortho_config`: built-in defaults, then a TOML
//! file, then `RAMONA_*` environment variables, then command-line flags. The
//! result is resolved once, before the console issues any call to the daemon.

mod defaults;
mod logging;
mod socket;

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_CALL_TIMEOUT_MS, DEFAULT_DAEMON_BINARY, DEFAULT_LOG_FILTER, DEFAULT_POLL_ATTEMPTS,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_TCP_PORT, default_daemon_binary, default_log_filter,
    default_log_format, default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Resolved console configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(prefix = "RAMONA_")]
pub struct Config {
    /// Address of the daemon's control socket.
    #[ortho_config(default = default_socket_endpoint())]
    pub server_uri: SocketEndpoint,
    /// `tracing` filter expression for console diagnostics.
    #[ortho_config(default = default_log_filter())]
    pub log_filter: String,
    /// Output format for console diagnostics.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Binary launched when a command auto-starts the daemon.
    #[ortho_config(default = default_daemon_binary())]
    pub daemon_binary: Utf8PathBuf,
    /// Upper bound on a single call, in milliseconds.
    #[ortho_config(default = DEFAULT_CALL_TIMEOUT_MS)]
    pub call_timeout_ms: u64,
    /// Delay between connection attempts after auto-starting the daemon, in
    /// milliseconds.
    #[ortho_config(default = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,
    /// Number of connection attempts after auto-starting the daemon.
    #[ortho_config(default = DEFAULT_POLL_ATTEMPTS)]
    pub poll_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_uri: default_socket_endpoint(),
            log_filter: default_log_filter(),
            log_format: default_log_format(),
            daemon_binary: default_daemon_binary(),
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

impl Config {
    /// Endpoint the console connects to.
    #[must_use]
    pub const fn server_uri(&self) -> &SocketEndpoint {
        &self.server_uri
    }

    /// Filter expression handed to the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Diagnostics output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Default per-call deadline.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Delay between connection attempts after auto-starting the daemon.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
