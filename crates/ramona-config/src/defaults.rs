use camino::Utf8PathBuf;
#[cfg(unix)]
use std::env;

#[cfg(unix)]
use libc::geteuid;

use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Default TCP port used when Unix domain sockets are not available.
pub const DEFAULT_TCP_PORT: u16 = 5588;

/// Default log filter expression used by the console.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Binary spawned when the console auto-starts the supervisor.
pub const DEFAULT_DAEMON_BINARY: &str = "ramonad";

/// Delay between connection attempts while waiting for an auto-started daemon.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Number of connection attempts made after launching the daemon.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 100;

/// Upper bound on a single call when the caller does not pass a deadline.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Owned daemon binary name used by serde defaults.
#[must_use]
pub fn default_daemon_binary() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_DAEMON_BINARY)
}

/// Diagnostics format used when none is configured.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::default()
}

/// Computes the default socket endpoint for the daemon.
#[must_use]
pub fn default_socket_endpoint() -> SocketEndpoint {
    default_socket_endpoint_inner()
}

#[cfg(unix)]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    let (mut base, apply_namespace) = match runtime_base_directory() {
        Some(dir) => (dir, false),
        None => (fallback_base_directory(), true),
    };

    base.push("ramona");
    if apply_namespace {
        base.push(user_namespace());
    }

    SocketEndpoint::unix(base.join("ramona.sock"))
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    dirs::runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

#[cfg(unix)]
fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
fn user_namespace() -> String {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn default_endpoint_is_a_socket_under_a_ramona_directory() {
        let endpoint = default_socket_endpoint();
        let path = endpoint.unix_path().expect("unix endpoint by default");
        assert_eq!(path.file_name(), Some("ramona.sock"));
        assert!(path.as_str().contains("ramona"), "unexpected path {path}");
    }
}
