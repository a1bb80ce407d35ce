//! Daemon launching.
//!
//! Launching is fire-and-forget: the console spawns the daemon detached from
//! its own stdio and process group, then discovers readiness by polling the
//! endpoint rather than by watching the child.

use std::io;
use std::process::{Command, Stdio};

use camino::Utf8PathBuf;
use ramona_config::{SocketEndpoint, SocketPreparationError};
use thiserror::Error;
use tracing::debug;

#[cfg(unix)]
use std::os::unix::process::CommandExt;

/// Errors raised while launching the daemon.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The socket directory could not be prepared.
    #[error("failed to prepare daemon socket: {0}")]
    PrepareSocket(#[from] SocketPreparationError),
    /// The daemon binary could not be spawned.
    #[error("failed to spawn daemon binary '{binary}': {source}")]
    Spawn {
        /// Binary that was executed.
        binary: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Starts the daemon in the background.
///
/// Implementations must not wait for the daemon to become ready and must be
/// safe to call when a daemon is already starting.
pub trait DaemonLauncher {
    /// Launches the daemon.
    fn launch(&self) -> Result<(), LaunchError>;
}

impl<F> DaemonLauncher for F
where
    F: Fn() -> Result<(), LaunchError>,
{
    fn launch(&self) -> Result<(), LaunchError> {
        self()
    }
}

/// Launches the configured daemon binary as a detached process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    binary: Utf8PathBuf,
    endpoint: SocketEndpoint,
}

impl ProcessLauncher {
    /// Creates a launcher that starts `binary` listening on `endpoint`.
    pub fn new(binary: impl Into<Utf8PathBuf>, endpoint: SocketEndpoint) -> Self {
        Self {
            binary: binary.into(),
            endpoint,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(self.binary.as_std_path());
        command
            .arg("--server-uri")
            .arg(self.endpoint.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        command.process_group(0);
        command
    }
}

impl DaemonLauncher for ProcessLauncher {
    fn launch(&self) -> Result<(), LaunchError> {
        self.endpoint.prepare_filesystem()?;
        let child = self
            .command()
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;
        debug!(binary = %self.binary, pid = child.id(), "spawned daemon");
        Ok(())
    }
}
