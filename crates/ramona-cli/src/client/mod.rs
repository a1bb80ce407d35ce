//! Request/response calls into the daemon.
//!
//! A [`Client`] owns one lazily opened connection and performs one call at a
//! time over it. Each call walks `idle -> connecting -> sending ->
//! awaiting response` and ends resolved or failed; transitions are traced at
//! `trace` level.

mod connection;
mod deadline;
mod error;

use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use ramona_config::{
    Config, DEFAULT_CALL_TIMEOUT_MS, DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL_MS,
    SocketEndpoint,
};
use ramona_protocol::{CallResponse, ResultTag, encode_request, read_response};
use tracing::{debug, trace, warn};

pub use connection::{Connection, ConnectionManager, Connector, EndpointConnector, Transport};
pub use error::{CallStage, ClientError, ErrorKind};

use crate::launcher::DaemonLauncher;
use connection::CONNECTION_TIMEOUT;
use deadline::{Deadline, DeadlineReader};

/// How a call obtains its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectPolicy {
    /// Use the connection the caller already opened.
    Manual,
    /// Open a connection if needed; fail if the daemon is not running.
    AutoConnect,
    /// Open a connection if needed, launching the daemon when it is absent.
    AutoStart,
}

/// Polling behaviour after launching the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoStartSettings {
    /// Delay before each connection attempt.
    pub interval: Duration,
    /// Connection attempts made before giving up.
    pub attempts: u32,
}

impl Default for AutoStartSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

impl From<&Config> for AutoStartSettings {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.poll_interval(),
            attempts: config.poll_attempts,
        }
    }
}

/// Client side of the daemon call protocol.
///
/// The connection is guarded by a mutex held for the whole round trip, so
/// concurrent callers are served one at a time and never interleave frames.
pub struct Client<C: Connector, L: DaemonLauncher> {
    connection: Mutex<ConnectionManager<C>>,
    launcher: L,
    auto_start: AutoStartSettings,
    default_timeout: Duration,
}

impl<L: DaemonLauncher> Client<EndpointConnector, L> {
    /// Creates a client for a configured endpoint.
    pub fn for_endpoint(endpoint: SocketEndpoint, launcher: L) -> Self {
        Self::new(EndpointConnector::new(endpoint), launcher)
    }
}

impl<C: Connector, L: DaemonLauncher> Client<C, L> {
    /// Creates a client with default polling and timeout settings.
    pub fn new(connector: C, launcher: L) -> Self {
        Self {
            connection: Mutex::new(ConnectionManager::new(connector)),
            launcher,
            auto_start: AutoStartSettings::default(),
            default_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
        }
    }

    /// Overrides the auto-start polling settings.
    #[must_use]
    pub const fn with_auto_start(mut self, settings: AutoStartSettings) -> Self {
        self.auto_start = settings;
        self
    }

    /// Overrides the deadline used when a call does not supply one.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Opens the connection if it is not open yet. Returns whether a
    /// connection is now held.
    pub fn connect(&self) -> Result<bool, ClientError> {
        let mut manager = self.lock();
        Ok(manager.connect(CONNECTION_TIMEOUT)?.is_some())
    }

    /// Drops the connection. Returns whether one was held.
    pub fn disconnect(&self) -> bool {
        self.lock().disconnect()
    }

    /// Reports whether a connection is held.
    pub fn is_connected(&self) -> bool {
        self.lock().is_connected()
    }

    /// Description of the daemon endpoint, used in diagnostics.
    pub fn endpoint(&self) -> String {
        self.lock().endpoint()
    }

    /// Performs one call and returns the daemon's result payload.
    ///
    /// `deadline` bounds connecting, auto-start polling, sending and the wait
    /// for the response, measured from now; `None` uses the client's default
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] describing why the call did not produce a
    /// result; [`ClientError::kind`] classifies it.
    pub fn invoke(
        &self,
        call_id: u32,
        payload: &[u8],
        policy: ConnectPolicy,
        deadline: Option<Duration>,
    ) -> Result<Vec<u8>, ClientError> {
        let deadline = Deadline::after(deadline.unwrap_or(self.default_timeout));
        let request = encode_request(call_id, payload)?;

        let mut manager = self.lock();
        trace!(call_id, ?policy, "idle -> connecting");
        self.acquire(&mut manager, policy, deadline)?;
        let Some(stream) = manager.stream_mut() else {
            return Err(ClientError::NotConnected);
        };

        let outcome = exchange(stream, &request, deadline).and_then(resolve);
        match &outcome {
            Ok(result) => trace!(call_id, len = result.len(), "awaiting response -> resolved"),
            Err(error) => {
                trace!(call_id, %error, "awaiting response -> failed");
                if error.poisons_connection() {
                    warn!(call_id, %error, "discarding daemon connection");
                    manager.disconnect();
                }
            }
        }
        outcome
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionManager<C>> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(
        &self,
        manager: &mut ConnectionManager<C>,
        policy: ConnectPolicy,
        deadline: Deadline,
    ) -> Result<(), ClientError> {
        match policy {
            ConnectPolicy::Manual if manager.is_connected() => Ok(()),
            ConnectPolicy::Manual => Err(ClientError::NotConnected),
            ConnectPolicy::AutoConnect => {
                if connect_within(manager, deadline)? {
                    Ok(())
                } else {
                    Err(ClientError::ServerAbsent {
                        endpoint: manager.endpoint(),
                    })
                }
            }
            ConnectPolicy::AutoStart => {
                if connect_within(manager, deadline)? {
                    Ok(())
                } else {
                    self.start_daemon(manager, deadline)
                }
            }
        }
    }

    fn start_daemon(
        &self,
        manager: &mut ConnectionManager<C>,
        deadline: Deadline,
    ) -> Result<(), ClientError> {
        let endpoint = manager.endpoint();
        warn!(%endpoint, "daemon is not running; launching it");
        if let Err(source) = self.launcher.launch() {
            return Err(ClientError::ServerStartFailed {
                endpoint,
                attempts: 0,
                source: Some(source),
            });
        }

        let mut attempts = 0;
        while attempts < self.auto_start.attempts && deadline.allows(self.auto_start.interval) {
            thread::sleep(self.auto_start.interval);
            let Some(timeout) = deadline.connect_timeout(CONNECTION_TIMEOUT) else {
                break;
            };
            attempts += 1;
            if manager.connect(timeout)?.is_some() {
                debug!(%endpoint, attempts, "daemon came up");
                return Ok(());
            }
        }
        Err(ClientError::ServerStartFailed {
            endpoint,
            attempts,
            source: None,
        })
    }
}

/// Opens the connection if needed, never waiting past the deadline.
fn connect_within<C: Connector>(
    manager: &mut ConnectionManager<C>,
    deadline: Deadline,
) -> Result<bool, ClientError> {
    let Some(timeout) = deadline.connect_timeout(CONNECTION_TIMEOUT) else {
        return Err(ClientError::DeadlineElapsed {
            stage: CallStage::Connecting,
        });
    };
    Ok(manager.connect(timeout)?.is_some())
}

fn exchange<T: Transport>(
    stream: &mut T,
    request: &[u8],
    deadline: Deadline,
) -> Result<CallResponse, ClientError> {
    trace!(len = request.len(), "connecting -> sending");
    let timeout = deadline
        .socket_timeout()
        .map_err(|_| ClientError::DeadlineElapsed {
            stage: CallStage::Connecting,
        })?;
    stream
        .set_write_timeout(timeout)
        .and_then(|()| stream.write_all(request))
        .and_then(|()| stream.flush())
        .map_err(send_failure)?;

    trace!("sending -> awaiting response");
    let mut reader = DeadlineReader::new(stream, deadline);
    read_response(&mut reader).map_err(ClientError::from)
}

fn send_failure(error: io::Error) -> ClientError {
    match error.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ClientError::DeadlineElapsed {
            stage: CallStage::Sending,
        },
        _ => ClientError::Send(error),
    }
}

fn resolve(response: CallResponse) -> Result<Vec<u8>, ClientError> {
    match response.tag {
        ResultTag::Ok => Ok(response.payload),
        ResultTag::Exception => Err(ClientError::RemoteException {
            message: String::from_utf8_lossy(&response.payload).into_owned(),
        }),
    }
}
