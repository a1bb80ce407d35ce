//! Failure taxonomy for calls into the daemon.

use std::fmt;
use std::io;

use ramona_protocol::{FrameSection, ProtocolError};
use thiserror::Error;

use crate::launcher::LaunchError;

/// Closed classification of call failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Nothing is listening at the endpoint.
    ServerAbsent,
    /// The daemon did not appear after being launched.
    ServerStartFailed,
    /// Any other transport failure.
    Io,
    /// The peer sent something that is not a valid response frame.
    ProtocolViolation,
    /// The request payload cannot be framed.
    PayloadTooLarge,
    /// The daemon reported that the call raised.
    RemoteException,
    /// The call did not complete before its deadline.
    StalledRead,
    /// The daemon closed the connection mid-frame.
    PeerClosed,
    /// A manual call was issued without an established connection.
    NotConnected,
}

impl ErrorKind {
    /// Whether a caller can sensibly react to the failure and carry on.
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::ServerAbsent | Self::RemoteException)
    }

    /// Process exit code reported for the failure.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::ServerAbsent => 2,
            Self::ServerStartFailed => 3,
            Self::Io => 4,
            Self::ProtocolViolation => 5,
            Self::PayloadTooLarge => 6,
            Self::RemoteException => 7,
            Self::StalledRead => 8,
            Self::PeerClosed => 9,
            Self::NotConnected => 70,
        }
    }
}

/// Point in a call at which its deadline ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStage {
    /// Before any request byte was written.
    Connecting,
    /// While the request was being written.
    Sending,
}

impl fmt::Display for CallStage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => formatter.write_str("connecting to the daemon"),
            Self::Sending => formatter.write_str("sending the request"),
        }
    }
}

/// Errors raised while performing a call.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Nothing accepted the connection.
    #[error("daemon is not responding at {endpoint}; it may not be running")]
    ServerAbsent {
        /// Endpoint that was tried.
        endpoint: String,
    },
    /// Auto-start launched the daemon (or failed to) and it never appeared.
    #[error(
        "daemon at {endpoint} failed to start after {attempts} connection attempts{}",
        launch_suffix(.source.as_ref())
    )]
    ServerStartFailed {
        /// Endpoint that was polled.
        endpoint: String,
        /// Connection attempts made after the launch.
        attempts: u32,
        /// Launch failure, when the daemon could not be spawned at all.
        #[source]
        source: Option<LaunchError>,
    },
    /// Opening the transport failed for a reason other than absence.
    #[error("failed to connect to daemon at {endpoint}: {source}")]
    Connect {
        /// Endpoint that was tried.
        endpoint: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the request failed.
    #[error("failed to send request to daemon: {0}")]
    Send(#[source] io::Error),
    /// Reading the response failed.
    #[error("failed to read response from daemon: {0}")]
    Receive(#[source] io::Error),
    /// The response frame was malformed.
    #[error("daemon sent an invalid response: {0}")]
    ProtocolViolation(#[source] ProtocolError),
    /// The request payload does not fit in a frame.
    #[error("request payload of {len} bytes is too large to send")]
    PayloadTooLarge {
        /// Rejected payload length.
        len: usize,
    },
    /// The call raised inside the daemon.
    #[error("{message}")]
    RemoteException {
        /// Failure message sent by the daemon.
        message: String,
    },
    /// The deadline passed while waiting for the response.
    #[error("daemon stopped responding after {received} of {expected} response {section} bytes")]
    StalledRead {
        /// Section being read.
        section: FrameSection,
        /// Bytes of the section already received.
        received: usize,
        /// Bytes the section requires.
        expected: usize,
        /// Timeout reported by the transport.
        #[source]
        source: io::Error,
    },
    /// The deadline passed before the request was on the wire.
    #[error("call deadline elapsed while {stage}")]
    DeadlineElapsed {
        /// Where the call was when time ran out.
        stage: CallStage,
    },
    /// The daemon hung up before the response was complete.
    #[error("daemon closed the connection after {received} of {expected} response {section} bytes")]
    PeerClosed {
        /// Section being read.
        section: FrameSection,
        /// Bytes of the section already received.
        received: usize,
        /// Bytes the section requires.
        expected: usize,
    },
    /// A manual call found no open connection.
    #[error("no daemon connection is open for a manual call")]
    NotConnected,
}

fn launch_suffix(source: Option<&LaunchError>) -> String {
    source.map_or_else(String::new, |error| format!(": {error}"))
}

impl ClientError {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ServerAbsent { .. } => ErrorKind::ServerAbsent,
            Self::ServerStartFailed { .. } => ErrorKind::ServerStartFailed,
            Self::Connect { .. } | Self::Send(_) | Self::Receive(_) => ErrorKind::Io,
            Self::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            Self::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Self::RemoteException { .. } => ErrorKind::RemoteException,
            Self::StalledRead { .. } | Self::DeadlineElapsed { .. } => ErrorKind::StalledRead,
            Self::PeerClosed { .. } => ErrorKind::PeerClosed,
            Self::NotConnected => ErrorKind::NotConnected,
        }
    }

    /// Whether the connection can no longer be trusted after this error.
    ///
    /// Once a frame has been partially written or read the stream position is
    /// unknown, so the connection must be dropped.
    pub(crate) const fn poisons_connection(&self) -> bool {
        matches!(
            self,
            Self::Send(_)
                | Self::Receive(_)
                | Self::ProtocolViolation(_)
                | Self::StalledRead { .. }
                | Self::DeadlineElapsed {
                    stage: CallStage::Sending
                }
                | Self::PeerClosed { .. }
        )
    }
}

impl From<ProtocolError> for ClientError {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::PayloadTooLarge { len } => Self::PayloadTooLarge { len },
            ProtocolError::PeerClosed {
                section,
                received,
                expected,
            } => Self::PeerClosed {
                section,
                received,
                expected,
            },
            ProtocolError::Stalled {
                section,
                received,
                expected,
                source,
            } => Self::StalledRead {
                section,
                received,
                expected,
                source,
            },
            ProtocolError::Io { source, .. } => Self::Receive(source),
            violation @ (ProtocolError::BadMagic { .. } | ProtocolError::UnknownResultTag(_)) => {
                Self::ProtocolViolation(violation)
            }
        }
    }
}
