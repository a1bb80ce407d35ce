//! Transport connections to the daemon.
//!
//! [`ConnectionManager`] opens the connection lazily and keeps it for the
//! life of the client. Opening is delegated to a [`Connector`] so the manager
//! does not care whether the stream is a TCP socket, a Unix socket, or a
//! scripted stand-in.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use ramona_config::SocketEndpoint;
use tracing::debug;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};

use super::ClientError;

/// Upper bound on a single connection attempt.
pub(crate) const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// A bidirectional byte stream with adjustable timeouts.
pub trait Transport: Read + Write {
    /// Sets the timeout applied to subsequent reads; `None` blocks forever.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
    /// Sets the timeout applied to subsequent writes; `None` blocks forever.
    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        Self::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        Self::set_write_timeout(self, timeout)
    }
}

#[cfg(unix)]
impl Transport for UnixStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        Self::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        Self::set_write_timeout(self, timeout)
    }
}

/// Live connection to a daemon endpoint.
#[derive(Debug)]
pub enum Connection {
    /// TCP stream.
    Tcp(TcpStream),
    /// Unix domain socket stream.
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

impl Transport for Connection {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.set_read_timeout(timeout),
            #[cfg(unix)]
            Self::Unix(stream) => stream.set_read_timeout(timeout),
        }
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.set_write_timeout(timeout),
            #[cfg(unix)]
            Self::Unix(stream) => stream.set_write_timeout(timeout),
        }
    }
}

/// Opens transport connections.
pub trait Connector {
    /// Stream produced by a successful open.
    type Stream: Transport;

    /// Attempts to open a connection, giving up after `timeout`.
    ///
    /// Returns `Ok(None)` when nothing is listening, which callers treat as
    /// "daemon not running" rather than as a failure.
    fn open(&mut self, timeout: Duration) -> Result<Option<Self::Stream>, ClientError>;

    /// Human-readable description of the target, used in diagnostics.
    fn endpoint(&self) -> String;
}

/// Connects to a configured [`SocketEndpoint`].
#[derive(Debug, Clone)]
pub struct EndpointConnector {
    endpoint: SocketEndpoint,
}

impl EndpointConnector {
    /// Creates a connector for `endpoint`.
    #[must_use]
    pub const fn new(endpoint: SocketEndpoint) -> Self {
        Self { endpoint }
    }
}

impl Connector for EndpointConnector {
    type Stream = Connection;

    fn open(&mut self, timeout: Duration) -> Result<Option<Connection>, ClientError> {
        match connect(&self.endpoint, timeout) {
            Ok(connection) => Ok(Some(connection)),
            Err(error) if is_daemon_absent(&self.endpoint, &error) => {
                debug!(endpoint = %self.endpoint, error = %error, "daemon not listening");
                Ok(None)
            }
            Err(source) => Err(ClientError::Connect {
                endpoint: self.endpoint.to_string(),
                source,
            }),
        }
    }

    fn endpoint(&self) -> String {
        self.endpoint.to_string()
    }
}

/// Refused connections mean nothing is listening. A missing socket file means
/// the same, but only for Unix endpoints.
fn is_daemon_absent(endpoint: &SocketEndpoint, error: &io::Error) -> bool {
    match error.kind() {
        io::ErrorKind::ConnectionRefused => true,
        io::ErrorKind::NotFound => endpoint.is_local(),
        _ => false,
    }
}

fn connect(endpoint: &SocketEndpoint, timeout: Duration) -> io::Result<Connection> {
    match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let address = resolve_tcp_address(host, *port)?;
            TcpStream::connect_timeout(&address, timeout).map(Connection::Tcp)
        }
        SocketEndpoint::Unix { path } => connect_unix(path.as_str(), timeout),
    }
}

fn resolve_tcp_address(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}

#[cfg(unix)]
fn connect_unix(path: &str, timeout: Duration) -> io::Result<Connection> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, timeout)?;
    let stream: UnixStream = socket.into();
    Ok(Connection::Unix(stream))
}

#[cfg(not(unix))]
fn connect_unix(_path: &str, _timeout: Duration) -> io::Result<Connection> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "unix sockets unsupported on this platform",
    ))
}

/// Owns the lazily opened connection.
///
/// A connection, once open, is reused until [`ConnectionManager::disconnect`]
/// drops it. Nothing reopens it behind the caller's back.
#[derive(Debug)]
pub struct ConnectionManager<C: Connector> {
    connector: C,
    stream: Option<C::Stream>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a manager with no open connection.
    pub const fn new(connector: C) -> Self {
        Self {
            connector,
            stream: None,
        }
    }

    /// Returns the open connection, opening one first if needed. `timeout`
    /// bounds the open attempt.
    ///
    /// `Ok(None)` means the daemon is not running.
    pub fn connect(&mut self, timeout: Duration) -> Result<Option<&mut C::Stream>, ClientError> {
        if self.stream.is_none() {
            self.stream = self.connector.open(timeout)?;
            if self.stream.is_some() {
                debug!(endpoint = %self.connector.endpoint(), "connected to daemon");
            }
        }
        Ok(self.stream.as_mut())
    }

    /// Reports whether a connection is currently held.
    pub const fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// The open connection, if any, without attempting to open one.
    pub const fn stream_mut(&mut self) -> Option<&mut C::Stream> {
        self.stream.as_mut()
    }

    /// Drops the open connection. Returns whether one was held.
    pub fn disconnect(&mut self) -> bool {
        let was_connected = self.stream.take().is_some();
        if was_connected {
            debug!(endpoint = %self.connector.endpoint(), "dropped daemon connection");
        }
        was_connected
    }

    /// Description of the endpoint this manager connects to.
    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }
}
