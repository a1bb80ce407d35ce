use std::fmt;
use std::fs::DirBuilder;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Host, Url};

/// Bytes that would change meaning inside a `unix://` URL path.
const UNIX_PATH_ESCAPES: &AsciiSet = &CONTROLS.add(b' ').add(b'%').add(b'?').add(b'#');

/// Address of the supervisor daemon's control socket.
///
/// The endpoint is resolved once from configuration and never changes for
/// the lifetime of a client.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub enum SocketEndpoint {
    /// Unix domain socket endpoint.
    Unix {
        /// Filesystem path of the socket.
        path: Utf8PathBuf,
    },
    /// TCP socket endpoint.
    Tcp {
        /// Host name or IP literal.
        host: String,
        /// TCP port.
        port: u16,
    },
}

impl SocketEndpoint {
    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Builds a TCP socket endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Returns the Unix socket path when the endpoint uses the Unix transport.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_ref()),
            Self::Tcp { .. } => None,
        }
    }

    /// Reports whether the endpoint is a local filesystem socket.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Unix { .. })
    }

    /// Ensures the socket's parent directory exists with restrictive permissions.
    ///
    /// The daemon binds the socket itself; the client only makes sure the
    /// directory is there before launching it.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(path) = self.unix_path() else {
            return Ok(());
        };
        let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) else {
            return Err(SocketPreparationError::MissingParent {
                path: path.to_path_buf(),
            });
        };

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        if let Err(source) = builder.create(parent.as_std_path())
            && source.kind() != std::io::ErrorKind::AlreadyExists
        {
            return Err(SocketPreparationError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            });
        }

        Ok(())
    }

    fn from_url(input: &str) -> Result<Self, SocketParseError> {
        let url = Url::parse(input)?;
        match url.scheme() {
            "unix" => {
                let decoded = percent_decode_str(url.path())
                    .decode_utf8()
                    .map_err(|_| SocketParseError::InvalidUnixPath(input.to_owned()))?;
                if decoded.is_empty() {
                    return Err(SocketParseError::MissingUnixPath(input.to_owned()));
                }
                Ok(Self::unix(decoded.into_owned()))
            }
            "tcp" => {
                let host = match url.host() {
                    Some(Host::Domain(domain)) => domain.to_owned(),
                    Some(Host::Ipv4(address)) => address.to_string(),
                    Some(Host::Ipv6(address)) => address.to_string(),
                    None => return Err(SocketParseError::MissingHost(input.to_owned())),
                };
                let port = url
                    .port()
                    .ok_or_else(|| SocketParseError::MissingPort(input.to_owned()))?;
                Ok(Self::tcp(host, port))
            }
            other => Err(SocketParseError::UnsupportedScheme(other.to_owned())),
        }
    }

    fn from_bare(input: &str) -> Result<Self, SocketParseError> {
        if input.contains('/') {
            return Ok(Self::unix(input));
        }
        let Some((host, port)) = input.rsplit_once(':') else {
            return Err(SocketParseError::Unrecognised(input.to_owned()));
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(SocketParseError::MissingHost(input.to_owned()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| SocketParseError::MissingPort(input.to_owned()))?;
        Ok(Self::tcp(host, port))
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } if path.is_absolute() => write!(
                formatter,
                "unix://{}",
                utf8_percent_encode(path.as_str(), UNIX_PATH_ESCAPES)
            ),
            // Relative paths have no URL form; the bare spelling keeps them relative.
            Self::Unix { path } if path.as_str().contains('/') => write!(formatter, "{path}"),
            Self::Unix { path } => write!(formatter, "./{path}"),
            Self::Tcp { host, port } if host.contains(':') => {
                write!(formatter, "tcp://[{host}]:{port}")
            }
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

/// Accepts `unix:///path`, `tcp://host:port`, a bare path containing `/`,
/// or a bare `host:port` pair.
impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(SocketParseError::Empty);
        }
        if trimmed.contains("://") {
            Self::from_url(trimmed)
        } else {
            Self::from_bare(trimmed)
        }
    }
}

impl TryFrom<String> for SocketEndpoint {
    type Error = SocketParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SocketEndpoint> for String {
    fn from(endpoint: SocketEndpoint) -> Self {
        endpoint.to_string()
    }
}

/// Errors encountered while parsing a [`SocketEndpoint`] from text.
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// The address string was blank.
    #[error("daemon socket address is empty")]
    Empty,
    /// Scheme was not recognised.
    #[error("unsupported socket scheme '{0}'")]
    UnsupportedScheme(String),
    /// TCP host name was missing.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// TCP port was missing from the address.
    #[error("missing or invalid TCP port in '{0}'")]
    MissingPort(String),
    /// Unix socket path was absent.
    #[error("missing Unix socket path in '{0}'")]
    MissingUnixPath(String),
    /// Unix socket path was not valid UTF-8 once decoded.
    #[error("Unix socket path in '{0}' is not valid UTF-8")]
    InvalidUnixPath(String),
    /// Neither a path nor a `host:port` pair.
    #[error("'{0}' is neither a socket path nor a host:port pair")]
    Unrecognised(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Errors raised when preparing socket directories.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// Parent directory is missing when creating a Unix socket path.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent {
        /// Offending socket path.
        path: Utf8PathBuf,
    },
    /// Failed to create or adjust socket directories.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn display_unix_socket() {
        let endpoint = SocketEndpoint::unix(Utf8PathBuf::from("/tmp/ramona.sock"));
        assert_eq!(endpoint.to_string(), "unix:///tmp/ramona.sock");
    }

    #[test]
    fn display_brackets_ipv6_hosts() {
        let endpoint = SocketEndpoint::tcp("::1", 7788);
        assert_eq!(endpoint.to_string(), "tcp://[::1]:7788");
    }

    #[rstest]
    #[case("tcp://127.0.0.1:9000", SocketEndpoint::tcp("127.0.0.1", 9000))]
    #[case("tcp://localhost:5588", SocketEndpoint::tcp("localhost", 5588))]
    #[case("tcp://[::1]:7788", SocketEndpoint::tcp("::1", 7788))]
    #[case("unix:///run/ramona/ramona.sock", SocketEndpoint::unix("/run/ramona/ramona.sock"))]
    #[case("unix:///tmp/with%20space.sock", SocketEndpoint::unix("/tmp/with space.sock"))]
    #[case("/var/run/ramona.sock", SocketEndpoint::unix("/var/run/ramona.sock"))]
    #[case("./ramona.sock", SocketEndpoint::unix("./ramona.sock"))]
    #[case("localhost:5588", SocketEndpoint::tcp("localhost", 5588))]
    #[case("  10.0.0.1:80  ", SocketEndpoint::tcp("10.0.0.1", 80))]
    fn parses_supported_spellings(#[case] input: &str, #[case] expected: SocketEndpoint) {
        let endpoint: SocketEndpoint = input.parse().expect("endpoint should parse");
        assert_eq!(endpoint, expected);
    }

    #[rstest]
    #[case("")]
    #[case("ramona")]
    #[case("localhost:http")]
    #[case(":5588")]
    #[case("tcp://127.0.0.1")]
    #[case("http://127.0.0.1:80")]
    #[case("unix://")]
    fn rejects_malformed_addresses(#[case] input: &str) {
        assert!(input.parse::<SocketEndpoint>().is_err(), "{input:?} should fail");
    }

    #[rstest]
    #[case::ipv6(SocketEndpoint::tcp("::1", 4000))]
    #[case::absolute(SocketEndpoint::unix("/run/ramona/ramona.sock"))]
    #[case::dot_relative(SocketEndpoint::unix("./ramona.sock"))]
    #[case::nested_relative(SocketEndpoint::unix("run/ramona.sock"))]
    #[case::escaped(SocketEndpoint::unix("/tmp/odd dir/100%#1.sock"))]
    fn display_round_trips_through_parse(#[case] endpoint: SocketEndpoint) {
        let reparsed: SocketEndpoint = endpoint.to_string().parse().expect("reparse");
        assert_eq!(reparsed, endpoint);
    }

    #[test]
    fn relative_paths_display_without_a_scheme() {
        assert_eq!(SocketEndpoint::unix("./ramona.sock").to_string(), "./ramona.sock");
        assert_eq!(SocketEndpoint::unix("ramona.sock").to_string(), "./ramona.sock");
    }

    #[test]
    fn prepare_filesystem_creates_parent_directory() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let socket = dir.path().join("nested").join("ramona.sock");
        let endpoint = SocketEndpoint::unix(socket.to_str().expect("utf8 path"));
        endpoint.prepare_filesystem().expect("prepare socket dir");
        assert!(socket.parent().expect("parent").is_dir());
    }

    #[test]
    fn prepare_filesystem_ignores_tcp() {
        SocketEndpoint::tcp("127.0.0.1", 1)
            .prepare_filesystem()
            .expect("tcp endpoints need no directory");
    }
}
