//! Errors raised while encoding or decoding frames.

use std::fmt;
use std::io;

use thiserror::Error;

/// Part of a frame being read when a transport failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSection {
    /// The fixed-size header.
    Header,
    /// The length-prefixed payload.
    Payload,
}

impl fmt::Display for FrameSection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => formatter.write_str("header"),
            Self::Payload => formatter.write_str("payload"),
        }
    }
}

/// Failures produced by the codec.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload does not fit the 16-bit length field.
    #[error("payload of {len} bytes exceeds the {max} byte frame limit", max = crate::MAX_PAYLOAD_LEN)]
    PayloadTooLarge {
        /// Rejected payload length.
        len: usize,
    },
    /// Frame did not start with the expected magic constant.
    #[error("bad frame magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic {
        /// Magic the reader required.
        expected: u32,
        /// Magic actually received.
        found: u32,
    },
    /// Response carried a result tag outside the known set.
    #[error("unrecognised result tag {0}")]
    UnknownResultTag(u8),
    /// Peer closed the stream before the frame was complete.
    #[error("peer closed the connection after {received} of {expected} {section} bytes")]
    PeerClosed {
        /// Section being read.
        section: FrameSection,
        /// Bytes of the section already received.
        received: usize,
        /// Bytes the section requires.
        expected: usize,
    },
    /// Reads stopped making progress (timeout or would-block).
    #[error("read stalled after {received} of {expected} {section} bytes: {source}")]
    Stalled {
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
    /// Any other transport failure.
    #[error("transport error while reading frame {section}: {source}")]
    Io {
        /// Section being read.
        section: FrameSection,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl ProtocolError {
    /// Reports whether the error means the peer is speaking something else.
    #[must_use]
    pub const fn is_violation(&self) -> bool {
        matches!(self, Self::BadMagic { .. } | Self::UnknownResultTag(_))
    }
}
