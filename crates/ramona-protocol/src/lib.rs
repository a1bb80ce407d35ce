//! Wire protocol spoken between the Ramona console and its supervisor daemon.
//!
//! Every exchange is one request frame followed by one response frame. All
//! integer fields are big-endian:
//!
//! ```text
//! request:  MAGIC_REQ(4) | CALL_ID(4) | LEN(2) | PAYLOAD(LEN)
//! response: MAGIC_RESP(4) | RESULT_TAG(1) | LEN(2) | PAYLOAD(LEN)
//! ```
//!
//! Payloads are opaque bytes and must be shorter than 65536 bytes.

mod codec;
mod error;

use std::fmt;

pub use codec::{encode_request, encode_response, read_request, read_response};
pub use error::{FrameSection, ProtocolError};

/// Magic constant opening every request frame (`"RMC>"`).
pub const REQUEST_MAGIC: u32 = 0x524D_433E;

/// Magic constant opening every response frame (`"RMC<"`).
pub const RESPONSE_MAGIC: u32 = 0x524D_433C;

/// Largest payload a frame can carry.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Size of the fixed request header.
pub const REQUEST_HEADER_LEN: usize = 10;

/// Size of the fixed response header.
pub const RESPONSE_HEADER_LEN: usize = 7;

/// Well-known operation selectors understood by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallId {
    /// Start programs.
    Start,
    /// Stop programs.
    Stop,
    /// Restart programs.
    Restart,
    /// Report program status.
    Status,
}

impl CallId {
    /// Numeric selector carried on the wire.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Start => 1,
            Self::Stop => 2,
            Self::Restart => 3,
            Self::Status => 4,
        }
    }
}

impl From<CallId> for u32 {
    fn from(call: CallId) -> Self {
        call.code()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => formatter.write_str("start"),
            Self::Stop => formatter.write_str("stop"),
            Self::Restart => formatter.write_str("restart"),
            Self::Status => formatter.write_str("status"),
        }
    }
}

/// Outcome marker carried by a response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultTag {
    /// The call returned normally; the payload is its result.
    Ok,
    /// The call raised; the payload is the failure message.
    Exception,
}

impl ResultTag {
    /// Byte value carried on the wire.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Exception => 1,
        }
    }
}

impl TryFrom<u8> for ResultTag {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ok),
            1 => Ok(Self::Exception),
            other => Err(ProtocolError::UnknownResultTag(other)),
        }
    }
}

/// A decoded request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    /// Operation selector.
    pub call_id: u32,
    /// Opaque call parameters.
    pub payload: Vec<u8>,
}

/// A decoded response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResponse {
    /// Whether the call returned or raised.
    pub tag: ResultTag,
    /// Result or failure message.
    pub payload: Vec<u8>,
}
