//! Frame encoding and incremental decoding.
//!
//! Decoding never assumes a single `read` returns a whole header or payload:
//! bytes are accumulated into exactly-sized buffers, so a reader is never
//! consumed past the end of the frame being decoded.

use std::io::{self, Read};

use crate::error::{FrameSection, ProtocolError};
use crate::{
    CallRequest, CallResponse, REQUEST_HEADER_LEN, REQUEST_MAGIC, RESPONSE_HEADER_LEN,
    RESPONSE_MAGIC, ResultTag,
};

/// Encodes a request frame.
///
/// Oversized payloads are rejected before any byte is produced.
pub fn encode_request(call_id: u32, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = payload_len(payload)?;
    let mut frame = Vec::with_capacity(REQUEST_HEADER_LEN + payload.len());
    frame.extend_from_slice(&REQUEST_MAGIC.to_be_bytes());
    frame.extend_from_slice(&call_id.to_be_bytes());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Encodes a response frame.
pub fn encode_response(tag: ResultTag, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = payload_len(payload)?;
    let mut frame = Vec::with_capacity(RESPONSE_HEADER_LEN + payload.len());
    frame.extend_from_slice(&RESPONSE_MAGIC.to_be_bytes());
    frame.push(tag.as_byte());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Reads one request frame.
pub fn read_request<R: Read + ?Sized>(reader: &mut R) -> Result<CallRequest, ProtocolError> {
    let mut header = [0_u8; REQUEST_HEADER_LEN];
    fill(reader, &mut header, FrameSection::Header)?;
    let [m0, m1, m2, m3, c0, c1, c2, c3, l0, l1] = header;
    check_magic(REQUEST_MAGIC, u32::from_be_bytes([m0, m1, m2, m3]))?;
    let call_id = u32::from_be_bytes([c0, c1, c2, c3]);
    let payload = read_payload(reader, u16::from_be_bytes([l0, l1]))?;
    Ok(CallRequest { call_id, payload })
}

/// Reads one response frame.
///
/// The magic and result tag are validated as soon as the header is complete,
/// before any payload byte is consumed.
pub fn read_response<R: Read + ?Sized>(reader: &mut R) -> Result<CallResponse, ProtocolError> {
    let mut header = [0_u8; RESPONSE_HEADER_LEN];
    fill(reader, &mut header, FrameSection::Header)?;
    let [m0, m1, m2, m3, tag, l0, l1] = header;
    check_magic(RESPONSE_MAGIC, u32::from_be_bytes([m0, m1, m2, m3]))?;
    let tag = ResultTag::try_from(tag)?;
    let payload = read_payload(reader, u16::from_be_bytes([l0, l1]))?;
    Ok(CallResponse { tag, payload })
}

fn payload_len(payload: &[u8]) -> Result<u16, ProtocolError> {
    u16::try_from(payload.len()).map_err(|_| ProtocolError::PayloadTooLarge { len: payload.len() })
}

const fn check_magic(expected: u32, found: u32) -> Result<(), ProtocolError> {
    if expected == found {
        Ok(())
    } else {
        Err(ProtocolError::BadMagic { expected, found })
    }
}

fn read_payload<R: Read + ?Sized>(reader: &mut R, len: u16) -> Result<Vec<u8>, ProtocolError> {
    let mut payload = vec![0_u8; usize::from(len)];
    fill(reader, &mut payload, FrameSection::Payload)?;
    Ok(payload)
}

fn fill<R: Read + ?Sized>(
    reader: &mut R,
    buffer: &mut [u8],
    section: FrameSection,
) -> Result<(), ProtocolError> {
    let expected = buffer.len();
    let mut received = 0_usize;
    while let Some(rest) = buffer.get_mut(received..).filter(|rest| !rest.is_empty()) {
        match reader.read(rest) {
            Ok(0) => {
                return Err(ProtocolError::PeerClosed {
                    section,
                    received,
                    expected,
                });
            }
            Ok(count) => received += count,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(source) if is_stall(&source) => {
                return Err(ProtocolError::Stalled {
                    section,
                    received,
                    expected,
                    source,
                });
            }
            Err(source) => return Err(ProtocolError::Io { section, source }),
        }
    }
    Ok(())
}

fn is_stall(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
