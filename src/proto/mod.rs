//! Message layer: CBOR payloads behind the frame header.
//!
//! Every payload is a CBOR definite-length array whose arity and element
//! types are fixed per opcode:
//!
//! | Opcode | Name          | Payload shape                     |
//! |-------:|---------------|-----------------------------------|
//! | 0x01   | INSERT        | `[id: u64, [f32; D]]`             |
//! | 0x02   | INSERT_RESULT | OP_RESULT                         |
//! | 0x03   | DELETE        | `[id: u64]`                       |
//! | 0x04   | DELETE_RESULT | OP_RESULT                         |
//! | 0x05   | SEARCH        | `[[f32; D], k: u32]`              |
//! | 0x06   | MATCH_RESULT  | `[[id: u64, distance: f32], ...]` |
//! | 0x07   | ERROR         | OP_RESULT                         |
//! | 0x08   | PUT           | `[key: bytes, value: bytes]`      |
//! | 0x09   | PUT_RESULT    | OP_RESULT                         |
//! | 0x0A   | GET           | `[key: bytes]`                    |
//! | 0x0B   | GET_RESULT    | `[value: bytes]`                  |
//! | 0x0C   | DEL           | `[key: bytes]`                    |
//! | 0x0D   | DEL_RESULT    | OP_RESULT                         |
//!
//! OP_RESULT = `[code: u32, message: text]`; code 0 is success, non-zero
//! codes come from [`victord_core::Code`].
//!
//! Floats are written as CBOR float32 and parsed from float32 or float64
//! (narrowed). Integers are written minimum-width and parsed at any width up
//! to 64 bits. Wrong arity, wrong element types, or trailing bytes are
//! protocol errors. Encoding rejects any payload whose serialization would
//! exceed the frame cap.

pub mod kv;
pub mod vector;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use victord_core::Code;

use crate::wire::{FrameBuf, FrameError, MSG_MAXLEN};

/// The 4-bit opcode namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    Insert = 0x01,
    InsertResult = 0x02,
    Delete = 0x03,
    DeleteResult = 0x04,
    Search = 0x05,
    MatchResult = 0x06,
    Error = 0x07,
    Put = 0x08,
    PutResult = 0x09,
    Get = 0x0A,
    GetResult = 0x0B,
    Del = 0x0C,
    DelResult = 0x0D,
}

impl MsgType {
    /// Map a raw header nibble back to an opcode.
    pub fn from_raw(raw: u8) -> Option<MsgType> {
        Some(match raw {
            0x01 => MsgType::Insert,
            0x02 => MsgType::InsertResult,
            0x03 => MsgType::Delete,
            0x04 => MsgType::DeleteResult,
            0x05 => MsgType::Search,
            0x06 => MsgType::MatchResult,
            0x07 => MsgType::Error,
            0x08 => MsgType::Put,
            0x09 => MsgType::PutResult,
            0x0A => MsgType::Get,
            0x0B => MsgType::GetResult,
            0x0C => MsgType::Del,
            0x0D => MsgType::DelResult,
            _ => return None,
        })
    }
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("malformed payload: {0}")]
    Cbor(#[from] serde_cbor::Error),

    #[error("serialized message would exceed maximum length: {0} bytes")]
    Oversize(usize),

    #[error("unexpected message type: {0:#04x}")]
    UnexpectedType(u8),
}

/// Encode `value` as the payload of a fresh frame of type `kind`.
pub(crate) fn encode<T: Serialize>(
    buf: &mut FrameBuf,
    kind: MsgType,
    value: &T,
) -> Result<(), ProtocolError> {
    let data = buf.reset(kind as u8);
    serde_cbor::to_writer(&mut *data, value)?;
    if data.len() > MSG_MAXLEN {
        return Err(ProtocolError::Oversize(data.len()));
    }
    Ok(())
}

/// Parse the current payload as `T`. Trailing bytes are rejected.
pub(crate) fn parse<T: DeserializeOwned>(buf: &FrameBuf) -> Result<T, ProtocolError> {
    Ok(serde_cbor::from_slice(buf.payload())?)
}

/// Write an OP_RESULT-shaped response under the given opcode
/// (INSERT_RESULT, DELETE_RESULT, PUT_RESULT, DEL_RESULT or ERROR).
pub fn write_op_result(
    buf: &mut FrameBuf,
    kind: MsgType,
    code: Code,
    message: &str,
) -> Result<(), ProtocolError> {
    encode(buf, kind, &(code.as_u32(), message))
}

/// Parse an OP_RESULT payload into (code, message).
pub fn read_op_result(buf: &FrameBuf) -> Result<(u32, String), ProtocolError> {
    parse(buf)
}
