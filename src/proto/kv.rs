//! Key-value protocol messages: PUT, GET, DEL, GET_RESULT.
//!
//! Keys and values are CBOR definite-length byte strings (never text), so any
//! byte sequence round-trips, including empty values.

use serde_bytes::{ByteBuf, Bytes};

use super::{encode, parse, MsgType, ProtocolError};
use crate::wire::FrameBuf;

/// Serialize a PUT request: `[key, value]`.
pub fn write_put(buf: &mut FrameBuf, key: &[u8], value: &[u8]) -> Result<(), ProtocolError> {
    encode(buf, MsgType::Put, &(Bytes::new(key), Bytes::new(value)))
}

/// Parse a PUT request into (key, value).
pub fn read_put(buf: &FrameBuf) -> Result<(Vec<u8>, Vec<u8>), ProtocolError> {
    let (key, value): (ByteBuf, ByteBuf) = parse(buf)?;
    Ok((key.into_vec(), value.into_vec()))
}

/// Serialize a GET request: `[key]`.
pub fn write_get(buf: &mut FrameBuf, key: &[u8]) -> Result<(), ProtocolError> {
    encode(buf, MsgType::Get, &(Bytes::new(key),))
}

/// Parse a GET request.
pub fn read_get(buf: &FrameBuf) -> Result<Vec<u8>, ProtocolError> {
    let (key,): (ByteBuf,) = parse(buf)?;
    Ok(key.into_vec())
}

/// Serialize a DEL request: `[key]`.
pub fn write_del(buf: &mut FrameBuf, key: &[u8]) -> Result<(), ProtocolError> {
    encode(buf, MsgType::Del, &(Bytes::new(key),))
}

/// Parse a DEL request.
pub fn read_del(buf: &FrameBuf) -> Result<Vec<u8>, ProtocolError> {
    let (key,): (ByteBuf,) = parse(buf)?;
    Ok(key.into_vec())
}

/// Serialize a GET_RESULT response: `[value]`.
pub fn write_get_result(buf: &mut FrameBuf, value: &[u8]) -> Result<(), ProtocolError> {
    encode(buf, MsgType::GetResult, &(Bytes::new(value),))
}

/// Parse a GET_RESULT response.
pub fn read_get_result(buf: &FrameBuf) -> Result<Vec<u8>, ProtocolError> {
    let (value,): (ByteBuf,) = parse(buf)?;
    Ok(value.into_vec())
}
