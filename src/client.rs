//! Blocking clients for both servers.
//!
//! Each client owns one unix-stream connection and one frame buffer, sends a
//! request, then blocks for the single response frame. Mutation calls return
//! the server's [`OpReply`] (code 0 on success) whether it arrived as a
//! typed `*_RESULT` or as an ERROR frame, so callers can observe logical
//! failures without losing the connection.

use std::io;
use std::os::unix::net::UnixStream;
use std::path::Path;

use thiserror::Error;

use crate::proto::{self, kv, vector, MsgType};
use crate::wire::FrameBuf;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] proto::ProtocolError),

    #[error("unexpected response type: {0:#04x}")]
    UnexpectedResponse(u8),

    #[error("server error {code}: {message}")]
    Server { code: u32, message: String },
}

/// An OP_RESULT response, as delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpReply {
    /// Response opcode (a `*_RESULT` kind, or ERROR).
    pub kind: MsgType,
    /// 0 on success; otherwise a `victord_core::Code` value.
    pub code: u32,
    pub message: String,
}

impl OpReply {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

fn round_trip(stream: &mut UnixStream, buf: &mut FrameBuf) -> Result<(), ClientError> {
    buf.send(stream).map_err(proto::ProtocolError::Frame)?;
    buf.recv(stream).map_err(proto::ProtocolError::Frame)?;
    Ok(())
}

fn read_reply(buf: &FrameBuf, expected: MsgType) -> Result<OpReply, ClientError> {
    let kind = match MsgType::from_raw(buf.kind) {
        Some(kind) if kind == expected || kind == MsgType::Error => kind,
        _ => return Err(ClientError::UnexpectedResponse(buf.kind)),
    };
    let (code, message) = proto::read_op_result(buf)?;
    Ok(OpReply {
        kind,
        code,
        message,
    })
}

/// Client for the vector index server.
pub struct IndexClient {
    stream: UnixStream,
    buf: FrameBuf,
}

impl IndexClient {
    pub fn connect(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            stream: UnixStream::connect(path)?,
            buf: FrameBuf::new(),
        })
    }

    /// INSERT a vector; the reply carries the server's result code.
    pub fn insert(&mut self, id: u64, embedding: &[f32]) -> Result<OpReply, ClientError> {
        vector::write_insert(&mut self.buf, id, embedding)?;
        round_trip(&mut self.stream, &mut self.buf)?;
        read_reply(&self.buf, MsgType::InsertResult)
    }

    /// DELETE a vector by id.
    pub fn delete(&mut self, id: u64) -> Result<OpReply, ClientError> {
        vector::write_delete(&mut self.buf, id)?;
        round_trip(&mut self.stream, &mut self.buf)?;
        read_reply(&self.buf, MsgType::DeleteResult)
    }

    /// SEARCH for the k nearest neighbors, ascending by distance.
    pub fn search(&mut self, query: &[f32], k: u32) -> Result<Vec<(u64, f32)>, ClientError> {
        vector::write_search(&mut self.buf, query, k)?;
        round_trip(&mut self.stream, &mut self.buf)?;
        match MsgType::from_raw(self.buf.kind) {
            Some(MsgType::MatchResult) => Ok(vector::read_match_result(&self.buf)?),
            Some(MsgType::Error) => {
                let (code, message) = proto::read_op_result(&self.buf)?;
                Err(ClientError::Server { code, message })
            }
            _ => Err(ClientError::UnexpectedResponse(self.buf.kind)),
        }
    }

    /// Send a raw frame of the given type and payload, then try to read a
    /// response. Exists for protocol-violation tests and tooling.
    pub fn send_raw(&mut self, kind: u8, payload: &[u8]) -> Result<(), ClientError> {
        self.buf.reset(kind).extend_from_slice(payload);
        round_trip(&mut self.stream, &mut self.buf)?;
        Ok(())
    }
}

/// Client for the key-value table server.
pub struct TableClient {
    stream: UnixStream,
    buf: FrameBuf,
}

impl TableClient {
    pub fn connect(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            stream: UnixStream::connect(path)?,
            buf: FrameBuf::new(),
        })
    }

    /// PUT a key-value pair.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<OpReply, ClientError> {
        kv::write_put(&mut self.buf, key, value)?;
        round_trip(&mut self.stream, &mut self.buf)?;
        read_reply(&self.buf, MsgType::PutResult)
    }

    /// GET a value. A missing key surfaces as `ClientError::Server` with the
    /// KeyNotFound code.
    pub fn get(&mut self, key: &[u8]) -> Result<Vec<u8>, ClientError> {
        kv::write_get(&mut self.buf, key)?;
        round_trip(&mut self.stream, &mut self.buf)?;
        match MsgType::from_raw(self.buf.kind) {
            Some(MsgType::GetResult) => Ok(kv::read_get_result(&self.buf)?),
            Some(MsgType::Error) => {
                let (code, message) = proto::read_op_result(&self.buf)?;
                Err(ClientError::Server { code, message })
            }
            _ => Err(ClientError::UnexpectedResponse(self.buf.kind)),
        }
    }

    /// DEL a key; a miss comes back as a DEL_RESULT with a non-zero code.
    pub fn del(&mut self, key: &[u8]) -> Result<OpReply, ClientError> {
        kv::write_del(&mut self.buf, key)?;
        round_trip(&mut self.stream, &mut self.buf)?;
        read_reply(&self.buf, MsgType::DelResult)
    }
}
