//! Frame layer: the 4-byte header and the shared message buffer.
//!
//! # Wire Layout
//!
//! ```text
//! Bit      31..28          27..0
//! ─────────────────────────────────────────────
//!          type (4 bits)   len (28 bits)
//! ```
//!
//! The packed word travels in network byte order, followed by exactly `len`
//! payload bytes. `len` is capped at [`MSG_MAXLEN`] = 2^28 − 1 on both the
//! encode and decode paths; the framing is agnostic to the payload format,
//! the type nibble names the semantic decoder to invoke.
//!
//! [`FrameBuf`] is the single buffer a server loop owns: every request is
//! received into it, every response is encoded over it, and the WAL appends
//! its raw bytes. Reuse is safe because dispatch is strictly serial. The
//! buffer grows on demand up to the frame cap instead of reserving the
//! 256 MiB maximum up front.

use std::io::{self, Read, Write};

use thiserror::Error;

/// Maximum payload length representable in the 28-bit length field.
pub const MSG_MAXLEN: usize = 0x0FFF_FFFF;

/// Header size on the wire.
pub const HDR_LEN: usize = 4;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("message type out of range: {0:#x}")]
    TypeOutOfRange(u8),

    #[error("frame length {0} exceeds maximum {MSG_MAXLEN}")]
    Oversize(usize),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Pack a (type, len) pair into the 4 header bytes.
pub fn encode_header(kind: u8, len: usize) -> Result<[u8; HDR_LEN], FrameError> {
    if kind > 0xF {
        return Err(FrameError::TypeOutOfRange(kind));
    }
    if len > MSG_MAXLEN {
        return Err(FrameError::Oversize(len));
    }
    let raw = ((kind as u32) << 28) | (len as u32 & 0x0FFF_FFFF);
    Ok(raw.to_be_bytes())
}

/// Unpack the 4 header bytes into a (type, len) pair.
pub fn decode_header(bytes: [u8; HDR_LEN]) -> (u8, usize) {
    let raw = u32::from_be_bytes(bytes);
    let kind = (raw >> 28) as u8;
    let len = (raw & 0x0FFF_FFFF) as usize;
    (kind, len)
}

/// The reusable request/response buffer: one per server loop.
pub struct FrameBuf {
    /// Raw 4-bit message type of the current frame.
    pub kind: u8,
    data: Vec<u8>,
}

impl Default for FrameBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuf {
    pub fn new() -> Self {
        Self {
            kind: 0,
            data: Vec::new(),
        }
    }

    /// Payload bytes of the current frame.
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// Start a fresh frame of the given type; returns the payload sink.
    /// Capacity is retained across frames.
    pub fn reset(&mut self, kind: u8) -> &mut Vec<u8> {
        self.kind = kind;
        self.data.clear();
        &mut self.data
    }

    /// Receive exactly one frame. Short reads, EOF and broken pipes all
    /// surface as I/O errors; the caller closes the connection.
    pub fn recv<R: Read>(&mut self, reader: &mut R) -> Result<(), FrameError> {
        let mut header = [0u8; HDR_LEN];
        reader.read_exact(&mut header)?;
        let (kind, len) = decode_header(header);

        self.kind = kind;
        self.data.resize(len, 0);
        reader.read_exact(&mut self.data)?;
        Ok(())
    }

    /// Send the current frame: header then payload.
    pub fn send<W: Write>(&self, writer: &mut W) -> Result<(), FrameError> {
        let header = encode_header(self.kind, self.data.len())?;
        writer.write_all(&header)?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    /// Read one frame from a WAL-style stream.
    ///
    /// Returns `Ok(false)` on clean EOF (zero bytes at a frame boundary);
    /// a partial header or payload is an error, the log is damaged there.
    pub fn load<R: Read>(&mut self, reader: &mut R) -> Result<bool, FrameError> {
        let mut header = [0u8; HDR_LEN];
        let mut filled = 0;
        while filled < HDR_LEN {
            let n = reader.read(&mut header[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(FrameError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "partial frame header",
                )));
            }
            filled += n;
        }

        let (kind, len) = decode_header(header);
        self.kind = kind;
        self.data.resize(len, 0);
        reader.read_exact(&mut self.data)?;
        Ok(true)
    }
}
