//! Write-ahead log: raw applied request frames, replayed at startup.
//!
//! The WAL is a bare concatenation of frames (4-byte header + payload),
//! byte-identical to what arrived on the wire and was successfully applied.
//! No envelope, no checksums, no sequence numbers — the opcode in each frame
//! header decides how the entry replays, through the same handlers that serve
//! live traffic.
//!
//! Lifecycle: the file is created lazily on the first mutation after a
//! checkpoint and removed once a checkpoint succeeds. Appends flush to the OS
//! on every entry; fsync is left to deployment policy. An append failure is a
//! warning, never fatal — the mutation is already applied in memory.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::wire::{FrameBuf, FrameError};

#[derive(Error, Debug)]
pub enum WalError {
    #[error("write-ahead log damaged: {0}")]
    Damaged(FrameError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Append handle for a server's WAL file.
pub struct Wal {
    path: PathBuf,
    file: Option<File>,
}

impl Wal {
    /// Create a handle; no file is touched until the first append.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the raw frame currently held in `buf`.
    pub fn append(&mut self, buf: &FrameBuf) -> Result<(), WalError> {
        let file = match &mut self.file {
            Some(file) => file,
            slot => slot.insert(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?,
            ),
        };
        match buf.send(file) {
            Ok(()) => Ok(()),
            Err(FrameError::Io(err)) => Err(WalError::Io(err)),
            Err(err) => Err(WalError::Damaged(err)),
        }
    }

    /// Drop the log after a successful checkpoint. The next append recreates
    /// the file from scratch.
    pub fn reset(&mut self) -> Result<(), WalError> {
        self.file = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(WalError::Io(err)),
        }
    }
}

/// Sequential reader over a WAL file, one frame at a time.
pub struct WalReader {
    reader: BufReader<File>,
}

impl WalReader {
    pub fn open(path: &Path) -> Result<Self, WalError> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
        })
    }

    /// Read the next frame into `buf`.
    ///
    /// `Ok(true)` when a frame was read, `Ok(false)` on clean EOF at a frame
    /// boundary, `Err` when the log is short or malformed at that point.
    pub fn next_into(&mut self, buf: &mut FrameBuf) -> Result<bool, WalError> {
        buf.load(&mut self.reader).map_err(|err| match err {
            FrameError::Io(io_err) if io_err.kind() != io::ErrorKind::UnexpectedEof => {
                WalError::Io(io_err)
            }
            other => WalError::Damaged(other),
        })
    }
}
