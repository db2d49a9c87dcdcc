//! Result codes and error types shared by the collaborators.
//!
//! Every fallible operation maps onto a small numeric taxonomy that the
//! servers copy verbatim into their wire-level OP_RESULT responses:
//!
//! | Code | Meaning                                    |
//! |-----:|--------------------------------------------|
//! | 0    | Success                                    |
//! | 1    | Invalid vector dimensions                  |
//! | 2    | Duplicated id on insert                    |
//! | 3    | Id not found                               |
//! | 4    | Key not found                              |
//! | 5    | Invalid argument                           |
//! | 6    | Protocol violation                         |
//! | 7    | System failure (I/O, corrupt snapshot)     |

use thiserror::Error;

use crate::snapshot::SnapshotError;

/// Numeric result code carried in OP_RESULT responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Code {
    Success = 0,
    InvalidDimensions = 1,
    Duplicated = 2,
    NotFound = 3,
    KeyNotFound = 4,
    InvalidArgument = 5,
    Protocol = 6,
    System = 7,
}

impl Code {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Errors reported by the vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid dimensions: expected {expected}, got {got}")]
    InvalidDimensions { expected: usize, got: usize },

    #[error("duplicated id: {0}")]
    Duplicated(u64),

    #[error("id not found: {0}")]
    NotFound(u64),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    /// The numeric class this error belongs to.
    pub fn code(&self) -> Code {
        match self {
            IndexError::InvalidDimensions { .. } => Code::InvalidDimensions,
            IndexError::Duplicated(_) => Code::Duplicated,
            IndexError::NotFound(_) => Code::NotFound,
            IndexError::InvalidArgument(_) => Code::InvalidArgument,
            IndexError::Snapshot(_) | IndexError::Io(_) => Code::System,
        }
    }
}

/// Errors reported by the key-value table.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("key not found")]
    KeyNotFound,

    #[error("invalid magic bytes in table snapshot")]
    InvalidMagic,

    #[error("table snapshot truncated")]
    Truncated,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl KvError {
    pub fn code(&self) -> Code {
        match self {
            KvError::KeyNotFound => Code::KeyNotFound,
            KvError::InvalidMagic | KvError::Truncated | KvError::Io(_) => Code::System,
        }
    }
}
