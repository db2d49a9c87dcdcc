//! victord-core: the data-structure layer behind the victord servers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 VectorIndex (flat | hnsw)                   │
//! │        insert / delete / search / export / import           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Snapshot files (db.index)                  │
//! │           mmap reads, temp-file + rename writes             │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        KvTable                              │
//! │      put / get / del, dump / load into db.table             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The servers treat these types as opaque collaborators: every operation
//! returns either a value or an error that maps onto the numeric result-code
//! taxonomy in [`error::Code`], which travels over the wire unchanged.

pub mod distance;
pub mod error;
pub mod flat;
pub mod hnsw;
pub mod index;
pub mod kv;
pub mod snapshot;

pub use distance::Method;
pub use error::{Code, IndexError, KvError};
pub use index::{IndexKind, VectorIndex};
pub use kv::KvTable;
