//! victord: a pair of cooperating single-node database servers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │             Unix stream socket, framed binary               │
//! │        4-byte header (type + len) + CBOR payload            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │           Readiness loop (mio, single-threaded)             │
//! │      128 connection slots, one shared frame buffer          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │     IndexServer (INSERT/SEARCH/DELETE)  ·  TableServer      │
//! │               (PUT/GET/DEL)  over victord-core              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │   WAL (raw applied frames) + threshold-triggered snapshot   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two executables share this machinery: `victord-index` serves approximate
//! nearest-neighbor search over fixed-dimension f32 vectors keyed by u64 ids,
//! `victord-table` serves a binary-safe key-value store. Durability comes
//! from replaying the WAL at startup and truncating it whenever a snapshot
//! checkpoint succeeds.

pub mod client;
pub mod config;
pub mod proto;
pub mod server;
pub mod shutdown;
pub mod wal;
pub mod wire;

pub use client::{IndexClient, TableClient};
pub use server::{serve, IndexServer, TableServer, MAX_CONNECTIONS};
pub use shutdown::Shutdown;
pub use wal::Wal;
pub use wire::{FrameBuf, MSG_MAXLEN};
