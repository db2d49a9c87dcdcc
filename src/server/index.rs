//! Index server state machine: INSERT, SEARCH, DELETE.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};
use victord_core::{Code, VectorIndex};

use super::{Dispatch, Outcome};
use crate::proto::{self, vector, MsgType};
use crate::wal::{Wal, WalError, WalReader};
use crate::wire::FrameBuf;

/// Upper bound on requested result counts; larger `k` values are clamped.
pub const MAX_SEARCH_K: u32 = 4096;

/// The vector-index server: one index, two mutation counters, one snapshot
/// path. Mutations hit the WAL after they apply; SEARCH touches neither the
/// WAL nor the counters.
pub struct IndexServer {
    index: VectorIndex,
    snapshot_path: PathBuf,
    export_threshold: u64,
    op_add_counter: u64,
    op_del_counter: u64,
}

impl IndexServer {
    pub fn new(index: VectorIndex, snapshot_path: PathBuf, export_threshold: u64) -> Self {
        Self {
            index,
            snapshot_path,
            export_threshold,
            op_add_counter: 0,
            op_del_counter: 0,
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Mutations applied since the last successful checkpoint.
    pub fn pending_ops(&self) -> u64 {
        self.op_add_counter + self.op_del_counter
    }

    /// Replay a WAL file through the live handlers (no WAL handle, so the
    /// replay is not re-logged). Foreign opcodes are skipped with a warning;
    /// a damaged log aborts the replay.
    pub fn load_wal(&mut self, path: &Path) -> Result<(), WalError> {
        let mut reader = WalReader::open(path)?;
        let mut buf = FrameBuf::new();
        let mut loaded = 0u64;
        let mut failed = 0u64;

        while reader.next_into(&mut buf)? {
            match MsgType::from_raw(buf.kind) {
                Some(MsgType::Insert) | Some(MsgType::Delete) => {
                    match self.dispatch(&mut buf, None) {
                        Outcome::Respond if buf.kind != MsgType::Error as u8 => loaded += 1,
                        _ => failed += 1,
                    }
                }
                _ => warn!("unknown message type in WAL: {}", buf.kind),
            }
        }

        info!(
            "WAL import completed: {} entries loaded successfully, {} with errors",
            loaded, failed
        );
        Ok(())
    }

    fn handle_insert(&mut self, buf: &mut FrameBuf, wal: Option<&mut Wal>) -> Outcome {
        let (id, vec) = match vector::read_insert(buf) {
            Ok(request) => request,
            Err(err) => {
                error!("failed to parse INSERT message: {err}");
                return Outcome::Close;
            }
        };

        if vec.len() != self.index.dims() {
            let message = format!(
                "invalid dimensions: expected {}, got {}",
                self.index.dims(),
                vec.len()
            );
            warn!("at vector insert - {message}");
            return respond(buf, MsgType::Error, Code::InvalidDimensions, &message);
        }

        match self.index.insert(id, vec) {
            Ok(()) => {
                if let Some(wal) = wal {
                    if let Err(err) = wal.append(buf) {
                        warn!("writing wal - message: {err}");
                    }
                }
                self.op_add_counter += 1;
                respond(buf, MsgType::InsertResult, Code::Success, "")
            }
            Err(err) => {
                warn!("at vector insert - code: {} - message: {err}", err.code().as_u32());
                let message = err.to_string();
                respond(buf, MsgType::InsertResult, err.code(), &message)
            }
        }
    }

    fn handle_delete(&mut self, buf: &mut FrameBuf, wal: Option<&mut Wal>) -> Outcome {
        let id = match vector::read_delete(buf) {
            Ok(id) => id,
            Err(err) => {
                error!("failed to parse DELETE message: {err}");
                return Outcome::Close;
            }
        };

        match self.index.delete(id) {
            Ok(()) => {
                if let Some(wal) = wal {
                    if let Err(err) = wal.append(buf) {
                        warn!("writing wal - message: {err}");
                    }
                }
                self.op_del_counter += 1;
                respond(buf, MsgType::DeleteResult, Code::Success, "")
            }
            Err(err) => {
                warn!("unable to delete id from index: {err}");
                let message = err.to_string();
                respond(buf, MsgType::DeleteResult, err.code(), &message)
            }
        }
    }

    fn handle_search(&mut self, buf: &mut FrameBuf) -> Outcome {
        let (vec, k) = match vector::read_search(buf) {
            Ok(request) => request,
            Err(err) => {
                error!("failed to parse SEARCH message: {err}");
                return Outcome::Close;
            }
        };

        if vec.len() != self.index.dims() {
            let message = format!(
                "invalid dimensions: expected {}, got {}",
                self.index.dims(),
                vec.len()
            );
            warn!("at vector search - {message}");
            return respond(buf, MsgType::Error, Code::InvalidDimensions, &message);
        }

        let k = k.min(MAX_SEARCH_K);
        match self.index.search(&vec, k as usize) {
            Ok(matches) => match vector::write_match_result(buf, &matches) {
                Ok(()) => Outcome::Respond,
                Err(err) => {
                    error!("failed to encode MATCH_RESULT: {err}");
                    Outcome::Close
                }
            },
            Err(err) => {
                error!("at vector search - code: {} - message: {err}", err.code().as_u32());
                let message = err.to_string();
                respond(buf, MsgType::Error, err.code(), &message)
            }
        }
    }
}

impl Dispatch for IndexServer {
    fn dispatch(&mut self, buf: &mut FrameBuf, wal: Option<&mut Wal>) -> Outcome {
        match MsgType::from_raw(buf.kind) {
            Some(MsgType::Insert) => self.handle_insert(buf, wal),
            Some(MsgType::Delete) => self.handle_delete(buf, wal),
            Some(MsgType::Search) => self.handle_search(buf),
            _ => {
                warn!("invalid protocol message type: {}", buf.kind);
                Outcome::Close
            }
        }
    }

    fn maybe_checkpoint(&mut self, wal: &mut Wal) {
        if self.pending_ops() <= self.export_threshold {
            return;
        }
        info!(
            "exporting index to disk (operations: {})",
            self.pending_ops()
        );
        if let Err(err) = self.index.export(&self.snapshot_path) {
            warn!("error during index export: {err}");
            return;
        }
        match wal.reset() {
            Ok(()) => {
                info!("index exported successfully, WAL file cleared");
                self.op_add_counter = 0;
                self.op_del_counter = 0;
            }
            Err(err) => warn!("failed to clear WAL after export: {err}"),
        }
    }
}

/// Encode an OP_RESULT-shaped response; an encode failure closes the channel.
fn respond(buf: &mut FrameBuf, kind: MsgType, code: Code, message: &str) -> Outcome {
    match proto::write_op_result(buf, kind, code, message) {
        Ok(()) => Outcome::Respond,
        Err(err) => {
            error!("failed to encode response: {err}");
            Outcome::Close
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{kv, read_op_result};
    use tempfile::tempdir;
    use victord_core::{IndexKind, Method};

    fn test_server(dir: &Path) -> IndexServer {
        let index = VectorIndex::new(IndexKind::Flat, Method::Cosine, 4).unwrap();
        IndexServer::new(index, dir.join("db.index"), 10)
    }

    fn insert(server: &mut IndexServer, buf: &mut FrameBuf, wal: Option<&mut Wal>, id: u64) {
        vector::write_insert(buf, id, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(server.dispatch(buf, wal), Outcome::Respond);
        let (code, _) = read_op_result(buf).unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn test_insert_search_delete_flow() {
        let dir = tempdir().unwrap();
        let mut server = test_server(dir.path());
        let mut buf = FrameBuf::new();

        insert(&mut server, &mut buf, None, 42);

        vector::write_search(&mut buf, &[1.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(server.dispatch(&mut buf, None), Outcome::Respond);
        assert_eq!(buf.kind, MsgType::MatchResult as u8);
        let matches = vector::read_match_result(&buf).unwrap();
        assert_eq!(matches, vec![(42, 0.0)]);

        vector::write_delete(&mut buf, 42).unwrap();
        assert_eq!(server.dispatch(&mut buf, None), Outcome::Respond);
        let (code, _) = read_op_result(&buf).unwrap();
        assert_eq!(code, 0);

        vector::write_search(&mut buf, &[1.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(server.dispatch(&mut buf, None), Outcome::Respond);
        assert!(vector::read_match_result(&buf).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_is_error_not_close() {
        let dir = tempdir().unwrap();
        let mut server = test_server(dir.path());
        let mut buf = FrameBuf::new();

        vector::write_insert(&mut buf, 1, &[1.0, 0.0, 0.0]).unwrap();
        assert_eq!(server.dispatch(&mut buf, None), Outcome::Respond);
        assert_eq!(buf.kind, MsgType::Error as u8);
        let (code, _) = read_op_result(&buf).unwrap();
        assert_eq!(code, Code::InvalidDimensions.as_u32());

        vector::write_search(&mut buf, &[1.0, 0.0], 1).unwrap();
        assert_eq!(server.dispatch(&mut buf, None), Outcome::Respond);
        assert_eq!(buf.kind, MsgType::Error as u8);
    }

    #[test]
    fn test_duplicate_insert_reports_collaborator_code() {
        let dir = tempdir().unwrap();
        let mut server = test_server(dir.path());
        let mut buf = FrameBuf::new();

        insert(&mut server, &mut buf, None, 1);

        vector::write_insert(&mut buf, 1, &[0.0, 1.0, 0.0, 0.0]).unwrap();
        assert_eq!(server.dispatch(&mut buf, None), Outcome::Respond);
        assert_eq!(buf.kind, MsgType::InsertResult as u8);
        let (code, message) = read_op_result(&buf).unwrap();
        assert_eq!(code, Code::Duplicated.as_u32());
        assert!(!message.is_empty());
    }

    #[test]
    fn test_foreign_opcode_closes_connection() {
        let dir = tempdir().unwrap();
        let mut server = test_server(dir.path());
        let mut buf = FrameBuf::new();

        kv::write_put(&mut buf, b"k", b"v").unwrap();
        assert_eq!(server.dispatch(&mut buf, None), Outcome::Close);
    }

    #[test]
    fn test_malformed_payload_closes_connection() {
        let dir = tempdir().unwrap();
        let mut server = test_server(dir.path());
        let mut buf = FrameBuf::new();

        buf.reset(MsgType::Insert as u8).extend_from_slice(&[0xFF, 0x00]);
        assert_eq!(server.dispatch(&mut buf, None), Outcome::Close);
    }

    #[test]
    fn test_mutations_append_to_wal_and_count() {
        let dir = tempdir().unwrap();
        let mut server = test_server(dir.path());
        let mut wal = Wal::open(dir.path().join("db.iwal"));
        let mut buf = FrameBuf::new();

        insert(&mut server, &mut buf, Some(&mut wal), 1);
        insert(&mut server, &mut buf, Some(&mut wal), 2);

        vector::write_delete(&mut buf, 1).unwrap();
        assert_eq!(server.dispatch(&mut buf, Some(&mut wal)), Outcome::Respond);

        assert_eq!(server.pending_ops(), 3);

        let mut reader = WalReader::open(&dir.path().join("db.iwal")).unwrap();
        let mut frame = FrameBuf::new();
        let mut kinds = Vec::new();
        while reader.next_into(&mut frame).unwrap() {
            kinds.push(frame.kind);
        }
        assert_eq!(
            kinds,
            vec![
                MsgType::Insert as u8,
                MsgType::Insert as u8,
                MsgType::Delete as u8
            ]
        );
    }

    #[test]
    fn test_search_never_touches_wal_or_counters() {
        let dir = tempdir().unwrap();
        let mut server = test_server(dir.path());
        let wal_path = dir.path().join("db.iwal");
        let mut wal = Wal::open(&wal_path);
        let mut buf = FrameBuf::new();

        vector::write_search(&mut buf, &[1.0, 0.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(server.dispatch(&mut buf, Some(&mut wal)), Outcome::Respond);

        assert_eq!(server.pending_ops(), 0);
        assert!(!wal_path.exists());
    }

    #[test]
    fn test_failed_mutation_never_appends() {
        let dir = tempdir().unwrap();
        let mut server = test_server(dir.path());
        let wal_path = dir.path().join("db.iwal");
        let mut wal = Wal::open(&wal_path);
        let mut buf = FrameBuf::new();

        // Missing id: a logical error, no WAL entry.
        vector::write_delete(&mut buf, 404).unwrap();
        assert_eq!(server.dispatch(&mut buf, Some(&mut wal)), Outcome::Respond);
        let (code, _) = read_op_result(&buf).unwrap();
        assert_eq!(code, Code::NotFound.as_u32());
        assert!(!wal_path.exists());
    }

    #[test]
    fn test_checkpoint_clears_wal_and_counters() {
        let dir = tempdir().unwrap();
        let index = VectorIndex::new(IndexKind::Flat, Method::Cosine, 4).unwrap();
        let mut server = IndexServer::new(index, dir.path().join("db.index"), 3);
        let wal_path = dir.path().join("db.iwal");
        let mut wal = Wal::open(&wal_path);
        let mut buf = FrameBuf::new();

        for id in 0..4 {
            insert(&mut server, &mut buf, Some(&mut wal), id);
        }
        assert!(wal_path.exists());

        server.maybe_checkpoint(&mut wal);
        assert!(dir.path().join("db.index").exists());
        assert!(!wal_path.exists());
        assert_eq!(server.pending_ops(), 0);
    }

    #[test]
    fn test_checkpoint_below_threshold_is_noop() {
        let dir = tempdir().unwrap();
        let mut server = test_server(dir.path());
        let mut wal = Wal::open(dir.path().join("db.iwal"));
        let mut buf = FrameBuf::new();

        insert(&mut server, &mut buf, Some(&mut wal), 1);
        server.maybe_checkpoint(&mut wal);

        assert!(!dir.path().join("db.index").exists());
        assert_eq!(server.pending_ops(), 1);
    }

    #[test]
    fn test_wal_replay_restores_state() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("db.iwal");

        {
            let mut server = test_server(dir.path());
            let mut wal = Wal::open(&wal_path);
            let mut buf = FrameBuf::new();
            for id in 0..5 {
                insert(&mut server, &mut buf, Some(&mut wal), id);
            }
            vector::write_delete(&mut buf, 3).unwrap();
            server.dispatch(&mut buf, Some(&mut wal));
        }

        // Fresh server, same WAL: state comes back, replay is not re-logged.
        let mut restored = test_server(dir.path());
        restored.load_wal(&wal_path).unwrap();
        assert_eq!(restored.index().len(), 4);
        assert!(restored.index().search(&[1.0, 0.0, 0.0, 0.0], 10).unwrap()
            .iter()
            .all(|(id, _)| *id != 3));

        // Replay counters do not trigger checkpoints retroactively.
        let wal_len = std::fs::metadata(&wal_path).unwrap().len();
        assert!(wal_len > 0);
    }

    #[test]
    fn test_wal_replay_skips_foreign_opcodes() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("db.iwal");

        let mut wal = Wal::open(&wal_path);
        let mut buf = FrameBuf::new();
        vector::write_insert(&mut buf, 1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        wal.append(&buf).unwrap();
        kv::write_put(&mut buf, b"stray", b"entry").unwrap();
        wal.append(&buf).unwrap();
        vector::write_insert(&mut buf, 2, &[0.0, 1.0, 0.0, 0.0]).unwrap();
        wal.append(&buf).unwrap();

        let mut server = test_server(dir.path());
        server.load_wal(&wal_path).unwrap();
        assert_eq!(server.index().len(), 2);
    }
}
