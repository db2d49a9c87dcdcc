//! Table server state machine: PUT, GET, DEL.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};
use victord_core::{Code, KvTable};

use super::{Dispatch, Outcome};
use crate::proto::{self, kv, MsgType};
use crate::wal::{Wal, WalError, WalReader};
use crate::wire::FrameBuf;

/// The key-value server: one table, two mutation counters, one snapshot
/// path. PUT and DEL hit the WAL after they apply; GET never does.
pub struct TableServer {
    table: KvTable,
    snapshot_path: PathBuf,
    export_threshold: u64,
    op_add_counter: u64,
    op_del_counter: u64,
}

impl TableServer {
    pub fn new(table: KvTable, snapshot_path: PathBuf, export_threshold: u64) -> Self {
        Self {
            table,
            snapshot_path,
            export_threshold,
            op_add_counter: 0,
            op_del_counter: 0,
        }
    }

    pub fn table(&self) -> &KvTable {
        &self.table
    }

    /// Mutations applied since the last successful checkpoint.
    pub fn pending_ops(&self) -> u64 {
        self.op_add_counter + self.op_del_counter
    }

    /// Replay a WAL file through the live handlers. Foreign opcodes are
    /// skipped with a warning; a damaged log aborts the replay.
    pub fn load_wal(&mut self, path: &Path) -> Result<(), WalError> {
        let mut reader = WalReader::open(path)?;
        let mut buf = FrameBuf::new();
        let mut loaded = 0u64;
        let mut failed = 0u64;

        while reader.next_into(&mut buf)? {
            match MsgType::from_raw(buf.kind) {
                Some(MsgType::Put) | Some(MsgType::Del) => {
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

    fn handle_put(&mut self, buf: &mut FrameBuf, wal: Option<&mut Wal>) -> Outcome {
        let (key, value) = match kv::read_put(buf) {
            Ok(request) => request,
            Err(err) => {
                error!("failed to parse PUT message: {err}");
                return Outcome::Close;
            }
        };

        match self.table.put(&key, &value) {
            Ok(()) => {
                if let Some(wal) = wal {
                    if let Err(err) = wal.append(buf) {
                        warn!("writing wal - message: {err}");
                    }
                }
                self.op_add_counter += 1;
                respond(buf, MsgType::PutResult, Code::Success, "")
            }
            Err(err) => {
                error!(
                    "system error during key-value insert - code: {} - message: {err}",
                    err.code().as_u32()
                );
                let message = err.to_string();
                respond(buf, MsgType::PutResult, err.code(), &message)
            }
        }
    }

    fn handle_get(&mut self, buf: &mut FrameBuf) -> Outcome {
        let key = match kv::read_get(buf) {
            Ok(key) => key,
            Err(err) => {
                error!("failed to parse GET message: {err}");
                return Outcome::Close;
            }
        };

        match self.table.get(&key) {
            Some(value) => {
                let value = value.to_vec();
                match kv::write_get_result(buf, &value) {
                    Ok(()) => Outcome::Respond,
                    Err(err) => {
                        error!("failed to encode GET_RESULT: {err}");
                        Outcome::Close
                    }
                }
            }
            None => respond(buf, MsgType::Error, Code::KeyNotFound, "key not found"),
        }
    }

    fn handle_del(&mut self, buf: &mut FrameBuf, wal: Option<&mut Wal>) -> Outcome {
        let key = match kv::read_del(buf) {
            Ok(key) => key,
            Err(err) => {
                error!("failed to parse DELETE message: {err}");
                return Outcome::Close;
            }
        };

        match self.table.del(&key) {
            Ok(()) => {
                if let Some(wal) = wal {
                    if let Err(err) = wal.append(buf) {
                        warn!("writing wal - message: {err}");
                    }
                }
                self.op_del_counter += 1;
                respond(buf, MsgType::DelResult, Code::Success, "")
            }
            Err(err) => {
                warn!("unable to delete key from table: {err}");
                let message = err.to_string();
                respond(buf, MsgType::DelResult, err.code(), &message)
            }
        }
    }
}

impl Dispatch for TableServer {
    fn dispatch(&mut self, buf: &mut FrameBuf, wal: Option<&mut Wal>) -> Outcome {
        match MsgType::from_raw(buf.kind) {
            Some(MsgType::Put) => self.handle_put(buf, wal),
            Some(MsgType::Get) => self.handle_get(buf),
            Some(MsgType::Del) => self.handle_del(buf, wal),
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
            "exporting table to disk (operations: {})",
            self.pending_ops()
        );
        if let Err(err) = self.table.dump(&self.snapshot_path) {
            warn!("error during table export: {err}");
            return;
        }
        match wal.reset() {
            Ok(()) => {
                info!("table exported successfully, WAL file cleared");
                self.op_add_counter = 0;
                self.op_del_counter = 0;
            }
            Err(err) => warn!("failed to clear WAL after export: {err}"),
        }
    }
}

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
    use crate::proto::{read_op_result, vector};
    use tempfile::tempdir;

    fn test_server(dir: &Path, threshold: u64) -> TableServer {
        TableServer::new(KvTable::new("test"), dir.join("db.table"), threshold)
    }

    fn put(server: &mut TableServer, buf: &mut FrameBuf, wal: Option<&mut Wal>, k: &[u8], v: &[u8]) {
        kv::write_put(buf, k, v).unwrap();
        assert_eq!(server.dispatch(buf, wal), Outcome::Respond);
        let (code, _) = read_op_result(buf).unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn test_put_get_del_round_trip() {
        let dir = tempdir().unwrap();
        let mut server = test_server(dir.path(), 10);
        let mut buf = FrameBuf::new();

        put(&mut server, &mut buf, None, b"user:1", b"alice");

        kv::write_get(&mut buf, b"user:1").unwrap();
        assert_eq!(server.dispatch(&mut buf, None), Outcome::Respond);
        assert_eq!(buf.kind, MsgType::GetResult as u8);
        assert_eq!(kv::read_get_result(&buf).unwrap(), b"alice");

        kv::write_del(&mut buf, b"user:1").unwrap();
        assert_eq!(server.dispatch(&mut buf, None), Outcome::Respond);
        let (code, _) = read_op_result(&buf).unwrap();
        assert_eq!(code, 0);

        kv::write_get(&mut buf, b"user:1").unwrap();
        assert_eq!(server.dispatch(&mut buf, None), Outcome::Respond);
        assert_eq!(buf.kind, MsgType::Error as u8);
        let (code, _) = read_op_result(&buf).unwrap();
        assert_eq!(code, Code::KeyNotFound.as_u32());
    }

    #[test]
    fn test_empty_value_round_trip() {
        let dir = tempdir().unwrap();
        let mut server = test_server(dir.path(), 10);
        let mut buf = FrameBuf::new();

        put(&mut server, &mut buf, None, b"empty", b"");

        kv::write_get(&mut buf, b"empty").unwrap();
        assert_eq!(server.dispatch(&mut buf, None), Outcome::Respond);
        assert_eq!(buf.kind, MsgType::GetResult as u8);
        assert!(kv::read_get_result(&buf).unwrap().is_empty());
    }

    #[test]
    fn test_del_miss_reports_not_found_without_wal() {
        let dir = tempdir().unwrap();
        let mut server = test_server(dir.path(), 10);
        let wal_path = dir.path().join("db.twal");
        let mut wal = Wal::open(&wal_path);
        let mut buf = FrameBuf::new();

        kv::write_del(&mut buf, b"ghost").unwrap();
        assert_eq!(server.dispatch(&mut buf, Some(&mut wal)), Outcome::Respond);
        assert_eq!(buf.kind, MsgType::DelResult as u8);
        let (code, _) = read_op_result(&buf).unwrap();
        assert_eq!(code, Code::KeyNotFound.as_u32());
        assert!(!wal_path.exists());
        assert_eq!(server.pending_ops(), 0);
    }

    #[test]
    fn test_foreign_opcode_closes_connection() {
        let dir = tempdir().unwrap();
        let mut server = test_server(dir.path(), 10);
        let mut buf = FrameBuf::new();

        vector::write_insert(&mut buf, 1, &[1.0]).unwrap();
        assert_eq!(server.dispatch(&mut buf, None), Outcome::Close);
    }

    #[test]
    fn test_malformed_payload_closes_connection() {
        let dir = tempdir().unwrap();
        let mut server = test_server(dir.path(), 10);
        let mut buf = FrameBuf::new();

        buf.reset(MsgType::Put as u8).extend_from_slice(&[0x9F]);
        assert_eq!(server.dispatch(&mut buf, None), Outcome::Close);
    }

    #[test]
    fn test_wal_records_only_applied_mutations() {
        let dir = tempdir().unwrap();
        let mut server = test_server(dir.path(), 10);
        let wal_path = dir.path().join("db.twal");
        let mut wal = Wal::open(&wal_path);
        let mut buf = FrameBuf::new();

        put(&mut server, &mut buf, Some(&mut wal), b"a", b"1");

        kv::write_get(&mut buf, b"a").unwrap();
        server.dispatch(&mut buf, Some(&mut wal));

        kv::write_del(&mut buf, b"a").unwrap();
        server.dispatch(&mut buf, Some(&mut wal));

        let mut reader = WalReader::open(&wal_path).unwrap();
        let mut frame = FrameBuf::new();
        let mut kinds = Vec::new();
        while reader.next_into(&mut frame).unwrap() {
            kinds.push(frame.kind);
        }
        assert_eq!(kinds, vec![MsgType::Put as u8, MsgType::Del as u8]);
    }

    #[test]
    fn test_checkpoint_rollover() {
        let dir = tempdir().unwrap();
        let mut server = test_server(dir.path(), 3);
        let wal_path = dir.path().join("db.twal");
        let mut wal = Wal::open(&wal_path);
        let mut buf = FrameBuf::new();

        for i in 0..4u8 {
            put(&mut server, &mut buf, Some(&mut wal), &[b'k', i], b"v");
            server.maybe_checkpoint(&mut wal);
        }

        // Four mutations with threshold 3: the probe after the fourth fires.
        assert!(dir.path().join("db.table").exists());
        assert!(!wal_path.exists());
        assert_eq!(server.pending_ops(), 0);

        // Restart from the snapshot alone: state is intact.
        let restored = KvTable::load("test", &dir.path().join("db.table")).unwrap();
        assert_eq!(restored.len(), 4);
    }

    #[test]
    fn test_wal_replay_restores_state() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("db.twal");

        {
            let mut server = test_server(dir.path(), 100);
            let mut wal = Wal::open(&wal_path);
            let mut buf = FrameBuf::new();
            for i in 0..5u8 {
                put(&mut server, &mut buf, Some(&mut wal), &[b'k', i], &[b'v', i]);
            }
        }

        let mut restored = test_server(dir.path(), 100);
        restored.load_wal(&wal_path).unwrap();
        assert_eq!(restored.table().len(), 5);
        for i in 0..5u8 {
            assert_eq!(restored.table().get(&[b'k', i]), Some(&[b'v', i][..]));
        }
    }

    #[test]
    fn test_wal_replay_is_idempotent() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("db.twal");

        {
            let mut server = test_server(dir.path(), 100);
            let mut wal = Wal::open(&wal_path);
            let mut buf = FrameBuf::new();
            put(&mut server, &mut buf, Some(&mut wal), b"k", b"v1");
            put(&mut server, &mut buf, Some(&mut wal), b"k", b"v2");
            kv::write_del(&mut buf, b"k").unwrap();
            server.dispatch(&mut buf, Some(&mut wal));
            put(&mut server, &mut buf, Some(&mut wal), b"k", b"v3");
        }

        let mut once = test_server(dir.path(), 100);
        once.load_wal(&wal_path).unwrap();

        let mut twice = test_server(dir.path(), 100);
        twice.load_wal(&wal_path).unwrap();
        twice.load_wal(&wal_path).unwrap();

        assert_eq!(once.table().get(b"k"), Some(&b"v3"[..]));
        assert_eq!(twice.table().get(b"k"), Some(&b"v3"[..]));
        assert_eq!(once.table().len(), twice.table().len());
    }
}
