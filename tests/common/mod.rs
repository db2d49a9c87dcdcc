//! Shared helpers: boot real servers on unix sockets in background threads.

// Each integration test binary compiles this module separately and uses a
// different subset of it.
#![allow(dead_code)]

use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use victord::config::DbPaths;
use victord::server::{serve, Dispatch, IndexServer, TableServer};
use victord::shutdown::Shutdown;
use victord::wal::Wal;
use victord_core::{IndexKind, KvTable, Method, VectorIndex};

pub struct ServerHandle<S> {
    pub socket: PathBuf,
    shutdown: Shutdown,
    thread: JoinHandle<S>,
}

impl<S> ServerHandle<S> {
    /// Raise the terminate flag and wait for a clean exit, returning the
    /// state machine for inspection.
    pub fn stop(self) -> S {
        self.shutdown.request();
        self.thread.join().expect("server thread panicked")
    }
}

fn bind(socket: &Path) -> UnixListener {
    if socket.exists() {
        std::fs::remove_file(socket).unwrap();
    }
    UnixListener::bind(socket).unwrap()
}

fn spawn<S>(server: S, listener: UnixListener, wal: Wal, socket: PathBuf) -> ServerHandle<S>
where
    S: Dispatch + Send + 'static,
{
    let shutdown = Shutdown::new();
    let flag = shutdown.clone();
    let thread = std::thread::spawn(move || {
        let mut server = server;
        serve(&mut server, listener, wal, &flag).unwrap();
        server
    });
    ServerHandle {
        socket,
        shutdown,
        thread,
    }
}

/// Boot a FLAT/cosine index server over `root/<name>`, importing any
/// existing snapshot and replaying any existing WAL, like the binary does.
pub fn spawn_index_server(
    root: &Path,
    name: &str,
    dims: usize,
    threshold: u64,
) -> ServerHandle<IndexServer> {
    let paths = DbPaths::under(root, name).unwrap();

    let mut index = VectorIndex::new(IndexKind::Flat, Method::Cosine, dims).unwrap();
    if paths.index_file().exists() {
        index.import(&paths.index_file()).unwrap();
    }

    let mut server = IndexServer::new(index, paths.index_file(), threshold);
    if paths.index_wal().exists() {
        server.load_wal(&paths.index_wal()).unwrap();
    }

    let socket = paths.default_socket();
    let listener = bind(&socket);
    let wal = Wal::open(paths.index_wal());
    spawn(server, listener, wal, socket)
}

/// Boot a table server over `root/<name>`, loading any existing snapshot and
/// replaying any existing WAL.
pub fn spawn_table_server(root: &Path, name: &str, threshold: u64) -> ServerHandle<TableServer> {
    let paths = DbPaths::under(root, name).unwrap();

    let table = if paths.table_file().exists() {
        KvTable::load(name, &paths.table_file()).unwrap()
    } else {
        KvTable::new(name)
    };

    let mut server = TableServer::new(table, paths.table_file(), threshold);
    if paths.table_wal().exists() {
        server.load_wal(&paths.table_wal()).unwrap();
    }

    let socket = paths.default_socket();
    let listener = bind(&socket);
    let wal = Wal::open(paths.table_wal());
    spawn(server, listener, wal, socket)
}

/// Poll until `predicate` holds or the timeout elapses.
pub fn wait_for(mut predicate: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if predicate() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(25));
    }
    false
}
