//! victord-table: the key-value table server.
//!
//! ```bash
//! victord-table -n musicdb -u /tmp/musicdb-table.sock
//! ```

use std::os::unix::net::UnixListener;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use victord::config::{self, DbPaths};
use victord::server::{serve, TableServer};
use victord::shutdown::Shutdown;
use victord::wal::Wal;
use victord_core::KvTable;

#[derive(Parser)]
#[command(name = "victord-table")]
#[command(about = "VictorDB key-value table server")]
#[command(version)]
struct Args {
    /// Name of the database to create or open
    #[arg(short = 'n', long)]
    name: String,

    /// Path to the unix socket (default: <root>/<name>/socket.unix)
    #[arg(short = 'u', long)]
    socket: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let paths = DbPaths::resolve(&args.name)
        .with_context(|| format!("preparing database directory for '{}'", args.name))?;

    let snapshot_path = paths.table_file();
    let table = if snapshot_path.exists() {
        tracing::info!("loading existing table...");
        KvTable::load(&args.name, &snapshot_path).context("loading table snapshot")?
    } else {
        KvTable::new(&args.name)
    };

    let threshold = config::export_threshold();
    let mut server = TableServer::new(table, snapshot_path, threshold);

    let wal_path = paths.table_wal();
    if wal_path.exists() {
        tracing::info!("loading transaction log...");
        server
            .load_wal(&wal_path)
            .context("replaying table write-ahead log")?;
    }

    let shutdown = Shutdown::new();
    shutdown.install().context("registering signal handlers")?;

    let socket_path = args.socket.unwrap_or_else(|| paths.default_socket());
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)
            .with_context(|| format!("removing stale socket {:?}", socket_path))?;
    }
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("binding unix socket {:?}", socket_path))?;

    tracing::info!("VictorDB table server started");
    tracing::info!("socket: {:?}", socket_path);
    tracing::info!("database root: {:?}", paths.dir());
    tracing::info!("export threshold: {} operations", threshold);
    tracing::info!("keys loaded: {}", server.table().len());

    let wal = Wal::open(&wal_path);
    let result = serve(&mut server, listener, wal, &shutdown);
    let _ = std::fs::remove_file(&socket_path);
    result.context("server loop failed")?;
    Ok(())
}
