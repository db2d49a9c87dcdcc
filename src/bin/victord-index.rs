//! victord-index: the vector index server.
//!
//! ```bash
//! victord-index -n musicdb -d 128 -t hnsw -m cosine -u /tmp/musicdb.sock
//! ```

use std::os::unix::net::UnixListener;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use victord::config::{self, DbPaths};
use victord::server::{serve, IndexServer};
use victord::shutdown::Shutdown;
use victord::wal::Wal;
use victord_core::{IndexKind, Method, VectorIndex};

#[derive(Parser)]
#[command(name = "victord-index")]
#[command(about = "VictorDB vector index server")]
#[command(version)]
struct Args {
    /// Name of the database to create or open
    #[arg(short = 'n', long)]
    name: String,

    /// Dimensionality of the vectors
    #[arg(short = 'd', long)]
    dims: usize,

    /// Index type
    #[arg(short = 't', long = "type", value_enum, default_value = "hnsw")]
    index_type: IndexTypeArg,

    /// Similarity method
    #[arg(short = 'm', long, value_enum, default_value = "cosine")]
    method: MethodArg,

    /// Path to the unix socket (default: <root>/<name>/socket.unix)
    #[arg(short = 'u', long)]
    socket: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum IndexTypeArg {
    Flat,
    Hnsw,
}

impl From<IndexTypeArg> for IndexKind {
    fn from(value: IndexTypeArg) -> Self {
        match value {
            IndexTypeArg::Flat => IndexKind::Flat,
            IndexTypeArg::Hnsw => IndexKind::Hnsw,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Cosine,
    Dotp,
    L2norm,
}

impl From<MethodArg> for Method {
    fn from(value: MethodArg) -> Self {
        match value {
            MethodArg::Cosine => Method::Cosine,
            MethodArg::Dotp => Method::DotProduct,
            MethodArg::L2norm => Method::L2Norm,
        }
    }
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

    let mut index = VectorIndex::new(args.index_type.into(), args.method.into(), args.dims)
        .context("initializing vector index")?;

    let snapshot_path = paths.index_file();
    if snapshot_path.exists() {
        tracing::info!("loading existing vector index...");
        index
            .import(&snapshot_path)
            .context("loading vector index snapshot")?;
    }

    let threshold = config::export_threshold();
    let mut server = IndexServer::new(index, snapshot_path, threshold);

    let wal_path = paths.index_wal();
    if wal_path.exists() {
        tracing::info!("loading transaction log...");
        server
            .load_wal(&wal_path)
            .context("replaying index write-ahead log")?;
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

    tracing::info!("VictorDB index server started");
    tracing::info!("socket: {:?}", socket_path);
    tracing::info!("database root: {:?}", paths.dir());
    tracing::info!("export threshold: {} operations", threshold);
    tracing::info!(
        "index: {} ({} dimensions), {} vectors loaded",
        match server.index().kind() {
            IndexKind::Flat => "flat",
            IndexKind::Hnsw => "hnsw",
        },
        server.index().dims(),
        server.index().len()
    );

    let wal = Wal::open(&wal_path);
    let result = serve(&mut server, listener, wal, &shutdown);
    let _ = std::fs::remove_file(&socket_path);
    result.context("server loop failed")?;
    Ok(())
}
