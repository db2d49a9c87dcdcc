//! Storage layout and environment configuration.
//!
//! Every database lives under `<root>/<name>/`:
//!
//! | File          | Purpose                      |
//! |---------------|------------------------------|
//! | `db.index`    | Vector-index snapshot        |
//! | `db.table`    | Key-value snapshot           |
//! | `db.iwal`     | Vector-index write-ahead log |
//! | `db.twal`     | Key-value write-ahead log    |
//! | `socket.unix` | Default endpoint path        |

use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Root directory for all databases unless overridden.
pub const DB_ROOT: &str = "/var/lib/victord";

/// Environment override for the database root directory.
pub const DB_ROOT_ENV: &str = "VICTOR_DB_ROOT";

/// Environment override for the checkpoint threshold.
pub const EXPORT_THRESHOLD_ENV: &str = "VICTOR_EXPORT_THRESHOLD";

/// Mutations since the last snapshot before a checkpoint is attempted.
pub const DEFAULT_EXPORT_THRESHOLD: u64 = 10;

pub const INDEX_FILE: &str = "db.index";
pub const TABLE_FILE: &str = "db.table";
pub const IWAL_FILE: &str = "db.iwal";
pub const TWAL_FILE: &str = "db.twal";
pub const SOCKET_FILE: &str = "socket.unix";

/// The database root: `VICTOR_DB_ROOT` or the built-in default.
pub fn db_root() -> PathBuf {
    match std::env::var_os(DB_ROOT_ENV) {
        Some(root) if !root.is_empty() => PathBuf::from(root),
        _ => PathBuf::from(DB_ROOT),
    }
}

/// The checkpoint threshold: `VICTOR_EXPORT_THRESHOLD` or the default.
pub fn export_threshold() -> u64 {
    let Some(raw) = std::env::var_os(EXPORT_THRESHOLD_ENV) else {
        return DEFAULT_EXPORT_THRESHOLD;
    };
    match raw.to_str().and_then(|s| s.parse::<u64>().ok()) {
        Some(value) => value,
        None => {
            warn!(
                "invalid {} value {:?}, using default {}",
                EXPORT_THRESHOLD_ENV, raw, DEFAULT_EXPORT_THRESHOLD
            );
            DEFAULT_EXPORT_THRESHOLD
        }
    }
}

/// Resolved per-database directory and file names.
#[derive(Debug, Clone)]
pub struct DbPaths {
    dir: PathBuf,
}

impl DbPaths {
    /// Resolve `<root>/<name>` using the environment root, creating the
    /// directory with owner-only permissions when absent.
    pub fn resolve(name: &str) -> io::Result<DbPaths> {
        Self::under(&db_root(), name)
    }

    /// Resolve `<root>/<name>` under an explicit root.
    pub fn under(root: &Path, name: &str) -> io::Result<DbPaths> {
        let dir = root.join(name);
        if !dir.is_dir() {
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                std::fs::DirBuilder::new()
                    .recursive(true)
                    .mode(0o700)
                    .create(&dir)?;
            }
            #[cfg(not(unix))]
            std::fs::create_dir_all(&dir)?;
        }
        Ok(DbPaths { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index_file(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn table_file(&self) -> PathBuf {
        self.dir.join(TABLE_FILE)
    }

    pub fn index_wal(&self) -> PathBuf {
        self.dir.join(IWAL_FILE)
    }

    pub fn table_wal(&self) -> PathBuf {
        self.dir.join(TWAL_FILE)
    }

    pub fn default_socket(&self) -> PathBuf {
        self.dir.join(SOCKET_FILE)
    }
}
