//! Binary-safe key-value table with db.table dump/load.
//!
//! Keys and values are arbitrary byte strings; values may be empty and come
//! back byte-for-byte. The on-disk dump is a length-prefixed record file:
//!
//! ```text
//! Offset   Size    Type        Description
//! ─────────────────────────────────────────────
//! 0x00     8       [u8; 8]     Magic: "VTBL0001"
//! 0x08     8       u64 LE      N: number of records
//! 0x10     ...                 Records: klen u32 LE, vlen u32 LE, key, value
//! ```
//!
//! Dumps are written to a temp file, fsynced and renamed, so a crash during
//! export leaves the previous snapshot intact.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use crate::error::KvError;

/// Magic bytes identifying a db.table snapshot.
pub const TABLE_MAGIC: [u8; 8] = *b"VTBL0001";

/// In-memory key-value table.
pub struct KvTable {
    name: String,
    map: HashMap<Vec<u8>, Vec<u8>>,
}

impl KvTable {
    /// Allocate an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            map: HashMap::new(),
        }
    }

    /// Load a table from a dump file.
    pub fn load(name: impl Into<String>, path: &Path) -> Result<Self, KvError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic).map_err(truncated)?;
        if magic != TABLE_MAGIC {
            return Err(KvError::InvalidMagic);
        }

        let mut count_bytes = [0u8; 8];
        reader.read_exact(&mut count_bytes).map_err(truncated)?;
        let count = u64::from_le_bytes(count_bytes);

        let mut map = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let mut lens = [0u8; 8];
            reader.read_exact(&mut lens).map_err(truncated)?;
            let klen = u32::from_le_bytes(lens[0..4].try_into().unwrap()) as usize;
            let vlen = u32::from_le_bytes(lens[4..8].try_into().unwrap()) as usize;

            let mut key = vec![0u8; klen];
            reader.read_exact(&mut key).map_err(truncated)?;
            let mut value = vec![0u8; vlen];
            reader.read_exact(&mut value).map_err(truncated)?;
            map.insert(key, value);
        }

        Ok(Self {
            name: name.into(),
            map,
        })
    }

    /// Write the full table state to `path`.
    pub fn dump(&self, path: &Path) -> Result<(), KvError> {
        let tmp_path = path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&TABLE_MAGIC)?;
            writer.write_all(&(self.map.len() as u64).to_le_bytes())?;
            for (key, value) in &self.map {
                writer.write_all(&(key.len() as u32).to_le_bytes())?;
                writer.write_all(&(value.len() as u32).to_le_bytes())?;
                writer.write_all(key)?;
                writer.write_all(value)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;

        if let Some(parent) = path.parent() {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Insert or overwrite a key.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        self.map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    /// Look up a key. Empty values are hits, not misses.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.map.get(key).map(|v| v.as_slice())
    }

    /// Delete a key.
    pub fn del(&mut self, key: &[u8]) -> Result<(), KvError> {
        self.map.remove(key).map(|_| ()).ok_or(KvError::KeyNotFound)
    }
}

fn truncated(err: std::io::Error) -> KvError {
    if err.kind() == ErrorKind::UnexpectedEof {
        KvError::Truncated
    } else {
        KvError::Io(err)
    }
}
