//! db.index binary snapshot format
//!
//! # File Structure
//!
//! ```text
//! Offset   Size    Type        Description
//! ─────────────────────────────────────────────
//! 0x00     8       [u8; 8]     Magic: "VIDX0001"
//! 0x08     4       u32 LE      Index kind (0 = flat, 1 = hnsw)
//! 0x0C     4       u32 LE      Similarity method (0 = cosine, 1 = dotp, 2 = l2norm)
//! 0x10     4       u32 LE      D: dimensions
//! 0x14     4       u32 LE      Reserved (0)
//! 0x18     8       u64 LE      N: number of records
//! 0x20     N*(8+D*4)           Records: id (u64 LE) + D × f32 LE
//! ```
//!
//! Snapshots persist the vectors only; graph indexes are rebuilt on import.
//! Writes go to a temp file that is fsynced and renamed over the target so a
//! crash mid-export never clobbers the previous snapshot.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use memmap2::Mmap;
use thiserror::Error;

use crate::distance::Method;
use crate::index::IndexKind;

/// Magic bytes identifying a db.index snapshot.
pub const MAGIC: [u8; 8] = *b"VIDX0001";

/// Header size in bytes.
pub const HEADER_SIZE: usize = 32;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("invalid magic bytes: expected VIDX0001")]
    InvalidMagic,

    #[error("unknown index kind: {0}")]
    UnknownKind(u32),

    #[error("unknown similarity method: {0}")]
    UnknownMethod(u32),

    #[error("snapshot truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("record data not aligned for f32 access")]
    Alignment,

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Parsed snapshot header.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotHeader {
    pub kind: IndexKind,
    pub method: Method,
    pub dims: u32,
    pub count: u64,
}

fn kind_to_u32(kind: IndexKind) -> u32 {
    match kind {
        IndexKind::Flat => 0,
        IndexKind::Hnsw => 1,
    }
}

fn method_to_u32(method: Method) -> u32 {
    match method {
        Method::Cosine => 0,
        Method::DotProduct => 1,
        Method::L2Norm => 2,
    }
}

impl SnapshotHeader {
    /// Parse a header from the first [`HEADER_SIZE`] bytes of a file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        if bytes.len() < HEADER_SIZE {
            return Err(SnapshotError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        if bytes[0..8] != MAGIC {
            return Err(SnapshotError::InvalidMagic);
        }

        let kind_raw = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let method_raw = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let dims = u32::from_le_bytes(bytes[16..20].try_into().unwrap());
        let count = u64::from_le_bytes(bytes[24..32].try_into().unwrap());

        let kind = match kind_raw {
            0 => IndexKind::Flat,
            1 => IndexKind::Hnsw,
            other => return Err(SnapshotError::UnknownKind(other)),
        };
        let method = match method_raw {
            0 => Method::Cosine,
            1 => Method::DotProduct,
            2 => Method::L2Norm,
            other => return Err(SnapshotError::UnknownMethod(other)),
        };

        Ok(Self {
            kind,
            method,
            dims,
            count,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8..12].copy_from_slice(&kind_to_u32(self.kind).to_le_bytes());
        buf[12..16].copy_from_slice(&method_to_u32(self.method).to_le_bytes());
        buf[16..20].copy_from_slice(&self.dims.to_le_bytes());
        buf[24..32].copy_from_slice(&self.count.to_le_bytes());
        buf
    }

    /// Size in bytes of one id + vector record.
    #[inline]
    pub fn record_size(&self) -> usize {
        8 + self.dims as usize * std::mem::size_of::<f32>()
    }

    /// Expected total file size.
    pub fn file_size(&self) -> usize {
        HEADER_SIZE + self.count as usize * self.record_size()
    }
}

/// Write a snapshot durably: temp file, fsync, rename, directory fsync.
pub fn write_snapshot<'a, I>(
    path: &Path,
    kind: IndexKind,
    method: Method,
    dims: usize,
    records: I,
) -> Result<(), SnapshotError>
where
    I: ExactSizeIterator<Item = (u64, &'a [f32])>,
{
    let header = SnapshotHeader {
        kind,
        method,
        dims: dims as u32,
        count: records.len() as u64,
    };

    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&header.to_bytes())?;
        for (id, vector) in records {
            writer.write_all(&id.to_le_bytes())?;
            for value in vector {
                writer.write_all(&value.to_le_bytes())?;
            }
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;

    // Directory entry durability after the rename.
    if let Some(parent) = path.parent() {
        File::open(parent)?.sync_all()?;
    }

    Ok(())
}

/// Memory-mapped snapshot reader.
pub struct SnapshotReader {
    mmap: Mmap,
    header: SnapshotHeader,
}

impl SnapshotReader {
    pub fn open(path: &Path) -> Result<Self, SnapshotError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let header = SnapshotHeader::from_bytes(&mmap)?;
        let expected = header.file_size();
        if mmap.len() < expected {
            return Err(SnapshotError::Truncated {
                expected,
                actual: mmap.len(),
            });
        }

        Ok(Self { mmap, header })
    }

    pub fn header(&self) -> &SnapshotHeader {
        &self.header
    }

    /// Record at `index` as (id, vector slice).
    ///
    /// Record offsets are 8-aligned relative to the 32-byte header, so the
    /// f32 payload satisfies bytemuck's alignment check on every platform.
    pub fn record(&self, index: usize) -> Result<(u64, &[f32]), SnapshotError> {
        let record_size = self.header.record_size();
        let start = HEADER_SIZE + index * record_size;
        let bytes = &self.mmap[start..start + record_size];

        let id = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let vector =
            bytemuck::try_cast_slice(&bytes[8..]).map_err(|_| SnapshotError::Alignment)?;
        Ok((id, vector))
    }

    /// Iterate over all records.
    pub fn iter(&self) -> impl Iterator<Item = Result<(u64, &[f32]), SnapshotError>> {
        (0..self.header.count as usize).map(move |i| self.record(i))
    }
}
