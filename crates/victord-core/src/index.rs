//! The unified vector-index handle the servers consume.
//!
//! Wraps either the exact [`FlatIndex`] or the approximate [`HnswIndex`]
//! behind one interface: allocate with a kind/method/dimensionality, then
//! insert, delete, search, and export/import snapshots. Dimensionality is
//! fixed at allocation and every vector is checked against it.

use std::path::Path;

use tracing::info;

use crate::distance::Method;
use crate::error::IndexError;
use crate::flat::FlatIndex;
use crate::hnsw::HnswIndex;
use crate::snapshot::{self, SnapshotReader};

/// Index structure selected at allocation time (`-t flat | hnsw`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Flat,
    Hnsw,
}

enum Inner {
    Flat(FlatIndex),
    Hnsw(HnswIndex),
}

/// A vector index with fixed dimensionality and similarity method.
pub struct VectorIndex {
    kind: IndexKind,
    method: Method,
    dims: usize,
    inner: Inner,
}

impl VectorIndex {
    /// Allocate an empty index. Dimensionality must be non-zero.
    pub fn new(kind: IndexKind, method: Method, dims: usize) -> Result<Self, IndexError> {
        if dims == 0 {
            return Err(IndexError::InvalidArgument(
                "dimensions must be non-zero".into(),
            ));
        }
        let inner = match kind {
            IndexKind::Flat => Inner::Flat(FlatIndex::new(method)),
            IndexKind::Hnsw => Inner::Hnsw(HnswIndex::new(method)),
        };
        Ok(Self {
            kind,
            method,
            dims,
            inner,
        })
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        match &self.inner {
            Inner::Flat(index) => index.len(),
            Inner::Hnsw(index) => index.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_dims(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dims {
            return Err(IndexError::InvalidDimensions {
                expected: self.dims,
                got: vector.len(),
            });
        }
        Ok(())
    }

    /// Insert a vector under a unique id.
    pub fn insert(&mut self, id: u64, vector: Vec<f32>) -> Result<(), IndexError> {
        self.check_dims(&vector)?;
        match &mut self.inner {
            Inner::Flat(index) => index.insert(id, vector),
            Inner::Hnsw(index) => index.insert(id, vector),
        }
    }

    /// Delete a vector by id.
    pub fn delete(&mut self, id: u64) -> Result<(), IndexError> {
        match &mut self.inner {
            Inner::Flat(index) => index.delete(id),
            Inner::Hnsw(index) => index.delete(id),
        }
    }

    /// k-nearest-neighbor search, ascending by distance.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>, IndexError> {
        self.check_dims(query)?;
        Ok(match &self.inner {
            Inner::Flat(index) => index.search(query, k),
            Inner::Hnsw(index) => index.search(query, k),
        })
    }

    /// Write the full committed state to `path`.
    pub fn export(&self, path: &Path) -> Result<(), IndexError> {
        match &self.inner {
            Inner::Flat(index) => {
                snapshot::write_snapshot(path, self.kind, self.method, self.dims, index.iter())?
            }
            Inner::Hnsw(index) => {
                snapshot::write_snapshot(path, self.kind, self.method, self.dims, index.iter())?
            }
        }
        info!("index exported: {} vectors to {:?}", self.len(), path);
        Ok(())
    }

    /// Replace the current contents with the snapshot at `path`.
    ///
    /// The snapshot must match this index's dimensionality and method; graph
    /// indexes are rebuilt record by record.
    pub fn import(&mut self, path: &Path) -> Result<(), IndexError> {
        let reader = SnapshotReader::open(path)?;
        let header = reader.header();

        if header.dims as usize != self.dims {
            return Err(IndexError::InvalidDimensions {
                expected: self.dims,
                got: header.dims as usize,
            });
        }
        if header.method != self.method {
            return Err(IndexError::InvalidArgument(format!(
                "snapshot method {:?} does not match configured {:?}",
                header.method, self.method
            )));
        }

        let mut inner = match self.kind {
            IndexKind::Flat => Inner::Flat(FlatIndex::new(self.method)),
            IndexKind::Hnsw => Inner::Hnsw(HnswIndex::new(self.method)),
        };
        for record in reader.iter() {
            let (id, vector) = record?;
            match &mut inner {
                Inner::Flat(index) => index.insert(id, vector.to_vec())?,
                Inner::Hnsw(index) => index.insert(id, vector.to_vec())?,
            }
        }
        self.inner = inner;
        info!("index imported: {} vectors from {:?}", self.len(), path);
        Ok(())
    }
}
