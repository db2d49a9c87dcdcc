//! Exact brute-force index.
//!
//! Scans every stored vector and keeps the k best in a bounded max-heap.
//! Recall is exact by construction, which is what makes `-t flat` useful as a
//! ground-truth baseline for the HNSW index.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap};

use crate::distance::Method;
use crate::error::IndexError;

/// Heap entry ordered by distance (max-heap keeps the current worst on top).
#[derive(Clone, Copy)]
struct HeapEntry {
    id: u64,
    distance: f32,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Brute-force exact nearest-neighbor index.
pub struct FlatIndex {
    method: Method,
    vectors: HashMap<u64, Vec<f32>>,
}

impl FlatIndex {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            vectors: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.vectors.contains_key(&id)
    }

    pub fn insert(&mut self, id: u64, vector: Vec<f32>) -> Result<(), IndexError> {
        match self.vectors.entry(id) {
            Entry::Occupied(_) => Err(IndexError::Duplicated(id)),
            Entry::Vacant(slot) => {
                slot.insert(vector);
                Ok(())
            }
        }
    }

    pub fn delete(&mut self, id: u64) -> Result<(), IndexError> {
        self.vectors
            .remove(&id)
            .map(|_| ())
            .ok_or(IndexError::NotFound(id))
    }

    /// Exact top-k scan, ascending by distance.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(u64, f32)> {
        if k == 0 {
            return Vec::new();
        }

        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(k + 1);
        for (&id, vector) in &self.vectors {
            let distance = self.method.distance(query, vector);
            heap.push(HeapEntry { id, distance });
            if heap.len() > k {
                heap.pop();
            }
        }

        let mut results: Vec<(u64, f32)> = heap.into_iter().map(|e| (e.id, e.distance)).collect();
        results.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        results
    }

    /// Iterate over all stored (id, vector) pairs.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (u64, &[f32])> {
        self.vectors.iter().map(|(&id, v)| (id, v.as_slice()))
    }
}
