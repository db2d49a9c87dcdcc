//! HNSW (Hierarchical Navigable Small World) index
//!
//! A multi-layer graph structure for approximate nearest neighbor search.
//!
//! # Algorithm Overview
//!
//! **Insert**: assign a random layer L (exponential distribution), greedy
//! search top-down from the entry point to L+1, then wire connections on all
//! layers from L down to 0 with a diversity-preserving neighbor heuristic.
//!
//! **Search**: greedy descent from the entry point to layer 1, then beam
//! search on layer 0 with `ef` candidates.
//!
//! **Delete**: unlink the node and drop every edge pointing at it; if it was
//! the entry point, the surviving node with the highest layer takes over.
//!
//! Node ids are caller-assigned u64s and the vectors live in the index itself,
//! so the id space may be sparse.

mod node;

pub use node::Node;

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::distance::Method;
use crate::error::IndexError;

/// Candidate for search (min-heap)
#[derive(Clone, Copy)]
struct Candidate {
    id: u64,
    distance: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for min-heap (smaller distance = higher priority)
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Result from search (max-heap for evicting the current worst)
#[derive(Clone, Copy)]
struct SearchResult {
    id: u64,
    distance: f32,
}

impl PartialEq for SearchResult {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl Eq for SearchResult {}

impl Ord for SearchResult {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for SearchResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Default beam width for queries; raised to `k` when callers ask for more.
const EF_SEARCH: usize = 64;

/// HNSW graph index over caller-assigned u64 ids.
pub struct HnswIndex {
    method: Method,

    /// Stored vectors, keyed by id.
    vectors: HashMap<u64, Vec<f32>>,

    /// All nodes in the graph.
    nodes: Vec<Node>,

    /// Map from node id to index in `nodes` (O(1) lookup).
    id_to_index: HashMap<u64, usize>,

    /// Entry point node id (a node on the highest layer).
    entry_point: Option<u64>,

    /// Maximum layer currently in the graph.
    max_layer: usize,

    /// Max neighbors per layer (M).
    m: usize,

    /// Max neighbors for layer 0 (2*M).
    m0: usize,

    /// Level multiplier for random layer assignment (1/ln(M)).
    ml: f64,

    /// Search depth during construction.
    ef_construction: usize,

    /// RNG for layer assignment.
    rng: StdRng,
}

impl HnswIndex {
    /// Create an empty index with the default parameters M=16, ef=100.
    pub fn new(method: Method) -> Self {
        Self::with_params(method, 16, 100)
    }

    /// Create an empty index with explicit HNSW parameters.
    pub fn with_params(method: Method, m: usize, ef_construction: usize) -> Self {
        Self {
            method,
            vectors: HashMap::new(),
            nodes: Vec::new(),
            id_to_index: HashMap::new(),
            entry_point: None,
            max_layer: 0,
            m,
            m0: m * 2,
            ml: 1.0 / (m as f64).ln(),
            ef_construction,
            rng: StdRng::seed_from_u64(rand::random()),
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

    /// Iterate over all stored (id, vector) pairs.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (u64, &[f32])> {
        self.vectors.iter().map(|(&id, v)| (id, v.as_slice()))
    }

    #[inline]
    fn get_node(&self, id: u64) -> Option<&Node> {
        self.id_to_index.get(&id).map(|&idx| &self.nodes[idx])
    }

    #[inline]
    fn distance(&self, query: &[f32], node_id: u64) -> f32 {
        match self.vectors.get(&node_id) {
            Some(v) => self.method.distance(query, v),
            None => f32::INFINITY,
        }
    }

    #[inline]
    fn pair_distance(&self, a: u64, b: u64) -> f32 {
        match (self.vectors.get(&a), self.vectors.get(&b)) {
            (Some(va), Some(vb)) => self.method.distance(va, vb),
            _ => f32::INFINITY,
        }
    }

    /// Assign a random layer based on an exponential distribution.
    fn random_layer(&mut self) -> usize {
        let r: f64 = self.rng.gen();
        (-r.ln() * self.ml).floor() as usize
    }

    /// Insert a vector under a new id.
    pub fn insert(&mut self, id: u64, vector: Vec<f32>) -> Result<(), IndexError> {
        if self.vectors.contains_key(&id) {
            return Err(IndexError::Duplicated(id));
        }
        self.vectors.insert(id, vector);

        let query = self.vectors[&id].clone();
        let node_layer = self.random_layer();
        let mut node = Node::new(id, node_layer);

        // First node becomes entry point
        let Some(entry_point) = self.entry_point else {
            self.entry_point = Some(id);
            self.max_layer = node_layer;
            self.id_to_index.insert(id, 0);
            self.nodes.push(node);
            return Ok(());
        };

        let mut current_node = entry_point;

        // Phase 1: zoom in from the top layer to node_layer + 1,
        // greedy search with a single best neighbor per layer
        for layer in (node_layer + 1..=self.max_layer).rev() {
            let nearest = self.search_layer(&query, &[current_node], 1, layer);
            if let Some((nearest_id, _)) = nearest.first() {
                current_node = *nearest_id;
            }
        }

        // Phase 2: wire connections from min(node_layer, max_layer) down to 0
        let start_layer = node_layer.min(self.max_layer);

        let mut reverse_edges: Vec<(usize, usize, u64)> = Vec::new();
        let mut prune_ops: Vec<(usize, usize, Vec<u64>)> = Vec::new();

        for layer in (0..=start_layer).rev() {
            let m_layer = if layer == 0 { self.m0 } else { self.m };

            let candidates =
                self.search_layer(&query, &[current_node], self.ef_construction, layer);
            let neighbors = self.select_neighbors(&candidates, m_layer);

            for &(neighbor_id, _) in &neighbors {
                node.add_neighbor(layer, neighbor_id);

                if let Some(&node_idx) = self.id_to_index.get(&neighbor_id) {
                    reverse_edges.push((node_idx, layer, id));

                    // Prune the neighbor's list when the new edge overflows it
                    let current_neighbors = self.nodes[node_idx].neighbors(layer);
                    if current_neighbors.len() >= m_layer {
                        let mut all_neighbors: Vec<u64> = current_neighbors.to_vec();
                        all_neighbors.push(id);

                        let neighbor_candidates: Vec<(u64, f32)> = all_neighbors
                            .iter()
                            .map(|&n| (n, self.pair_distance(neighbor_id, n)))
                            .collect();

                        let pruned = self.select_neighbors(&neighbor_candidates, m_layer);
                        let pruned_ids: Vec<u64> = pruned.iter().map(|(id, _)| *id).collect();
                        prune_ops.push((node_idx, layer, pruned_ids));
                    }
                }
            }

            if let Some((first_id, _)) = candidates.first() {
                current_node = *first_id;
            }
        }

        // Apply reverse edges, skipping targets that pruning will overwrite
        let prune_targets: HashSet<(usize, usize)> = prune_ops
            .iter()
            .map(|(idx, layer, _)| (*idx, *layer))
            .collect();

        for (node_idx, layer, neighbor_id) in reverse_edges {
            if !prune_targets.contains(&(node_idx, layer)) {
                self.nodes[node_idx].add_neighbor(layer, neighbor_id);
            }
        }

        for (node_idx, layer, new_neighbors) in prune_ops {
            if let Some(layer_neighbors) = self.nodes[node_idx].neighbors_mut(layer) {
                layer_neighbors.clear();
                layer_neighbors.extend(new_neighbors);
            }
        }

        if node_layer > self.max_layer {
            self.max_layer = node_layer;
            self.entry_point = Some(id);
        }

        let node_idx = self.nodes.len();
        self.id_to_index.insert(id, node_idx);
        self.nodes.push(node);
        Ok(())
    }

    /// Remove a vector and unlink its node from the graph.
    pub fn delete(&mut self, id: u64) -> Result<(), IndexError> {
        let Some(idx) = self.id_to_index.remove(&id) else {
            return Err(IndexError::NotFound(id));
        };
        self.vectors.remove(&id);

        self.nodes.swap_remove(idx);
        if idx < self.nodes.len() {
            let moved_id = self.nodes[idx].id;
            self.id_to_index.insert(moved_id, idx);
        }

        for node in &mut self.nodes {
            node.remove_neighbor(id);
        }

        if self.entry_point == Some(id) {
            // Surviving node with the highest layer takes over as entry point.
            let new_entry = self
                .nodes
                .iter()
                .max_by_key(|n| n.max_layer())
                .map(|n| (n.id, n.max_layer()));
            match new_entry {
                Some((entry_id, layer)) => {
                    self.entry_point = Some(entry_id);
                    self.max_layer = layer;
                }
                None => {
                    self.entry_point = None;
                    self.max_layer = 0;
                }
            }
        }

        Ok(())
    }

    /// Search for the k nearest neighbors, ascending by distance.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(u64, f32)> {
        let Some(entry_point) = self.entry_point else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }

        let mut current_node = entry_point;

        // Phase 1: greedy descent from top layer to layer 1
        for layer in (1..=self.max_layer).rev() {
            let nearest = self.search_layer(query, &[current_node], 1, layer);
            if let Some((nearest_id, _)) = nearest.first() {
                current_node = *nearest_id;
            }
        }

        // Phase 2: beam search on layer 0
        let ef = EF_SEARCH.max(k);
        let mut candidates = self.search_layer(query, &[current_node], ef, 0);
        candidates.truncate(k);
        candidates
    }

    /// Greedy beam search with `ef` candidates on a single layer.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[u64],
        ef: usize,
        layer: usize,
    ) -> Vec<(u64, f32)> {
        // Ids are sparse u64s, so visited tracking is a hash set rather than
        // the dense epoch array a packed id space would allow.
        let mut visited: HashSet<u64> = HashSet::with_capacity(ef * 4);

        let mut candidates: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef);
        let mut results: BinaryHeap<SearchResult> = BinaryHeap::with_capacity(ef + 1);

        for &ep in entry_points {
            if visited.insert(ep) {
                let dist = self.distance(query, ep);
                candidates.push(Candidate { id: ep, distance: dist });
                results.push(SearchResult { id: ep, distance: dist });
            }
        }

        while let Some(current) = candidates.pop() {
            if let Some(worst) = results.peek() {
                if current.distance > worst.distance && results.len() >= ef {
                    break;
                }
            }

            if let Some(node) = self.get_node(current.id) {
                for &neighbor_id in node.neighbors(layer) {
                    if !visited.insert(neighbor_id) {
                        continue;
                    }

                    let dist = self.distance(query, neighbor_id);
                    let dominated = results.len() >= ef
                        && results.peek().map_or(false, |w| dist > w.distance);
                    if !dominated {
                        candidates.push(Candidate {
                            id: neighbor_id,
                            distance: dist,
                        });
                        results.push(SearchResult {
                            id: neighbor_id,
                            distance: dist,
                        });
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        let mut result_vec: Vec<_> = results.into_iter().map(|r| (r.id, r.distance)).collect();
        result_vec.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        result_vec
    }

    /// Diversity-preserving neighbor selection.
    ///
    /// A candidate is kept only if it is closer to the query than to any
    /// already-selected neighbor; remaining slots are filled with the closest
    /// rejects.
    fn select_neighbors(&self, candidates: &[(u64, f32)], m: usize) -> Vec<(u64, f32)> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut sorted: Vec<_> = candidates.to_vec();
        sorted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        let mut result = Vec::with_capacity(m);

        for &(candidate_id, candidate_dist) in &sorted {
            if result.len() >= m {
                break;
            }

            let mut is_diverse = true;
            for &(existing_id, _) in &result {
                if self.pair_distance(candidate_id, existing_id) < candidate_dist {
                    // An existing neighbor already covers this direction.
                    is_diverse = false;
                    break;
                }
            }

            if is_diverse {
                result.push((candidate_id, candidate_dist));
            }
        }

        if result.len() < m {
            for &(candidate_id, candidate_dist) in &sorted {
                if result.len() >= m {
                    break;
                }
                if !result.iter().any(|(id, _)| *id == candidate_id) {
                    result.push((candidate_id, candidate_dist));
                }
            }
        }

        result
    }
}
