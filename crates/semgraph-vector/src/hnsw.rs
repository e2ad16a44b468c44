//! HNSW (Hierarchical Navigable Small World) graph.
//!
//! Multi-layer proximity graph for approximate nearest neighbor search.
//! Higher layers hold exponentially fewer nodes; a query descends greedily
//! from the top layer and finishes with a beam search on layer 0.
//!
//! Neighbor lists are chosen with the diversity heuristic from the HNSW paper
//! (algorithm 4), topped up with the closest pruned candidates. Pruning never
//! drops a node's last incoming link on a layer, so every inserted vector stays
//! reachable even when many candidates sit at the same distance.
//!
//! Nodes are addressed by their insertion sequence. Removal is a soft delete:
//! the node keeps routing traffic but is never returned from a search.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use semgraph_core::error::SemgraphError;
use semgraph_core::types::Metric;

/// Max layer a node can be assigned to.
const MAX_LEVEL: usize = 16;

#[derive(Debug)]
struct Node {
    vector: Vec<f32>,
    magnitude: f32,
    /// Neighbor ids per layer, `0..=level`.
    neighbors: Vec<Vec<usize>>,
    /// Incoming link count per layer.
    in_degree: Vec<usize>,
    deleted: bool,
}

/// A node id with its distance to the current query. Orders by distance,
/// then by insertion sequence.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    id: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

/// HNSW index over fixed-dimension `f32` vectors.
#[derive(Debug)]
pub struct Hnsw {
    dimension: usize,
    metric: Metric,
    m: usize,
    m_max0: usize,
    ef_construction: usize,
    level_mult: f64,
    nodes: Vec<Node>,
    entry_point: Option<usize>,
    level_max: usize,
    live: usize,
    rng_state: u64,
}

impl Hnsw {
    /// Create an empty graph.
    ///
    /// * `m` - max neighbors per node per layer (layer 0 keeps `2 * m`)
    /// * `ef_construction` - beam width while inserting
    /// * `initial_cap` - node slots reserved up front
    pub fn new(
        dimension: usize,
        metric: Metric,
        m: usize,
        ef_construction: usize,
        initial_cap: usize,
    ) -> Self {
        let m = m.max(2);
        Self {
            dimension,
            metric,
            m,
            m_max0: m * 2,
            ef_construction: ef_construction.max(1),
            level_mult: 1.0 / (m as f64).ln(),
            nodes: Vec::with_capacity(initial_cap),
            entry_point: None,
            level_max: 0,
            live: 0,
            rng_state: 42,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of searchable (not deleted) vectors.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of nodes including soft-deleted ones.
    pub fn total(&self) -> usize {
        self.nodes.len()
    }

    /// Stored vector of a live node.
    pub fn vector(&self, id: usize) -> Option<&[f32]> {
        self.nodes
            .get(id)
            .filter(|n| !n.deleted)
            .map(|n| n.vector.as_slice())
    }

    /// Insert a vector and return its node id.
    pub fn insert(&mut self, vector: Vec<f32>) -> Result<usize, SemgraphError> {
        if vector.len() != self.dimension {
            return Err(SemgraphError::InvalidArgument(format!(
                "Vector dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }

        let id = self.nodes.len();
        let level = self.select_level();
        let magnitude = magnitude(&vector);
        self.nodes.push(Node {
            vector,
            magnitude,
            neighbors: vec![Vec::new(); level + 1],
            in_degree: vec![0; level + 1],
            deleted: false,
        });
        self.live += 1;

        let Some(mut entry) = self.entry_point else {
            self.entry_point = Some(id);
            self.level_max = level;
            return Ok(id);
        };

        let query = self.nodes[id].vector.clone();

        // Greedy descent through the layers above the new node's level.
        for layer in ((level + 1)..=self.level_max).rev() {
            if let Some(best) = self.search_layer(&query, magnitude, entry, 1, layer).first() {
                entry = best.id;
            }
        }

        for layer in (0..=level.min(self.level_max)).rev() {
            let found = self.search_layer(&query, magnitude, entry, self.ef_construction, layer);
            let limit = if layer == 0 { self.m_max0 } else { self.m };

            let candidates: Vec<Candidate> =
                found.iter().copied().filter(|c| c.id != id).collect();
            let selected: Vec<usize> = self
                .rank_neighbors(&candidates, limit)
                .into_iter()
                .take(limit)
                .map(|c| c.id)
                .collect();

            for &neighbor in &selected {
                self.connect(id, neighbor, layer);
                self.connect(neighbor, id, layer);
                self.prune(neighbor, layer, limit);
            }

            if let Some(best) = found.first() {
                entry = best.id;
            }
        }

        if level > self.level_max {
            self.entry_point = Some(id);
            self.level_max = level;
        }

        Ok(id)
    }

    /// Soft-delete a node. Unknown or already deleted ids are ignored.
    pub fn delete(&mut self, id: usize) {
        if let Some(node) = self.nodes.get_mut(id) {
            if !node.deleted {
                node.deleted = true;
                self.live -= 1;
            }
        }
    }

    /// The `k` nearest live nodes to `query`, by ascending distance. Equal
    /// distances keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, SemgraphError> {
        if query.len() != self.dimension {
            return Err(SemgraphError::InvalidArgument(format!(
                "Query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            )));
        }
        let Some(mut entry) = self.entry_point else {
            return Ok(Vec::new());
        };
        if k == 0 || self.live == 0 {
            return Ok(Vec::new());
        }

        let query_mag = magnitude(query);
        for layer in (1..=self.level_max).rev() {
            if let Some(best) = self.search_layer(query, query_mag, entry, 1, layer).first() {
                entry = best.id;
            }
        }

        let ef = k.max(self.ef_construction);
        Ok(self
            .search_layer(query, query_mag, entry, ef, 0)
            .into_iter()
            .filter(|c| !self.nodes[c.id].deleted)
            .take(k)
            .map(|c| (c.id, c.distance))
            .collect())
    }

    /// Beam search on one layer. Returns up to `ef` candidates sorted by
    /// ascending distance.
    fn search_layer(
        &self,
        query: &[f32],
        query_mag: f32,
        entry: usize,
        ef: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        let mut visited: HashSet<usize> = HashSet::new();
        // Closest-first frontier.
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        // Farthest-first result set, capped at `ef`.
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();

        let start = Candidate {
            distance: self.distance_to(entry, query, query_mag),
            id: entry,
        };
        visited.insert(entry);
        frontier.push(Reverse(start));
        results.push(start);

        while let Some(Reverse(current)) = frontier.pop() {
            if let Some(worst) = results.peek() {
                if current.distance > worst.distance && results.len() >= ef {
                    break;
                }
            }

            let Some(neighbors) = self.nodes[current.id].neighbors.get(layer) else {
                continue;
            };
            for &next in neighbors {
                if !visited.insert(next) {
                    continue;
                }
                let candidate = Candidate {
                    distance: self.distance_to(next, query, query_mag),
                    id: next,
                };
                let admit = results.len() < ef
                    || results.peek().map_or(true, |worst| candidate < *worst);
                if admit {
                    frontier.push(Reverse(candidate));
                    results.push(candidate);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    fn connect(&mut self, from: usize, to: usize, layer: usize) {
        let node = &mut self.nodes[from];
        while node.neighbors.len() <= layer {
            node.neighbors.push(Vec::new());
        }
        if node.neighbors[layer].contains(&to) {
            return;
        }
        node.neighbors[layer].push(to);

        let target = &mut self.nodes[to];
        if target.in_degree.len() <= layer {
            target.in_degree.resize(layer + 1, 0);
        }
        target.in_degree[layer] += 1;
    }

    fn disconnect(&mut self, from: usize, to: usize, layer: usize) {
        let Some(list) = self.nodes[from].neighbors.get_mut(layer) else {
            return;
        };
        let before = list.len();
        list.retain(|&n| n != to);
        if list.len() < before {
            if let Some(count) = self.nodes[to].in_degree.get_mut(layer) {
                *count = count.saturating_sub(1);
            }
        }
    }

    fn in_degree(&self, id: usize, layer: usize) -> usize {
        self.nodes[id].in_degree.get(layer).copied().unwrap_or(0)
    }

    /// Order `candidates` (ascending distance to the base node) for linking.
    ///
    /// A candidate is diverse when it is closer to the base than to every
    /// diverse candidate picked before it. Diverse candidates come first, up
    /// to `limit` of them, followed by the rest in distance order.
    fn rank_neighbors(&self, candidates: &[Candidate], limit: usize) -> Vec<Candidate> {
        let mut diverse: Vec<Candidate> = Vec::with_capacity(limit);
        let mut rest: Vec<Candidate> = Vec::new();

        for &candidate in candidates {
            if diverse.len() >= limit {
                rest.push(candidate);
                continue;
            }
            let node = &self.nodes[candidate.id];
            let shadowed = diverse.iter().any(|picked| {
                self.distance_to(picked.id, &node.vector, node.magnitude) <= candidate.distance
            });
            if shadowed {
                rest.push(candidate);
            } else {
                diverse.push(candidate);
            }
        }

        diverse.extend(rest);
        diverse
    }

    /// Cut the neighbor list of `id` on `layer` down to `limit` links.
    ///
    /// A neighbor whose only incoming link comes from `id` is kept, trading
    /// places with the lowest ranked kept neighbor that has another way in.
    /// If there is none the list stays over `limit`.
    fn prune(&mut self, id: usize, layer: usize, limit: usize) {
        if self.nodes[id].neighbors[layer].len() <= limit {
            return;
        }
        let base = self.nodes[id].vector.clone();
        let base_mag = self.nodes[id].magnitude;

        let mut scored: Vec<Candidate> = self.nodes[id].neighbors[layer]
            .iter()
            .map(|&n| Candidate {
                distance: self.distance_to(n, &base, base_mag),
                id: n,
            })
            .collect();
        scored.sort();

        let mut keep = self.rank_neighbors(&scored, limit);
        let dropped = keep.split_off(limit);

        for candidate in dropped {
            if self.in_degree(candidate.id, layer) > 1 {
                self.disconnect(id, candidate.id, layer);
                continue;
            }
            let evict = keep.iter().rposition(|k| self.in_degree(k.id, layer) > 1);
            if let Some(pos) = evict {
                let evicted = keep.remove(pos);
                self.disconnect(id, evicted.id, layer);
            }
            keep.push(candidate);
        }
    }

    fn distance_to(&self, id: usize, query: &[f32], query_mag: f32) -> f32 {
        let node = &self.nodes[id];
        distance(self.metric, &node.vector, node.magnitude, query, query_mag)
    }

    /// Exponentially distributed level from a deterministic LCG.
    fn select_level(&mut self) -> usize {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        let r = ((self.rng_state >> 33) as f64 / (u32::MAX as f64)).max(1e-9);
        let level = (-r.ln() * self.level_mult).floor() as usize;
        level.min(MAX_LEVEL)
    }
}

pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Distance under `metric`; lower is closer.
///
/// Cosine distance is `1 - cos`, with zero-magnitude vectors at distance 1.
/// L2 is the squared euclidean distance.
pub fn distance(metric: Metric, a: &[f32], mag_a: f32, b: &[f32], mag_b: f32) -> f32 {
    match metric {
        Metric::Cosine => {
            if mag_a == 0.0 || mag_b == 0.0 {
                return 1.0;
            }
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            1.0 - dot / (mag_a * mag_b)
        }
        Metric::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
    }
}
