//! Vector index: fixed-dimension embeddings, linear scan below
//! `ann_min_elements`, an HNSW-style greedy graph above it.

use alayasiki_core::error::{AlayasikiError, ErrorCode};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorIndexError {
    #[error("embedding dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl AlayasikiError for VectorIndexError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::DimensionMismatch
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    Dot,
}

fn similarity(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => cosine_similarity(a, b),
        DistanceMetric::Euclidean => {
            let d: f32 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt();
            1.0 / (1.0 + d)
        }
        DistanceMetric::Dot => {
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            ((dot + 1.0) / 2.0).clamp(0.0, 1.0)
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    pub ann_min_elements: usize,
    pub max_connections: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            ann_min_elements: 100,
            max_connections: 16,
            ef_construction: 200,
            ef_search: 50,
        }
    }
}

/// A single candidate result: id and similarity under the query's metric.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    pub id: String,
    pub score: f32,
}

pub struct VectorIndex {
    config: VectorIndexConfig,
    dimension: Option<usize>,
    vectors: HashMap<String, Vec<f32>>,
    insertion_order: Vec<String>,
    insertion_rank: HashMap<String, usize>,
    /// HNSW-style single-layer adjacency, maintained incrementally.
    adjacency: HashMap<String, Vec<String>>,
    entry_point: Option<String>,
}

impl VectorIndex {
    pub fn new(config: VectorIndexConfig) -> Self {
        Self {
            config,
            dimension: None,
            vectors: HashMap::new(),
            insertion_order: Vec::new(),
            insertion_rank: HashMap::new(),
            adjacency: HashMap::new(),
            entry_point: None,
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn insert(&mut self, id: &str, embedding: Vec<f32>) -> Result<(), VectorIndexError> {
        match self.dimension {
            None => self.dimension = Some(embedding.len()),
            Some(dim) if dim != embedding.len() => {
                return Err(VectorIndexError::DimensionMismatch {
                    expected: dim,
                    actual: embedding.len(),
                })
            }
            Some(_) => {}
        }

        let is_update = self.vectors.contains_key(id);
        if !is_update {
            self.insertion_rank.insert(id.to_string(), self.insertion_order.len());
            self.insertion_order.push(id.to_string());
        }

        if self.entry_point.is_none() {
            self.entry_point = Some(id.to_string());
            self.adjacency.entry(id.to_string()).or_default();
            self.vectors.insert(id.to_string(), embedding);
            return Ok(());
        }

        // Greedy best-first search from the entry point, beam = ef_construction.
        let candidates = self.search_candidates(&embedding, self.config.ef_construction, Some(id));
        self.vectors.insert(id.to_string(), embedding);

        let neighbors: Vec<String> = candidates
            .into_iter()
            .take(self.config.max_connections)
            .map(|c| c.id)
            .collect();

        self.adjacency.entry(id.to_string()).or_default().extend(neighbors.clone());
        for neighbor in &neighbors {
            let list = self.adjacency.entry(neighbor.clone()).or_default();
            if !list.contains(&id.to_string()) {
                list.push(id.to_string());
            }
        }
        for neighbor in neighbors {
            self.prune(&neighbor);
        }
        Ok(())
    }

    /// Keeps only the `max_connections` most similar edges for `id`.
    fn prune(&mut self, id: &str) {
        let Some(vector) = self.vectors.get(id).cloned() else { return };
        let Some(list) = self.adjacency.get(id).cloned() else { return };
        if list.len() <= self.config.max_connections {
            return;
        }
        let mut scored: Vec<(String, f32)> = list
            .into_iter()
            .filter_map(|n| self.vectors.get(&n).map(|v| (n, cosine_similarity(&vector, v))))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.config.max_connections);
        self.adjacency.insert(id.to_string(), scored.into_iter().map(|(n, _)| n).collect());
    }

    pub fn remove(&mut self, id: &str) {
        self.vectors.remove(id);
        self.insertion_rank.remove(id);
        self.insertion_order.retain(|i| i != id);
        if let Some(neighbors) = self.adjacency.remove(id) {
            for neighbor in neighbors {
                if let Some(list) = self.adjacency.get_mut(&neighbor) {
                    list.retain(|n| n != id);
                }
            }
        }
        if self.entry_point.as_deref() == Some(id) {
            self.entry_point = self.insertion_order.first().cloned();
        }
    }

    fn search_candidates(&self, query: &[f32], ef: usize, exclude: Option<&str>) -> Vec<ScoredId> {
        let Some(entry) = self.entry_point.clone() else {
            return Vec::new();
        };
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(entry.clone());
        let mut frontier = vec![entry.clone()];
        let mut best: Vec<(String, f32)> = Vec::new();

        if let Some(vector) = self.vectors.get(&entry) {
            if Some(entry.as_str()) != exclude {
                best.push((entry.clone(), cosine_similarity(query, vector)));
            }
        }

        while let Some(current) = frontier.pop() {
            let Some(neighbors) = self.adjacency.get(&current) else { continue };
            for neighbor in neighbors {
                if !visited.insert(neighbor.clone()) {
                    continue;
                }
                if Some(neighbor.as_str()) == exclude {
                    continue;
                }
                if let Some(vector) = self.vectors.get(neighbor) {
                    let score = cosine_similarity(query, vector);
                    best.push((neighbor.clone(), score));
                    frontier.push(neighbor.clone());
                }
            }
            if best.len() >= ef * 4 {
                break;
            }
        }

        best.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let rank_a = self.insertion_rank.get(&a.0).copied().unwrap_or(usize::MAX);
                    let rank_b = self.insertion_rank.get(&b.0).copied().unwrap_or(usize::MAX);
                    rank_a.cmp(&rank_b)
                })
        });
        best.truncate(ef.max(1));
        best.into_iter().map(|(id, score)| ScoredId { id, score }).collect()
    }

    /// Returns up to `limit` results with similarity `>= threshold`, using
    /// linear scan below `ann_min_elements`, the HNSW graph otherwise.
    pub fn search(
        &self,
        query: &[f32],
        metric: DistanceMetric,
        limit: usize,
        threshold: f32,
    ) -> Vec<ScoredId> {
        if self.vectors.len() < self.config.ann_min_elements {
            let mut scored: Vec<(String, f32)> = self
                .vectors
                .iter()
                .map(|(id, v)| (id.clone(), similarity(metric, query, v)))
                .collect();
            scored.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        let rank_a = self.insertion_rank.get(&a.0).copied().unwrap_or(usize::MAX);
                        let rank_b = self.insertion_rank.get(&b.0).copied().unwrap_or(usize::MAX);
                        rank_a.cmp(&rank_b)
                    })
            });
            return scored
                .into_iter()
                .filter(|(_, score)| *score >= threshold)
                .take(limit)
                .map(|(id, score)| ScoredId { id, score })
                .collect();
        }

        let candidates = self.search_candidates(query, self.config.ef_search, None);
        candidates
            .into_iter()
            .map(|c| ScoredId {
                score: if metric == DistanceMetric::Cosine { c.score } else { similarity(metric, query, &self.vectors[&c.id]) },
                id: c.id,
            })
            .filter(|c| c.score >= threshold)
            .take(limit)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_established_on_first_insert_s4() {
        let mut index = VectorIndex::new(VectorIndexConfig::default());
        index.insert("a", vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        let err = index.insert("b", vec![0.1, 0.2, 0.3]).unwrap_err();
        assert!(matches!(err, VectorIndexError::DimensionMismatch { .. }));
        assert!(index.search(&[0.1, 0.2, 0.3, 0.4], DistanceMetric::Cosine, 5, 0.0).iter().any(|r| r.id == "a"));
    }

    #[test]
    fn linear_mode_below_threshold_respects_limit_and_threshold() {
        let mut index = VectorIndex::new(VectorIndexConfig {
            ann_min_elements: 100,
            ..Default::default()
        });
        index.insert("a", vec![1.0, 0.0]).unwrap();
        index.insert("b", vec![0.0, 1.0]).unwrap();
        index.insert("c", vec![0.9, 0.1]).unwrap();

        let results = index.search(&[1.0, 0.0], DistanceMetric::Cosine, 1, 0.5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[test]
    fn hnsw_mode_above_threshold_returns_bounded_results() {
        let mut index = VectorIndex::new(VectorIndexConfig {
            ann_min_elements: 5,
            max_connections: 4,
            ef_construction: 10,
            ef_search: 3,
        });
        for i in 0..20 {
            let angle = i as f32 * 0.1;
            index.insert(&format!("n{i}"), vec![angle.cos(), angle.sin()]).unwrap();
        }
        let results = index.search(&[1.0, 0.0], DistanceMetric::Cosine, 3, 0.0);
        assert!(results.len() <= 3);
        for r in &results {
            assert!(r.score >= 0.0);
        }
    }

    #[test]
    fn remove_reassigns_entry_point() {
        let mut index = VectorIndex::new(VectorIndexConfig::default());
        index.insert("a", vec![1.0, 0.0]).unwrap();
        index.insert("b", vec![0.0, 1.0]).unwrap();
        index.remove("a");
        assert!(!index.search(&[0.0, 1.0], DistanceMetric::Cosine, 5, 0.0).is_empty());
    }
}
