//! C10 index manager: fans ingest/removal out across the full C3 index
//! stack (label, property, text, vector) and owns the C4 resolver config,
//! C5 clustering config, and C8 temporal tracker, the way the teacher's
//! `HyperIndex` fanned inserts out across its vector index and graph index
//! plus an alias map.

use crate::index::{DistanceMetric, LabelIndex, PropertyIndex, ScoredId, TextIndex, TextQueryMode, VectorIndex, VectorIndexConfig, VectorIndexError};
use alayasiki_core::config::{ClusteringSection, ResolutionConfig};
use alayasiki_core::model::{Node, PropertyValue};
use std::collections::HashSet;

pub struct IndexManager {
    pub labels: LabelIndex,
    pub properties: PropertyIndex,
    pub text: TextIndex,
    pub vectors: VectorIndex,
    pub resolution: ResolutionConfig,
}

impl IndexManager {
    pub fn new(vector_config: VectorIndexConfig, resolution: ResolutionConfig) -> Self {
        Self {
            labels: LabelIndex::new(),
            properties: PropertyIndex::new(),
            text: TextIndex::new(),
            vectors: VectorIndex::new(vector_config),
            resolution,
        }
    }

    /// Indexes a node's type label, properties, name text, and embedding.
    pub fn index_node(&mut self, node: &Node) -> Result<(), VectorIndexError> {
        self.labels.insert(&node.id, &node.node_type);
        for (key, value) in &node.properties {
            self.properties.insert(&node.id, key, value.clone());
        }
        if let Some(name) = node.name() {
            self.text.insert(&node.id, name);
        }
        if let Some(embedding) = &node.embedding {
            self.vectors.insert(&node.id, embedding.clone())?;
        }
        Ok(())
    }

    pub fn remove_node(&mut self, id: &str) {
        self.labels.remove(id);
        self.properties.remove(id);
        self.text.remove(id);
        self.vectors.remove(id);
    }

    pub fn query_by_type(&self, node_type: &str) -> HashSet<String> {
        self.labels.query(node_type)
    }

    pub fn query_property(&self, property: &str, op: crate::index::PropertyOp, target: &PropertyValue) -> HashSet<String> {
        self.properties.query(property, op, target)
    }

    pub fn query_text(&self, query: &str, mode: TextQueryMode) -> (HashSet<String>, bool) {
        self.text.query(query, mode)
    }

    pub fn query_vector(&self, embedding: &[f32], metric: DistanceMetric, limit: usize, threshold: f32) -> Vec<ScoredId> {
        self.vectors.search(embedding, metric, limit, threshold)
    }

    /// Resolves `target` against a same-type candidate pool.
    pub fn resolve_entity<'a>(&self, target: &Node, candidates: impl Iterator<Item = &'a Node>) -> Vec<crate::resolver::ResolutionScore> {
        crate::resolver::resolve(target, candidates, &self.resolution)
    }

    pub fn cluster(&self, members: &[crate::clustering::ClusterMember<'_>], section: &ClusteringSection, now: i64) -> Vec<alayasiki_core::model::Cluster> {
        let config = crate::clustering::ClusteringConfig {
            max_clusters: section.max_clusters,
            min_cluster_size: section.min_cluster_size,
            max_iterations: section.max_iterations,
            convergence_epsilon: section.convergence_epsilon,
            similarity_threshold: section.similarity_threshold,
        };
        if section.use_threshold {
            crate::clustering::threshold_cluster(members, &config, now)
        } else {
            crate::clustering::kmeans(members, members.len().min(section.max_clusters), &config, now)
        }
    }
}
