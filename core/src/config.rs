use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GraphConfig {
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
    #[serde(default = "default_max_edges_per_node")]
    pub max_edges_per_node: usize,
    #[serde(default = "default_resolution_threshold")]
    pub entity_resolution_threshold: f32,
    #[serde(default = "default_true")]
    pub enable_temporal: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_nodes: default_max_nodes(),
            max_edges_per_node: default_max_edges_per_node(),
            entity_resolution_threshold: default_resolution_threshold(),
            enable_temporal: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_entity_confidence")]
    pub entity_confidence_threshold: f32,
    #[serde(default = "default_relationship_confidence")]
    pub relationship_confidence_threshold: f32,
    #[serde(default = "default_max_entities_per_text")]
    pub max_entities_per_text: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            entity_confidence_threshold: default_entity_confidence(),
            relationship_confidence_threshold: default_relationship_confidence(),
            max_entities_per_text: default_max_entities_per_text(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResolutionWeights {
    #[serde(default = "default_weight_exact")]
    pub exact: f32,
    #[serde(default = "default_weight_fuzzy")]
    pub fuzzy: f32,
    #[serde(default = "default_weight_embedding")]
    pub embedding: f32,
}

impl Default for ResolutionWeights {
    fn default() -> Self {
        Self {
            exact: default_weight_exact(),
            fuzzy: default_weight_fuzzy(),
            embedding: default_weight_embedding(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResolutionConfig {
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f32,
    #[serde(default = "default_true")]
    pub enable_phonetic: bool,
    #[serde(default = "default_true")]
    pub enable_jaccard: bool,
    #[serde(default)]
    pub weights: ResolutionWeights,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_fuzzy_threshold(),
            enable_phonetic: true,
            enable_jaccard: true,
            weights: ResolutionWeights::default(),
            max_candidates: default_max_candidates(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvictionStrategy {
    Lru,
    Lfu,
    Temporal,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MemoryConfig {
    #[serde(default = "default_max_memory_nodes")]
    pub max_memory_nodes: usize,
    #[serde(default = "default_eviction_strategy")]
    pub eviction_strategy: EvictionStrategy,
    #[serde(default = "default_true")]
    pub persistence_enabled: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_memory_nodes: default_max_memory_nodes(),
            eviction_strategy: default_eviction_strategy(),
            persistence_enabled: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClusteringSection {
    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,
    #[serde(default = "default_cluster_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_convergence_epsilon")]
    pub convergence_epsilon: f32,
    #[serde(default = "default_cluster_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default)]
    pub use_threshold: bool,
}

impl Default for ClusteringSection {
    fn default() -> Self {
        Self {
            max_clusters: default_max_clusters(),
            min_cluster_size: default_min_cluster_size(),
            max_iterations: default_cluster_max_iterations(),
            convergence_epsilon: default_convergence_epsilon(),
            similarity_threshold: default_cluster_similarity_threshold(),
            use_threshold: false,
        }
    }
}

fn default_max_clusters() -> usize {
    10
}

fn default_min_cluster_size() -> usize {
    2
}

fn default_cluster_max_iterations() -> usize {
    50
}

fn default_convergence_epsilon() -> f32 {
    0.001
}

fn default_cluster_similarity_threshold() -> f32 {
    0.8
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_cooccurrence_window")]
    pub cooccurrence_window: usize,
    #[serde(default = "default_length_weight")]
    pub length_weight: f32,
    #[serde(default = "default_punctuation_weight")]
    pub punctuation_weight: f32,
    #[serde(default = "default_whitespace_weight")]
    pub whitespace_weight: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: default_min_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            cooccurrence_window: default_cooccurrence_window(),
            length_weight: default_length_weight(),
            punctuation_weight: default_punctuation_weight(),
            whitespace_weight: default_whitespace_weight(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LinkingConfig {
    #[serde(default = "default_min_link_confidence")]
    pub min_link_confidence: f32,
    #[serde(default = "default_max_links_per_entity")]
    pub max_links_per_entity: usize,
    #[serde(default = "default_semantic_grounding_threshold")]
    pub semantic_grounding_threshold: f32,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            min_link_confidence: default_min_link_confidence(),
            max_links_per_entity: default_max_links_per_entity(),
            semantic_grounding_threshold: default_semantic_grounding_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DualGraphConfig {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub linking: LinkingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompressionAlgorithm {
    Gzip,
    Brotli,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub compression_enabled: bool,
    #[serde(default = "default_compression_algorithm")]
    pub compression_algorithm: CompressionAlgorithm,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_max_items_per_file")]
    pub max_items_per_file: usize,
    #[serde(default = "default_true")]
    pub enable_backups: bool,
    #[serde(default = "default_backup_retention_days")]
    pub backup_retention_days: u32,
    #[serde(default = "default_true")]
    pub enable_wal: bool,
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
    #[serde(default = "default_sync_interval_ms")]
    pub wal_flush_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            compression_enabled: false,
            compression_algorithm: default_compression_algorithm(),
            max_file_size: default_max_file_size(),
            max_items_per_file: default_max_items_per_file(),
            enable_backups: true,
            backup_retention_days: default_backup_retention_days(),
            enable_wal: true,
            sync_interval_ms: default_sync_interval_ms(),
            wal_flush_interval_ms: default_sync_interval_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub clustering: ClusteringSection,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub dual_graph: DualGraphConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl EngineConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(Environment::with_prefix("ALAYASIKI").separator("__"));

        builder.build()?.try_deserialize()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(Environment::with_prefix("ALAYASIKI"));

        builder.build()?.try_deserialize()
    }
}

fn default_true() -> bool {
    true
}
fn default_max_nodes() -> usize {
    1_000_000
}
fn default_max_edges_per_node() -> usize {
    10_000
}
fn default_resolution_threshold() -> f32 {
    0.85
}
fn default_entity_confidence() -> f32 {
    0.5
}
fn default_relationship_confidence() -> f32 {
    0.5
}
fn default_max_entities_per_text() -> usize {
    200
}
fn default_weight_exact() -> f32 {
    1.0
}
fn default_weight_fuzzy() -> f32 {
    0.5
}
fn default_weight_embedding() -> f32 {
    0.3
}
fn default_fuzzy_threshold() -> f32 {
    0.8
}
fn default_max_candidates() -> usize {
    50
}
fn default_max_memory_nodes() -> usize {
    100_000
}
fn default_eviction_strategy() -> EvictionStrategy {
    EvictionStrategy::Lru
}
fn default_min_chunk_size() -> usize {
    20
}
fn default_max_chunk_size() -> usize {
    1_000
}
fn default_cooccurrence_window() -> usize {
    5
}
fn default_length_weight() -> f32 {
    0.5
}
fn default_punctuation_weight() -> f32 {
    0.3
}
fn default_whitespace_weight() -> f32 {
    0.2
}
fn default_min_link_confidence() -> f32 {
    0.75
}
fn default_max_links_per_entity() -> usize {
    100
}
fn default_semantic_grounding_threshold() -> f32 {
    0.8
}
fn default_data_dir() -> String {
    "data".to_string()
}
fn default_compression_algorithm() -> CompressionAlgorithm {
    CompressionAlgorithm::Gzip
}
fn default_max_file_size() -> u64 {
    64 * 1024 * 1024
}
fn default_max_items_per_file() -> usize {
    50_000
}
fn default_backup_retention_days() -> u32 {
    30
}
fn default_sync_interval_ms() -> u64 {
    1_000
}
