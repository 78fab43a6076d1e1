//! The facade spec section 6 describes: a single `Engine` composing
//! `ingestion::processor::IngestionPipeline`, `query::engine::QueryEngine`,
//! and a background `jobs::worker::Worker` fed by the pipeline's job queue,
//! the way `ingestion/tests/e2e_pipeline_test.rs` wires the three together
//! in a test, lifted into production code.

use crate::context::MemoryContext;
use crate::error::EngineError;
use alayasiki_core::auth::{Authorizer, Principal, ResourceContext};
use alayasiki_core::config::EngineConfig;
use alayasiki_core::ingest::IngestionRequest;
use alayasiki_core::metrics::{EngineMetrics, MetricsCollector, MetricsSnapshot};
use alayasiki_core::model::{Cluster, CrossLinkType, Edge, InvalidationReason, Node};
use async_trait::async_trait;
use ingestion::embedding::DeterministicEmbedder;
use ingestion::processor::IngestionPipeline;
use jobs::queue::{ChannelJobQueue, Job, JobQueue};
use jobs::worker::Worker;
use query::dsl::QueryRequest;
use query::engine::{QueryEngine, QueryResponse};
use query::semantic_cache::SemanticCacheConfig;
use slm::lightweight::{register_default_lightweight_models, TRIPLEX_LITE_MODEL};
use slm::registry::ModelRegistry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storage::cross_link::CrossLinkStore;
use storage::crypto::AtRestCipher;
use storage::traversal::{bfs, TraversalConfig, TraversalDirection};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

const JOB_QUEUE_CAPACITY: usize = 1024;
const METRICS_HISTORY: usize = 256;
/// Bytes a node/edge's in-memory footprint is estimated at for
/// `get_metrics`'s `estimated_memory_bytes` — a rough constant, not a
/// measurement, since nothing in `storage` tracks actual allocation size.
const BYTES_PER_NODE: u64 = 256;
const BYTES_PER_EDGE: u64 = 160;

/// Caller-supplied knobs for a single `add_memory` call.
#[derive(Debug, Clone, Default)]
pub struct AddMemoryOptions {
    pub idempotency_key: Option<String>,
    pub model_id: Option<String>,
    /// How long to wait for the background extraction job to land before
    /// reading entities/relationships back out. `None` uses the engine's
    /// configured default (see `Engine::new`).
    pub wait_for_extraction_ms: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct AddMemoryMetadata {
    pub chunk_ids: Vec<String>,
    pub model_id: String,
}

/// The lexical/domain/cross-graph elements a single `add_memory` call
/// touched, split out from the flat `entities`/`relationships` view so a
/// caller can see which side of the dual graph produced what.
#[derive(Debug, Clone, Default)]
pub struct DualGraphResult {
    pub lexical_chunk_ids: Vec<String>,
    pub domain_entity_ids: Vec<String>,
    pub cross_link_ids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AddMemoryResult {
    pub entities: Vec<Node>,
    pub relationships: Vec<Edge>,
    pub metadata: AddMemoryMetadata,
    pub dual_graph_result: DualGraphResult,
}

#[derive(Debug, Clone, Default)]
pub struct SubgraphResult {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub paths: Vec<Vec<String>>,
}

/// Selects the `out_edges` of every graph node whose type matches one of
/// `relation_types` (all types, if empty) and whose validity window covers
/// `as_of` (current state, if `as_of` is `None`).
#[derive(Debug, Clone, Default)]
pub struct TemporalRelationshipQuery {
    pub relation_types: Vec<String>,
    pub as_of: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Metrics {
    pub graph: EngineMetrics,
    pub query: MetricsSnapshot,
}

/// Wraps `ChannelJobQueue` to keep a running count of jobs handed to the
/// background worker, the only backlog signal `get_metrics`'s
/// `pending_changes` has available (job *completion* isn't tracked back to
/// this counter, so it's a floor on the backlog, not an exact depth).
struct CountingJobQueue {
    inner: ChannelJobQueue,
    pending: Arc<AtomicU64>,
}

#[async_trait]
impl JobQueue for CountingJobQueue {
    async fn enqueue(&self, job: Job) -> anyhow::Result<()> {
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.inner.enqueue(job).await
    }
}

/// The dual-graph knowledge memory engine. Owns the ingestion pipeline, the
/// unified query engine, and the background extraction/clustering/expiry
/// worker, and exposes the operation list spec section 6 calls out.
pub struct Engine {
    pipeline: IngestionPipeline,
    query: QueryEngine,
    config: EngineConfig,
    cancellation: CancellationToken,
    pending_jobs: Arc<AtomicU64>,
    query_metrics: Arc<MetricsCollector>,
    last_clusters: Arc<RwLock<Vec<Cluster>>>,
    extraction_settle: Duration,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let mut pipeline = IngestionPipeline::new(config.clone());

        let (tx, rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let pending_jobs = Arc::new(AtomicU64::new(0));
        let queue = CountingJobQueue {
            inner: ChannelJobQueue::new(tx),
            pending: pending_jobs.clone(),
        };
        pipeline.set_job_queue(Arc::new(queue));

        let mut registry = ModelRegistry::new();
        register_default_lightweight_models(&mut registry).expect("default extractor registration must succeed");
        let cancellation = CancellationToken::new();
        let worker = Worker::with_registry(
            rx,
            pipeline.graph(),
            pipeline.index(),
            pipeline.temporal(),
            pipeline.cross_links(),
            pipeline.memory(),
            pipeline.persistence(),
            Arc::new(registry),
            TRIPLEX_LITE_MODEL,
            cancellation.clone(),
        );
        tokio::spawn(worker.run());

        let mut query = QueryEngine::new(
            pipeline.graph(),
            pipeline.lexical(),
            pipeline.cross_links(),
            pipeline.index(),
            pipeline.temporal(),
            pipeline.memory(),
            config.resolution.clone(),
            config.clustering.clone(),
            Arc::new(DeterministicEmbedder::default()),
            "embedding-default-v1",
        );
        query.set_cache(SemanticCacheConfig::default());

        Self {
            pipeline,
            query,
            config,
            cancellation,
            pending_jobs,
            query_metrics: Arc::new(MetricsCollector::new(METRICS_HISTORY)),
            last_clusters: Arc::new(RwLock::new(Vec::new())),
            extraction_settle: Duration::from_millis(250),
        }
    }

    /// Stops the background worker. Queued-but-unprocessed jobs are
    /// dropped; in-flight extraction is allowed to finish.
    pub fn shutdown(&self) {
        self.cancellation.cancel();
    }

    /// Ingests `content` plus its caller context into the lexical graph,
    /// waits briefly for the background worker to finish entity extraction
    /// and cross-graph linking, then reads back what landed.
    pub async fn add_memory(
        &self,
        content: String,
        context: MemoryContext,
        options: AddMemoryOptions,
    ) -> Result<AddMemoryResult, EngineError> {
        let (request, model_id) = Self::build_ingestion_request(content, &context, &options);
        let chunk_ids = self.pipeline.ingest(request).await?;
        self.settle_then_gather(chunk_ids, model_id, options.wait_for_extraction_ms).await
    }

    /// `add_memory`, but authorized: the caller must hold `Action::Ingest`
    /// against `resource`, the same check `IngestionPipeline::ingest_authorized`
    /// enforces for direct pipeline callers.
    pub async fn add_memory_authorized(
        &self,
        content: String,
        context: MemoryContext,
        options: AddMemoryOptions,
        principal: &Principal,
        authorizer: &Authorizer,
        resource: &ResourceContext,
    ) -> Result<AddMemoryResult, EngineError> {
        let (request, model_id) = Self::build_ingestion_request(content, &context, &options);
        let chunk_ids = self
            .pipeline
            .ingest_authorized(request, principal, authorizer, resource)
            .await?;
        self.settle_then_gather(chunk_ids, model_id, options.wait_for_extraction_ms).await
    }

    fn build_ingestion_request(content: String, context: &MemoryContext, options: &AddMemoryOptions) -> (IngestionRequest, String) {
        let mut metadata = context.as_tags();
        for entity in &context.relevant_entities {
            metadata.insert(format!("hint_entity:{entity}"), "true".to_string());
        }

        let request = IngestionRequest::Text {
            content,
            metadata,
            idempotency_key: options.idempotency_key.clone(),
            model_id: options.model_id.clone(),
        };
        let model_id = options.model_id.clone().unwrap_or_else(|| "embedding-default-v1".to_string());
        (request, model_id)
    }

    async fn settle_then_gather(
        &self,
        chunk_ids: Vec<String>,
        model_id: String,
        wait_for_extraction_ms: Option<u64>,
    ) -> Result<AddMemoryResult, EngineError> {
        let settle = wait_for_extraction_ms.map(Duration::from_millis).unwrap_or(self.extraction_settle);
        if settle > Duration::ZERO {
            tokio::time::sleep(settle).await;
        }
        self.gather_add_memory_result(chunk_ids, model_id).await
    }

    async fn gather_add_memory_result(&self, chunk_ids: Vec<String>, model_id: String) -> Result<AddMemoryResult, EngineError> {
        let mut entity_ids: Vec<String> = Vec::new();
        let mut link_ids: Vec<String> = Vec::new();
        {
            let cross_links = self.pipeline.cross_links().read().await;
            for chunk_id in &chunk_ids {
                for link in cross_links.links_from(chunk_id) {
                    if link.link_type != CrossLinkType::EntityMention {
                        continue;
                    }
                    link_ids.push(link.id.clone());
                    if !entity_ids.contains(&link.target_id) {
                        entity_ids.push(link.target_id.clone());
                    }
                }
            }
        }
        let graph = self.pipeline.graph().read().await;

        let entities: Vec<Node> = entity_ids.iter().filter_map(|id| graph.get_node(id)).collect();
        let entity_id_set: std::collections::HashSet<&str> = entity_ids.iter().map(String::as_str).collect();
        let mut relationships: Vec<Edge> = Vec::new();
        for id in &entity_ids {
            for edge in graph.out_edges(id) {
                if entity_id_set.contains(edge.target.as_str()) {
                    relationships.push(edge);
                }
            }
        }

        Ok(AddMemoryResult {
            entities,
            relationships,
            metadata: AddMemoryMetadata { chunk_ids: chunk_ids.clone(), model_id },
            dual_graph_result: DualGraphResult {
                lexical_chunk_ids: chunk_ids,
                domain_entity_ids: entity_ids,
                cross_link_ids: link_ids,
            },
        })
    }

    /// Runs a unified lexical/domain/cross-graph query. `context`'s
    /// `relevant_entities` hint is folded into `request.domain.entity_name`
    /// when the caller didn't already set one, biasing the domain sub-query
    /// toward entities the caller already believes are relevant.
    pub async fn query_memory(&self, mut request: QueryRequest, context: MemoryContext) -> Result<QueryResponse, EngineError> {
        Self::apply_context_hint(&mut request, &context);
        let snapshot_id = self.pipeline.snapshot_id();
        let start = std::time::Instant::now();
        let result = self.query.execute_cached(&request, &snapshot_id).await;
        self.query_metrics.record_query(start.elapsed().as_micros() as u64, false);
        Ok(result?)
    }

    /// `query_memory`, but authorized: the caller must hold `Action::Query`
    /// against `resource`, the same check `QueryEngine::execute_authorized`
    /// enforces for direct query-engine callers.
    pub async fn query_memory_authorized(
        &self,
        mut request: QueryRequest,
        context: MemoryContext,
        principal: &Principal,
        authorizer: &Authorizer,
        resource: &ResourceContext,
    ) -> Result<QueryResponse, EngineError> {
        Self::apply_context_hint(&mut request, &context);
        let snapshot_id = self.pipeline.snapshot_id();
        let start = std::time::Instant::now();
        let result = self
            .query
            .execute_authorized(&request, principal, authorizer, resource, &snapshot_id)
            .await;
        self.query_metrics.record_query(start.elapsed().as_micros() as u64, false);
        Ok(result?)
    }

    fn apply_context_hint(request: &mut QueryRequest, context: &MemoryContext) {
        if request.domain.entity_name.is_none() {
            request.domain.entity_name = context.relevant_entities.first().cloned();
        }
    }

    /// Rebuilds clusters over every embedded node of `node_type` (every
    /// embedded node, if `None`), caching the result for `find_related_clusters`
    /// to rank against — `storage::index_manager::IndexManager` doesn't persist
    /// clusters itself, so this mirrors `jobs::worker::Worker::process_clustering`'s
    /// own compute-then-log-count shape, just keeping the output around.
    pub async fn create_clusters(&self, node_type: Option<String>) -> Result<Vec<Cluster>, EngineError> {
        let now = now_unix_ms();
        let graph = self.pipeline.graph().read().await;
        let index = self.pipeline.index().read().await;

        let ids: Vec<String> = match &node_type {
            Some(t) => index.query_by_type(t).into_iter().collect(),
            None => graph.node_ids().cloned().collect(),
        };
        let nodes: Vec<Node> = ids.iter().filter_map(|id| graph.get_node(id)).collect();
        let members: Vec<storage::clustering::ClusterMember> = nodes
            .iter()
            .filter_map(|n| n.embedding.as_ref().map(|e| storage::clustering::ClusterMember { id: &n.id, node_type: &n.node_type, embedding: e }))
            .collect();

        let clusters = index.cluster(&members, &self.config.clustering, now);
        *self.last_clusters.write().await = clusters.clone();
        Ok(clusters)
    }

    /// Ranks the clusters from the most recent `create_clusters` call by
    /// cosine similarity between `query_embedding` and each cluster's
    /// centroid, returning at most `max_results`.
    pub async fn find_related_clusters(&self, query_embedding: &[f32], max_results: usize) -> Vec<Cluster> {
        let clusters = self.last_clusters.read().await;
        let mut scored: Vec<(f32, Cluster)> = clusters.iter().map(|c| (cosine(query_embedding, &c.centroid), c.clone())).collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(max_results).map(|(_, c)| c).collect()
    }

    /// Section 4.6 "contextual memories": chunks and entities that memory
    /// prioritization (access recency/frequency) and, when `entity_hint` is
    /// set, domain-name matching, surface as most relevant right now.
    pub async fn get_contextual_memories(&self, entity_hint: Option<String>, top_k: usize) -> Result<QueryResponse, EngineError> {
        use query::dsl::{DomainQuery, LexicalQuery, QueryOptions};

        let request = QueryRequest {
            lexical: LexicalQuery { text: entity_hint.clone(), ..Default::default() },
            domain: DomainQuery { entity_name: entity_hint, ..Default::default() },
            options: QueryOptions { prioritize_memory: true, top_k, ..Default::default() },
            ..Default::default()
        };
        self.query_memory(request, MemoryContext::new()).await
    }

    /// Breadth-first walk of the domain graph outward from `entity_id`,
    /// bounded by `max_depth` and `max_nodes`.
    pub async fn traverse_from_entity(&self, entity_id: &str, max_depth: usize, max_nodes: usize) -> SubgraphResult {
        let graph = self.pipeline.graph().read().await;
        let config = TraversalConfig {
            max_depth,
            max_nodes,
            direction: TraversalDirection::Both,
            ..Default::default()
        };
        let result = bfs(&graph, entity_id, &config);
        let nodes: Vec<Node> = result.visited.iter().filter_map(|id| graph.get_node(id)).collect();
        let paths: Vec<Vec<String>> = result.visited.iter().filter_map(|id| result.path_to(entity_id, id)).collect();
        SubgraphResult { nodes, edges: result.edges.clone(), paths }
    }

    /// Domain-graph relations matching `query`, each edge appearing once
    /// (via its source node's `out_edges`, never its target's `in_edges`).
    pub async fn query_temporal_relationships(&self, query: TemporalRelationshipQuery) -> Result<Vec<Edge>, EngineError> {
        let graph = self.pipeline.graph().read().await;
        let temporal = self.pipeline.temporal();
        let type_filter: std::collections::HashSet<&str> = query.relation_types.iter().map(String::as_str).collect();

        let mut matches = Vec::new();
        for id in graph.node_ids() {
            let edges = graph.out_edges(id);
            let valid = temporal.as_of(&edges, query.as_of);
            for edge in valid {
                if type_filter.is_empty() || type_filter.contains(edge.edge_type.as_str()) {
                    matches.push(edge.clone());
                }
            }
        }
        Ok(matches)
    }

    /// Closes an edge's validity window with `reason`, at `at` (now, if
    /// unset). Goes through `remove_edge`/`add_edge` rather than mutating in
    /// place, since re-adding an edge id that's already present still pushes
    /// a second adjacency-list entry (`GraphStore::add_edge` only skips the
    /// capacity check on a re-add, not the adjacency push).
    pub async fn invalidate_relationship(&self, edge_id: &str, reason: InvalidationReason, at: Option<i64>) -> Result<(), EngineError> {
        let mut graph = self.pipeline.graph().write().await;
        let Some(mut edge) = graph.remove_edge(edge_id) else {
            return Err(EngineError::RelationshipNotFound(edge_id.to_string()));
        };
        edge.invalidate(reason, at.unwrap_or_else(now_unix_ms));
        graph.add_edge(edge)?;
        Ok(())
    }

    /// Removes every edge whose validity window closed before `older_than`,
    /// mirroring `jobs::worker::Worker::process_expiry`. Returns the count
    /// removed.
    pub async fn cleanup_temporal_data(&self, older_than: i64) -> Result<usize, EngineError> {
        let mut graph = self.pipeline.graph().write().await;
        let temporal = self.pipeline.temporal();
        let ids: Vec<String> = graph.node_ids().cloned().collect();

        let mut removed = 0;
        for id in ids {
            let edges = graph.out_edges(&id);
            let expired: Vec<String> = temporal.expired_before(&edges, older_than).into_iter().map(str::to_string).collect();
            for edge_id in expired {
                if graph.remove_edge(&edge_id).is_some() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Evicts ids over the `memory.maxMemoryNodes` cap per the configured
    /// eviction policy, cascading removal through the graph store and index
    /// stack, mirroring `jobs::worker::Worker::process_eviction`. Returns the
    /// count evicted.
    pub async fn evict_memory_overflow(&self, now: i64, temporal_cutoff_age: i64) -> usize {
        let candidates = { self.pipeline.memory().read().await.eviction_candidates(now, temporal_cutoff_age) };
        if candidates.is_empty() {
            return 0;
        }

        let mut graph = self.pipeline.graph().write().await;
        let mut index = self.pipeline.index().write().await;
        let mut memory = self.pipeline.memory().write().await;
        for id in &candidates {
            graph.remove_node(id);
            index.remove_node(id);
            memory.forget(id);
        }
        candidates.len()
    }

    /// Opens the on-disk WAL/backup/shard directories under
    /// `config.storage.data_dir` and wires them into both the ingestion
    /// pipeline and the background worker, so `flush_shards` and
    /// `Job::FlushShards` runs have somewhere real to write, and a fresh
    /// `Engine` can recover prior state via
    /// `storage::persistence::PersistenceManager::recover_nodes`/
    /// `recover_edges` over that same directory.
    pub async fn enable_persistence(&self, cipher: Arc<dyn AtRestCipher>) -> Result<(), EngineError> {
        Ok(self.pipeline.open_persistence(cipher).await?)
    }

    /// Snapshots every currently-held node, edge, and cross-graph link to a
    /// fresh JSONL shard via the wired `PersistenceManager`, mirroring
    /// `jobs::worker::Worker::process_flush`. Returns `0` and logs nothing if
    /// `enable_persistence` was never called.
    pub async fn flush_shards(&self, at: i64) -> Result<usize, EngineError> {
        let Some(persistence) = self.pipeline.persistence().read().await.clone() else {
            return Ok(0);
        };

        let (nodes, edges) = {
            let graph = self.pipeline.graph().read().await;
            (graph.all_nodes(), graph.all_edges())
        };
        let links: Vec<_> = self.pipeline.cross_links().read().await.all().cloned().collect();

        persistence.flush_node_shard(&nodes, at).await?;
        persistence.flush_edge_shard(&edges, at).await?;
        persistence.flush_cross_link_shard(&links, at).await?;
        Ok(nodes.len() + edges.len() + links.len())
    }

    /// Graph-shape metrics straight from `GraphStore`, the running
    /// query-cache hit rate, the approximate job backlog, plus the
    /// query-latency histogram `query_memory` feeds on every call.
    pub async fn get_metrics(&self) -> Metrics {
        let graph = self.pipeline.graph().read().await;
        let node_count = graph.node_count();
        let edge_count = graph.edge_count();
        let graph_metrics = EngineMetrics {
            node_count,
            edge_count,
            density: graph.density(),
            estimated_memory_bytes: node_count as u64 * BYTES_PER_NODE + edge_count as u64 * BYTES_PER_EDGE,
            cache_hit_rate: self.query.cache_hit_rate(),
            pending_changes: self.pending_jobs.load(Ordering::Relaxed) as usize,
        };
        Metrics { graph: graph_metrics, query: self.query_metrics.snapshot() }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn now_unix_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}
