//! C11 unified query processor: executes the fixed plan from section 4.9 —
//! synthesize a vector if needed, run the lexical/domain/cross-graph
//! sub-queries, optionally merge near-duplicate entities, optionally boost
//! by memory recency/frequency, optionally annotate clusters, then combine
//! and sort the three partial result streams into one ranked list.

use crate::dsl::{CrossGraphQuery, DomainQuery, LexicalQuery, QueryOptions, QueryRequest, SortBy, TextMode};
use crate::semantic_cache::{SemanticCache, SemanticCacheKey};
use alayasiki_core::audit::{AuditEvent, AuditOperation, AuditOutcome, AuditSink};
use alayasiki_core::auth::{Action, AuthzError, Authorizer, Principal, ResourceContext};
use alayasiki_core::config::{ClusteringSection, ResolutionConfig};
use alayasiki_core::model::{ChunkType, CrossGraphLink, CrossLinkType, GraphSide, Node, PropertyValue, TextChunk};
use ingestion::embedding::Embedder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use storage::clustering::ClusterMember;
use storage::cross_link::CrossLinkStore;
use storage::graph_store::GraphStore;
use storage::index::{DistanceMetric, PropertyOp, TextQueryMode};
use storage::index_manager::IndexManager;
use storage::lexical::LexicalStore;
use storage::memory::MemoryManager;
use storage::resolver;
use storage::temporal::TemporalTracker;
use thiserror::Error;
use tokio::sync::RwLock;

/// `ChunkMetadata.tags` key stamped by ingestion-time governance policy
/// (`IngestionPipeline::ingest_authorized`). A chunk whose deadline has
/// passed is excluded from query results rather than purged outright.
const RETENTION_TAG: &str = "retention_until_unix";

/// Recency is normalized against this window: an access this long ago
/// contributes nothing to the recency term, one just now contributes 1.0.
const RECENCY_WINDOW_MILLIS: i64 = 7 * 24 * 60 * 60 * 1000;
/// Window used to normalize a chunk's creation-time term (`timeNorm`).
const AGE_WINDOW_MILLIS: i64 = 30 * 24 * 60 * 60 * 1000;
/// Minimum cluster confidence for the relevance boost in step 7 to apply.
const CLUSTER_BOOST_FLOOR: f32 = 0.5;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("not authorized: {0}")]
    Unauthorized(#[from] AuthzError),
}

impl alayasiki_core::error::AlayasikiError for QueryError {
    fn error_code(&self) -> alayasiki_core::error::ErrorCode {
        match self {
            QueryError::InvalidQuery(_) => alayasiki_core::error::ErrorCode::InvalidArgument,
            QueryError::Unauthorized(_) => alayasiki_core::error::ErrorCode::PermissionDenied,
        }
    }
}

/// Which of the three sub-query result streams an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Chunk,
    Entity,
    CrossLink,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAnnotation {
    pub cluster_id: String,
    pub representative: bool,
}

/// The payload carried by a single merged result. Only the variant
/// matching `kind` is ever populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultData {
    Chunk(TextChunk),
    Entity(Node),
    CrossLink(CrossGraphLink),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResultItem {
    pub id: String,
    pub data: ResultData,
    pub relevance: f32,
    pub confidence: f32,
    pub created_at: i64,
    pub cluster: Option<ClusterAnnotation>,
}

impl QueryResultItem {
    pub fn kind(&self) -> ResultKind {
        match &self.data {
            ResultData::Chunk(_) => ResultKind::Chunk,
            ResultData::Entity(_) => ResultKind::Entity,
            ResultData::CrossLink(_) => ResultKind::CrossLink,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryExplain {
    pub steps: Vec<String>,
    pub vector_synthesized: bool,
    pub phrase_degraded_to_all: bool,
    pub lexical_matches: usize,
    pub domain_matches: usize,
    pub cross_graph_matches: usize,
    pub resolution_merges: usize,
    pub cluster_distribution: HashMap<String, usize>,
    pub retention_excluded: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<QueryResultItem>,
    pub explain: QueryExplain,
    pub latency_ms: u64,
}

/// Ties together the full catalogue set plus the resolution/clustering
/// config sections that steps 5 and 7 need, and the vectorizer provider
/// step 1 uses to synthesize a query embedding.
pub struct QueryEngine {
    graph: Arc<RwLock<GraphStore>>,
    lexical: Arc<RwLock<LexicalStore>>,
    cross_links: Arc<RwLock<CrossLinkStore>>,
    index: Arc<RwLock<IndexManager>>,
    temporal: Arc<TemporalTracker>,
    memory: Arc<RwLock<MemoryManager>>,
    resolution: ResolutionConfig,
    clustering: ClusteringSection,
    embedder: Arc<dyn Embedder>,
    embedding_model_id: String,
    audit_sink: Option<Arc<dyn AuditSink>>,
    cache: Option<Arc<tokio::sync::Mutex<SemanticCache<QueryResponse>>>>,
    cache_hits: Arc<std::sync::atomic::AtomicU64>,
    cache_misses: Arc<std::sync::atomic::AtomicU64>,
}

impl QueryEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: Arc<RwLock<GraphStore>>,
        lexical: Arc<RwLock<LexicalStore>>,
        cross_links: Arc<RwLock<CrossLinkStore>>,
        index: Arc<RwLock<IndexManager>>,
        temporal: Arc<TemporalTracker>,
        memory: Arc<RwLock<MemoryManager>>,
        resolution: ResolutionConfig,
        clustering: ClusteringSection,
        embedder: Arc<dyn Embedder>,
        embedding_model_id: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            lexical,
            cross_links,
            index,
            temporal,
            memory,
            resolution,
            clustering,
            embedder,
            embedding_model_id: embedding_model_id.into(),
            audit_sink: None,
            cache: None,
            cache_hits: Arc::new(std::sync::atomic::AtomicU64::new(0)),
            cache_misses: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        }
    }

    pub fn set_audit_sink(&mut self, sink: Arc<dyn AuditSink>) {
        self.audit_sink = Some(sink);
    }

    pub fn set_cache(&mut self, config: crate::semantic_cache::SemanticCacheConfig) {
        self.cache = Some(Arc::new(tokio::sync::Mutex::new(SemanticCache::with_config(config))));
    }

    /// Fraction of `execute_cached` calls answered from cache since the
    /// engine was constructed (`getMetrics()`'s cache hit rate).
    pub fn cache_hit_rate(&self) -> f32 {
        let hits = self.cache_hits.load(std::sync::atomic::Ordering::Relaxed) as f32;
        let misses = self.cache_misses.load(std::sync::atomic::Ordering::Relaxed) as f32;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }

    /// Runs [`execute`](Self::execute) through the semantic cache when one
    /// is configured via [`Self::set_cache`]; otherwise identical to a
    /// direct call. `snapshot_id` scopes cache entries to a WAL position so
    /// a query never returns a cached answer from a stale snapshot.
    pub async fn execute_cached(&self, request: &QueryRequest, snapshot_id: &str) -> Result<QueryResponse, QueryError> {
        let Some(cache) = &self.cache else {
            return self.execute(request).await;
        };
        request.validate().map_err(|e| QueryError::InvalidQuery(e.to_string()))?;

        let query_text = request
            .lexical
            .text
            .clone()
            .or_else(|| request.domain.entity_name.clone())
            .unwrap_or_default();
        let key = SemanticCacheKey::from_request(request, &self.embedding_model_id, snapshot_id);

        {
            let mut guard = cache.lock().await;
            if let Some(hit) = guard.lookup(&key, &query_text) {
                self.cache_hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return Ok(hit);
            }
        }
        self.cache_misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let response = self.execute(request).await?;
        cache.lock().await.insert(key, &query_text, response.clone());
        Ok(response)
    }

    /// Authorizes the caller for `Action::Query`, then runs the cached
    /// execution path, recording an audit event for the denial or the
    /// outcome when an audit sink is configured.
    pub async fn execute_authorized(
        &self,
        request: &QueryRequest,
        principal: &Principal,
        authorizer: &Authorizer,
        resource: &ResourceContext,
        snapshot_id: &str,
    ) -> Result<QueryResponse, QueryError> {
        if let Err(err) = authorizer.authorize(principal, Action::Query, resource) {
            self.record_audit(
                AuditOutcome::Denied,
                Some(principal.subject.clone()),
                Some(principal.tenant.clone()),
                None,
                Some(snapshot_id.to_string()),
                [("error".to_string(), err.to_string())].into_iter().collect(),
            );
            return Err(QueryError::Unauthorized(err));
        }

        let result = self.execute_cached(request, snapshot_id).await;
        match &result {
            Ok(_) => self.record_audit(
                AuditOutcome::Succeeded,
                Some(principal.subject.clone()),
                Some(principal.tenant.clone()),
                Some(self.embedding_model_id.clone()),
                Some(snapshot_id.to_string()),
                HashMap::new(),
            ),
            Err(err) => self.record_audit(
                AuditOutcome::Failed,
                Some(principal.subject.clone()),
                Some(principal.tenant.clone()),
                None,
                Some(snapshot_id.to_string()),
                [("error".to_string(), err.to_string())].into_iter().collect(),
            ),
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn record_audit(
        &self,
        outcome: AuditOutcome,
        actor: Option<String>,
        tenant: Option<String>,
        model_id: Option<String>,
        snapshot_id: Option<String>,
        metadata: HashMap<String, String>,
    ) {
        if let Some(sink) = &self.audit_sink {
            let mut event = AuditEvent::new(AuditOperation::Query, outcome);
            event.actor = actor;
            event.tenant = tenant;
            event.model_id = model_id;
            event.snapshot_id = snapshot_id;
            event.metadata = metadata;
            if let Err(err) = sink.record(event) {
                tracing::warn!(error = %err, "failed to record audit event");
            }
        }
    }

    pub async fn execute(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
        request.validate().map_err(|e| QueryError::InvalidQuery(e.to_string()))?;
        let start = Instant::now();
        let now = chrono_now_ms();
        let mut explain = QueryExplain::default();

        // Step 1: synthesize a vector for the lexical sub-query if text was
        // given but no vector was. Best-effort: failure degrades to
        // text-only rather than failing the whole query.
        let mut lexical_query = request.lexical.clone();
        if lexical_query.vector.is_none() {
            if let Some(text) = &lexical_query.text {
                match self.embedder.embed(text, &self.embedding_model_id).await {
                    Ok(vector) => {
                        lexical_query.vector = Some(vector);
                        explain.vector_synthesized = true;
                        explain.steps.push("synthesized query vector from lexical text".to_string());
                    }
                    Err(e) => {
                        explain.steps.push(format!("vector synthesis failed, degrading to text-only: {e}"));
                    }
                }
            }
        }

        // Step 2: lexical sub-query.
        let lexical_matches = self.run_lexical(&lexical_query, &mut explain).await;
        explain.lexical_matches = lexical_matches.len();

        // Step 3: domain sub-query.
        let mut domain_matches = self
            .run_domain(&request.domain, &lexical_query, request.options.as_of, &mut explain)
            .await;
        explain.domain_matches = domain_matches.len();

        // Step 4: cross-graph sub-query.
        let cross_graph_matches = self.run_cross_graph(&request.cross_graph, request.options.as_of).await;
        explain.cross_graph_matches = cross_graph_matches.len();

        // Step 5: entity resolution over the domain result set.
        if request.options.resolve_entities {
            let before = domain_matches.len();
            domain_matches = self.merge_near_duplicates(domain_matches).await;
            explain.resolution_merges = before.saturating_sub(domain_matches.len());
        }

        let mut chunk_items = self.lexical_results(lexical_matches, &request.options, now, &mut explain).await;
        let mut entity_items = self.domain_results(domain_matches, &request.options, now).await;
        let cross_link_items = Self::cross_link_results(cross_graph_matches);

        // Step 7: cluster annotation, confined to the domain result set.
        if request.options.annotate_clusters {
            self.annotate_clusters(&mut entity_items, &mut explain, now).await;
        }

        // Step 8: combine and sort.
        let mut results: Vec<QueryResultItem> = Vec::with_capacity(
            chunk_items.len() + entity_items.len() + cross_link_items.len(),
        );
        results.append(&mut chunk_items);
        results.append(&mut entity_items);
        results.extend(cross_link_items);

        sort_results(&mut results, request.options.sort_by);
        results.truncate(request.options.top_k);

        Ok(QueryResponse {
            results,
            explain,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn run_lexical(&self, query: &LexicalQuery, explain: &mut QueryExplain) -> HashMap<String, f32> {
        let mut matches: HashMap<String, f32> = HashMap::new();
        let lexical = self.lexical.read().await;

        if let Some(text) = &query.text {
            let tokens: Vec<String> = storage::index::text::tokenize(text);
            let mode = match query.text_mode {
                TextMode::Any => TextQueryMode::Any,
                TextMode::All => TextQueryMode::All,
                TextMode::Phrase => {
                    explain.phrase_degraded_to_all = true;
                    TextQueryMode::All
                }
            };
            let hits = match mode {
                TextQueryMode::All => tokens
                    .iter()
                    .map(|t| lexical.query_token(t))
                    .reduce(|a, b| a.intersection(&b).cloned().collect())
                    .unwrap_or_default(),
                _ => tokens.iter().flat_map(|t| lexical.query_token(t)).collect(),
            };
            for id in hits {
                let entry = matches.entry(id).or_insert(0.0);
                *entry = entry.max(0.8);
            }
        }

        if let Some(vector) = &query.vector {
            for chunk in lexical.all_chunks() {
                if let Some(embedding) = &chunk.embedding {
                    let score = cosine_similarity(vector, embedding);
                    if score > 0.0 {
                        let entry = matches.entry(chunk.id.clone()).or_insert(0.0);
                        *entry = entry.max(score);
                    }
                }
            }
        }

        if let Some(chunk_type) = &query.chunk_type {
            if let Some(parsed) = parse_chunk_type(chunk_type) {
                for id in lexical.query_chunk_type(parsed) {
                    let entry = matches.entry(id).or_insert(0.0);
                    *entry = entry.max(0.9);
                }
            }
        }

        matches
    }

    async fn run_domain(
        &self,
        query: &DomainQuery,
        lexical_query: &LexicalQuery,
        as_of: Option<i64>,
        explain: &mut QueryExplain,
    ) -> HashMap<String, f32> {
        let mut matches: HashMap<String, f32> = HashMap::new();
        let index = self.index.read().await;

        for entity_type in &query.entity_types {
            let target = PropertyValue::String(entity_type.clone());
            for id in index.query_property("label", PropertyOp::Eq, &target) {
                let entry = matches.entry(id).or_insert(0.0);
                *entry = entry.max(1.0);
            }
        }

        for relation_type in &query.relation_types {
            for id in self.entity_ids_touching_relation(relation_type, as_of).await {
                let entry = matches.entry(id).or_insert(0.0);
                *entry = entry.max(0.8);
            }
        }

        if let Some(vector) = &query.vector {
            for scored in index.query_vector(vector, DistanceMetric::Cosine, usize::MAX, 0.0) {
                let entry = matches.entry(scored.id).or_insert(0.0);
                *entry = entry.max(scored.score);
            }
        }

        let fallback_name = query.entity_name.clone().or_else(|| {
            if query.is_empty() {
                lexical_query.text.clone()
            } else {
                None
            }
        });

        if let Some(name) = fallback_name {
            let graph = self.graph.read().await;
            let candidate_ids: Vec<String> = if query.entity_types.is_empty() {
                graph.node_ids().cloned().collect()
            } else {
                matches.keys().cloned().collect()
            };
            let needle = name.to_lowercase();
            let synthetic =
                Node::new("__query__", "entity", 0).with_property("name", PropertyValue::String(name.clone()));

            for id in candidate_ids {
                let Some(node) = graph.get_node(&id) else { continue };
                let substring_hit = node.name().map(|n| n.to_lowercase().contains(&needle)).unwrap_or(false)
                    || node
                        .properties
                        .values()
                        .any(|v| v.as_str().map(|s| s.to_lowercase().contains(&needle)).unwrap_or(false));
                if substring_hit {
                    let entry = matches.entry(id).or_insert(0.0);
                    *entry = entry.max(1.0);
                    continue;
                }
                if let Some(score) = resolver::score_pair(&synthetic, &node, &self.resolution) {
                    if score.exact || score.confidence >= self.resolution.fuzzy_threshold {
                        let entry = matches.entry(id).or_insert(0.0);
                        *entry = entry.max(score.confidence);
                    }
                }
            }
        }

        if matches.is_empty() && query.is_empty() && lexical_query.text.is_none() {
            explain.steps.push("domain sub-query produced no criteria, skipped".to_string());
        }
        matches
    }

    async fn entity_ids_touching_relation(&self, relation_type: &str, as_of: Option<i64>) -> std::collections::HashSet<String> {
        let graph = self.graph.read().await;
        let mut ids = std::collections::HashSet::new();
        for node_id in graph.node_ids() {
            let edges = graph.out_edges(node_id);
            for edge in self.temporal.as_of(&edges, as_of) {
                if edge.edge_type == relation_type {
                    ids.insert(edge.source.clone());
                    ids.insert(edge.target.clone());
                }
            }
        }
        ids
    }

    async fn run_cross_graph(&self, query: &CrossGraphQuery, as_of: Option<i64>) -> Vec<CrossGraphLink> {
        let store = self.cross_links.read().await;
        store
            .all()
            .filter(|link| {
                query.link_type.as_deref().map(|t| link_type_matches(link.link_type, t)).unwrap_or(true)
                    && query.source_graph.as_deref().map(|g| graph_side_matches(link.source_graph, g)).unwrap_or(true)
                    && query.target_graph.as_deref().map(|g| graph_side_matches(link.target_graph, g)).unwrap_or(true)
                    && link.validity.as_ref().map(|v| v.contains(as_of.unwrap_or(i64::MAX))).unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    /// Merges near-duplicate entities within the domain result set,
    /// carrying the higher of the two match confidences forward onto the
    /// surviving id.
    async fn merge_near_duplicates(&self, matches: HashMap<String, f32>) -> HashMap<String, f32> {
        let graph = self.graph.read().await;
        let mut nodes: Vec<(Node, f32)> = matches
            .into_iter()
            .filter_map(|(id, score)| graph.get_node(&id).map(|node| (node, score)))
            .collect();
        nodes.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut kept: Vec<(Node, f32)> = Vec::new();
        'outer: for (node, score) in nodes {
            for (kept_node, kept_score) in kept.iter_mut() {
                if let Some(result) = resolver::score_pair(kept_node, &node, &self.resolution) {
                    if result.exact || result.confidence >= self.resolution.fuzzy_threshold {
                        *kept_score = kept_score.max(score);
                        continue 'outer;
                    }
                }
            }
            kept.push((node, score));
        }
        kept.into_iter().map(|(node, score)| (node.id, score)).collect()
    }

    async fn lexical_results(
        &self,
        matches: HashMap<String, f32>,
        options: &QueryOptions,
        now: i64,
        explain: &mut QueryExplain,
    ) -> Vec<QueryResultItem> {
        let lexical = self.lexical.read().await;
        let memory = self.memory.read().await;
        let max_freq = matches.keys().map(|id| memory.access_frequency(id)).max().unwrap_or(0).max(1);
        let (min_ts, max_ts) = matches
            .keys()
            .filter_map(|id| lexical.get_chunk(id).map(|c| c.metadata.timestamp))
            .fold((i64::MAX, i64::MIN), |(lo, hi), t| (lo.min(t), hi.max(t)));

        let mut items = Vec::with_capacity(matches.len());
        for (id, mut relevance) in matches {
            let Some(chunk) = lexical.get_chunk(&id) else { continue };
            if is_retention_expired(&chunk, now) {
                explain.retention_excluded += 1;
                continue;
            }
            if options.prioritize_memory {
                let recent = recency_score(memory.last_accessed(&id), now);
                let freq_norm = memory.access_frequency(&id) as f32 / max_freq as f32;
                let time_norm = normalize_range(chunk.metadata.timestamp, min_ts, max_ts);
                let boost = 0.4 * recent + 0.3 * freq_norm + 0.3 * time_norm;
                relevance = (relevance * (1.0 + boost)).min(1.0);
            }
            items.push(QueryResultItem {
                id: id.clone(),
                confidence: chunk.metadata.confidence,
                created_at: chunk.metadata.timestamp,
                data: ResultData::Chunk(chunk),
                relevance,
                cluster: None,
            });
        }
        items
    }

    async fn domain_results(&self, matches: HashMap<String, f32>, options: &QueryOptions, now: i64) -> Vec<QueryResultItem> {
        let graph = self.graph.read().await;
        let cross_links = self.cross_links.read().await;
        let memory = self.memory.read().await;
        let max_freq = matches.keys().map(|id| memory.access_frequency(id)).max().unwrap_or(0).max(1);

        let mut items = Vec::with_capacity(matches.len());
        for (id, mut relevance) in matches {
            let Some(node) = graph.get_node(&id) else { continue };
            let confidence = mention_confidence(&cross_links, &id);
            if options.prioritize_memory {
                let recent = recency_score(memory.last_accessed(&id), now);
                let freq_norm = memory.access_frequency(&id) as f32 / max_freq as f32;
                let boost = 0.6 * recent + 0.4 * freq_norm;
                relevance = (relevance * (1.0 + boost)).min(1.0);
            }
            items.push(QueryResultItem {
                id: id.clone(),
                created_at: node.created_at,
                data: ResultData::Entity(node),
                relevance,
                confidence,
                cluster: None,
            });
        }
        items
    }

    fn cross_link_results(links: Vec<CrossGraphLink>) -> Vec<QueryResultItem> {
        links
            .into_iter()
            .map(|link| QueryResultItem {
                id: link.id.clone(),
                relevance: 1.0,
                confidence: link.confidence,
                created_at: link.created_at,
                data: ResultData::CrossLink(link),
                cluster: None,
            })
            .collect()
    }

    async fn annotate_clusters(&self, entities: &mut [QueryResultItem], explain: &mut QueryExplain, now: i64) {
        let nodes: Vec<Node> = entities
            .iter()
            .filter_map(|item| match &item.data {
                ResultData::Entity(node) if node.embedding.is_some() => Some(node.clone()),
                _ => None,
            })
            .collect();

        let members: Vec<ClusterMember<'_>> = nodes
            .iter()
            .map(|n| ClusterMember {
                id: n.id.as_str(),
                node_type: n.node_type.as_str(),
                embedding: n.embedding.as_deref().unwrap_or(&[]),
            })
            .collect();

        let clusters = if members.is_empty() {
            Vec::new()
        } else {
            self.index.read().await.cluster(&members, &self.clustering, now)
        };

        let mut membership: HashMap<&str, (&str, f32, bool)> = HashMap::new();
        for cluster in &clusters {
            let representative = cluster
                .member_ids
                .iter()
                .max_by(|a, b| {
                    let sim_a = nodes
                        .iter()
                        .find(|n| &n.id == *a)
                        .and_then(|n| n.embedding.as_deref())
                        .map(|e| cosine_similarity(e, &cluster.centroid))
                        .unwrap_or(0.0);
                    let sim_b = nodes
                        .iter()
                        .find(|n| &n.id == *b)
                        .and_then(|n| n.embedding.as_deref())
                        .map(|e| cosine_similarity(e, &cluster.centroid))
                        .unwrap_or(0.0);
                    sim_a.partial_cmp(&sim_b).unwrap_or(std::cmp::Ordering::Equal)
                })
                .cloned();

            for member_id in &cluster.member_ids {
                let is_rep = representative.as_deref() == Some(member_id.as_str());
                membership.insert(member_id.as_str(), (cluster.id.as_str(), cluster.confidence, is_rep));
            }
        }

        for item in entities.iter_mut() {
            let annotation = match membership.get(item.id.as_str()) {
                Some((cluster_id, confidence, representative)) => {
                    if *confidence >= CLUSTER_BOOST_FLOOR {
                        item.relevance = (item.relevance + confidence * 0.25).min(1.0);
                    }
                    ClusterAnnotation {
                        cluster_id: cluster_id.to_string(),
                        representative: *representative,
                    }
                }
                None => ClusterAnnotation {
                    cluster_id: "isolated".to_string(),
                    representative: false,
                },
            };
            *explain.cluster_distribution.entry(annotation.cluster_id.clone()).or_insert(0) += 1;
            item.cluster = Some(annotation);
        }
        let _ = now;
    }
}

fn sort_results(results: &mut [QueryResultItem], sort_by: SortBy) {
    results.sort_by(|a, b| {
        let primary = match sort_by {
            SortBy::Relevance => b.relevance.partial_cmp(&a.relevance),
            SortBy::Confidence => b.confidence.partial_cmp(&a.confidence),
            SortBy::Timestamp => b.created_at.partial_cmp(&a.created_at),
        }
        .unwrap_or(std::cmp::Ordering::Equal);
        primary.then_with(|| a.created_at.cmp(&b.created_at)).then_with(|| a.id.cmp(&b.id))
    });
}

fn is_retention_expired(chunk: &TextChunk, now_millis: i64) -> bool {
    chunk
        .metadata
        .tags
        .get(RETENTION_TAG)
        .and_then(|v| v.parse::<i64>().ok())
        .map(|deadline_secs| deadline_secs <= now_millis / 1000)
        .unwrap_or(false)
}

/// Confidence of a domain node being a real entity, averaged over the
/// `EntityMention` cross-graph links chunks have accrued against it. Entities
/// no chunk has linked to yet (freshly resolved, or resolved only through
/// clustering) fall back to a neutral 0.5.
fn mention_confidence(cross_links: &CrossLinkStore, entity_id: &str) -> f32 {
    let incoming: Vec<f32> = cross_links
        .links_to(entity_id)
        .into_iter()
        .filter(|l| l.link_type == CrossLinkType::EntityMention)
        .map(|l| l.confidence)
        .collect();
    if incoming.is_empty() {
        0.5
    } else {
        incoming.iter().sum::<f32>() / incoming.len() as f32
    }
}

fn recency_score(last_accessed: Option<i64>, now: i64) -> f32 {
    match last_accessed {
        Some(t) => {
            let age = (now - t).max(0) as f32;
            (1.0 - age / RECENCY_WINDOW_MILLIS as f32).clamp(0.0, 1.0)
        }
        None => 0.0,
    }
}

fn normalize_range(value: i64, min: i64, max: i64) -> f32 {
    if max <= min {
        return 0.0;
    }
    let span = (max - min).min(AGE_WINDOW_MILLIS).max(1) as f32;
    ((value - min) as f32 / span).clamp(0.0, 1.0)
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

fn parse_chunk_type(value: &str) -> Option<ChunkType> {
    match value.to_lowercase().as_str() {
        "sentence" => Some(ChunkType::Sentence),
        "paragraph" => Some(ChunkType::Paragraph),
        "document" => Some(ChunkType::Document),
        _ => None,
    }
}

fn link_type_matches(link_type: CrossLinkType, value: &str) -> bool {
    let name = match link_type {
        CrossLinkType::EntityMention => "entity_mention",
        CrossLinkType::EvidenceSupport => "evidence_support",
        CrossLinkType::SemanticGrounding => "semantic_grounding",
        CrossLinkType::TemporalAlignment => "temporal_alignment",
    };
    name.eq_ignore_ascii_case(value)
}

fn graph_side_matches(side: GraphSide, value: &str) -> bool {
    let name = match side {
        GraphSide::Lexical => "lexical",
        GraphSide::Domain => "domain",
    };
    name.eq_ignore_ascii_case(value)
}

fn chrono_now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
