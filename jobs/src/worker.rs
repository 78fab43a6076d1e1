use crate::queue::Job;
use alayasiki_core::model::{CrossGraphLink, CrossLinkType, Edge, GraphSide, InvalidationReason, Node, PropertyValue};
use regex::Regex;
use sha2::{Digest, Sha256};
use slm::ner::TextAnalysisProvider;
use slm::registry::ModelRegistry;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use storage::clustering::ClusterMember;
use storage::cross_link::CrossLinkStore;
use storage::graph_store::GraphStore;
use storage::index_manager::IndexManager;
use storage::memory::MemoryManager;
use storage::persistence::PersistenceManager;
use storage::resolver;
use storage::temporal::{RelationClass, TemporalTracker};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Property key marking a domain edge as deriving from a `RelationCandidate`
/// (rather than a `DependencyEdge`), i.e. one that carries `EvidenceSupport`
/// cross-links and is therefore a candidate for the `cross_graph_inconsistency`
/// auto-invalidation rule. Dependency edges never acquire evidence-support
/// links (their endpoints aren't independently extracted entities), so
/// subjecting them to that rule would invalidate every one of them the first
/// time maintenance runs.
const EVIDENCE_TRACKED_PROPERTY: &str = "evidence_tracked";

/// Classifies a relation type into the validity-duration class C8 uses to
/// pick a default validity window. Acquisition/founding-style relations are
/// event-like (short-lived significance); everything else defaults to
/// stable, matching spec 4.7's "configurable" fallback.
fn classify_relation(relation_type: &str) -> RelationClass {
    match relation_type {
        "acquired" | "merged" | "announced" | "founded" | "launched" => RelationClass::Event,
        "works_at" | "located_in" | "member_of" => RelationClass::State,
        _ => RelationClass::Stable,
    }
}

/// Dimensionality used for the deterministic entity/chunk embeddings
/// `process_extraction` compares for `semantic_grounding` links. Small and
/// fixed since these embeddings never leave this comparison.
const SEMANTIC_EMBEDDING_DIMS: usize = 64;

/// Deterministic entity id from its surface text, so re-extracting the same
/// mention across chunks resolves to the same node.
fn entity_id(text: &str) -> String {
    let digest = Sha256::digest(text.trim().to_lowercase().as_bytes());
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        let _ = write!(hex, "{byte:02x}");
    }
    format!("entity-{hex}")
}

/// Inserts (or re-indexes) the domain node for `text`/`label`, returning its
/// id, or `None` if the node didn't already exist and the graph refused to
/// add it (e.g. node capacity exceeded). Shared by entity mentions and
/// dependency-parse endpoints, both of which resolve a surface string to a
/// graph node the same way.
fn register_entity_node(
    graph: &mut GraphStore,
    index: &mut IndexManager,
    text: &str,
    label: &str,
    extraction_model_ref: &str,
    snapshot_id: &str,
    now: i64,
) -> Option<String> {
    let id = entity_id(text);
    let node = Node::new(id.clone(), "entity", now)
        .with_property("name", PropertyValue::String(text.to_string()))
        .with_property("label", PropertyValue::String(label.to_string()))
        .with_property("extraction_model_id", PropertyValue::String(extraction_model_ref.to_string()))
        .with_property("snapshot_id", PropertyValue::String(snapshot_id.to_string()));

    if graph.get_node(&id).is_none() {
        if let Err(e) = graph.add_node(node.clone()) {
            error!("failed to add entity node {id}: {e}");
            return None;
        }
    }
    if let Err(e) = index.index_node(&node) {
        error!("failed to index entity node {id}: {e}");
    }
    Some(id)
}

/// Closes any existing open out-edge from `incoming.source` that the
/// new edge conflicts with, before `incoming` is installed:
/// - same `(source, type, target)`, older `valid_from` — C8's `superseded`
///   rule exactly as spec 4.7 states it (re-asserting the identical triple).
/// - same `(source, type)`, a *different* target — a person can only
///   `works_at` one place at a time; this is the shape of spec 8's S6
///   scenario (`works_at(Alice, A)` then `works_at(Alice, B)`), which
///   doesn't fit 4.7's literal same-triple wording but is the only one of
///   the three named rules it can plausibly be.
/// - `incoming`'s antonym type already open between the same endpoints —
///   C8's `contradicted` rule.
fn close_conflicting_relations(graph: &mut GraphStore, temporal: &TemporalTracker, incoming: &Edge) {
    let mut existing = graph.out_edges(&incoming.source);

    for edge in existing.iter_mut() {
        if edge.id == incoming.id {
            continue;
        }
        if edge.edge_type == incoming.edge_type && edge.target != incoming.target && edge.created_at < incoming.created_at && edge.is_valid_at(incoming.created_at)
        {
            edge.invalidate(InvalidationReason::Superseded, incoming.created_at);
        }
    }

    temporal.apply_superseded(incoming, &mut existing);
    temporal.apply_contradicted(incoming, &mut existing);

    for edge in existing {
        if edge.invalidation_reason.is_some() {
            let _ = graph.update_edge(edge);
        }
    }
}

/// Counts still-open `EvidenceSupport` cross-links backing `edge`, for the
/// `cross_graph_inconsistency` rule. Only meaningful for edges carrying
/// `EVIDENCE_TRACKED_PROPERTY` — see its doc comment.
fn evidence_support_count(cross_links: &CrossLinkStore, edge: &Edge) -> usize {
    let suffix = format!(":evidence_support:{}", edge.edge_type);
    let matches = |links: Vec<CrossGraphLink>| links.into_iter().filter(|l| l.link_type == CrossLinkType::EvidenceSupport && l.id.ends_with(&suffix)).count();
    matches(cross_links.links_to(&edge.source)) + matches(cross_links.links_to(&edge.target))
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

/// Explicit four-digit years mentioned in `text`, in order of first
/// appearance, for `temporal_alignment` cross-linking.
fn time_expressions(text: &str) -> Vec<String> {
    let Ok(pattern) = Regex::new(r"\b(?:19|20)\d{2}\b") else {
        return Vec::new();
    };
    pattern.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

pub struct Worker {
    receiver: mpsc::Receiver<Job>,
    graph: Arc<RwLock<GraphStore>>,
    index: Arc<RwLock<IndexManager>>,
    temporal: Arc<TemporalTracker>,
    cross_links: Arc<RwLock<CrossLinkStore>>,
    memory: Arc<RwLock<MemoryManager>>,
    persistence: Arc<RwLock<Option<Arc<PersistenceManager>>>>,
    registry: Arc<ModelRegistry>,
    default_model_ref: String,
    cancellation: CancellationToken,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        receiver: mpsc::Receiver<Job>,
        graph: Arc<RwLock<GraphStore>>,
        index: Arc<RwLock<IndexManager>>,
        temporal: Arc<TemporalTracker>,
        cross_links: Arc<RwLock<CrossLinkStore>>,
        memory: Arc<RwLock<MemoryManager>>,
        persistence: Arc<RwLock<Option<Arc<PersistenceManager>>>>,
        extractor: Arc<dyn TextAnalysisProvider>,
        cancellation: CancellationToken,
    ) -> Self {
        let mut registry = ModelRegistry::new();
        registry
            .register("legacy-default", "1.0.0", extractor)
            .expect("legacy extractor registration must succeed");
        registry
            .activate("legacy-default", "1.0.0")
            .expect("legacy extractor activation must succeed");

        Self {
            receiver,
            graph,
            index,
            temporal,
            cross_links,
            memory,
            persistence,
            registry: Arc::new(registry),
            default_model_ref: "legacy-default".to_string(),
            cancellation,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_registry(
        receiver: mpsc::Receiver<Job>,
        graph: Arc<RwLock<GraphStore>>,
        index: Arc<RwLock<IndexManager>>,
        temporal: Arc<TemporalTracker>,
        cross_links: Arc<RwLock<CrossLinkStore>>,
        memory: Arc<RwLock<MemoryManager>>,
        persistence: Arc<RwLock<Option<Arc<PersistenceManager>>>>,
        registry: Arc<ModelRegistry>,
        default_model_ref: impl Into<String>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            graph,
            index,
            temporal,
            cross_links,
            memory,
            persistence,
            registry,
            default_model_ref: default_model_ref.into(),
            cancellation,
        }
    }

    pub async fn run(mut self) {
        info!("worker started");
        loop {
            tokio::select! {
                _ = self.cancellation.cancelled() => {
                    info!("worker cancelled");
                    break;
                }
                job = self.receiver.recv() => {
                    let Some(job) = job else { break };
                    if let Err(e) = self.process(job).await {
                        error!("job failed: {e}");
                    }
                }
            }
        }
        info!("worker stopped");
    }

    async fn process(&self, job: Job) -> anyhow::Result<()> {
        match job {
            Job::ExtractEntities { chunk_id, content, model_id, snapshot_id, now } => {
                self.process_extraction(&chunk_id, &content, &model_id, &snapshot_id, now).await
            }
            Job::ResolveEntities { node_ids } => self.process_resolution(&node_ids).await,
            Job::RebuildClusters { node_type, now } => self.process_clustering(node_type, now).await,
            Job::InvalidateExpiredRelations { cutoff_unix_ms } => self.process_expiry(cutoff_unix_ms).await,
            Job::EvictOverflow { now, temporal_cutoff_age } => self.process_eviction(now, temporal_cutoff_age).await,
            Job::FlushShards { at } => self.process_flush(at).await,
        }
    }

    /// C12 append: snapshots every currently-held node, edge, and
    /// cross-graph link to a fresh JSONL shard via the wired
    /// `PersistenceManager`. A no-op (beyond a warning) when no persistence
    /// handle has been configured, so ingestion keeps working in
    /// in-memory-only deployments.
    async fn process_flush(&self, at: i64) -> anyhow::Result<()> {
        let Some(persistence) = self.persistence.read().await.clone() else {
            warn!("flush_shards requested but no persistence handle is wired into this worker instance");
            return Ok(());
        };

        let (nodes, edges) = {
            let graph = self.graph.read().await;
            (graph.all_nodes(), graph.all_edges())
        };
        let links: Vec<CrossGraphLink> = self.cross_links.read().await.all().cloned().collect();

        persistence.flush_node_shard(&nodes, at).await?;
        persistence.flush_edge_shard(&edges, at).await?;
        persistence.flush_cross_link_shard(&links, at).await?;
        info!(
            "flushed {} node(s), {} edge(s), {} cross-link(s) to shard storage",
            nodes.len(),
            edges.len(),
            links.len()
        );
        Ok(())
    }

    async fn process_extraction(
        &self,
        chunk_id: &str,
        content: &str,
        model_ref: &str,
        snapshot_id: &str,
        now: i64,
    ) -> anyhow::Result<()> {
        let resolved = self
            .registry
            .resolve(model_ref)
            .or_else(|_| self.registry.resolve(&self.default_model_ref))?;
        let extraction_model_ref = format!("{}@{}", resolved.model_id, resolved.version);
        let extraction = resolved.extractor.analyze(content).await?;
        let linking = alayasiki_core::config::LinkingConfig::default();
        let content_years = time_expressions(content);

        let mut graph = self.graph.write().await;
        let mut index = self.index.write().await;
        let mut cross_links = self.cross_links.write().await;

        for entity in &extraction.entities {
            let Some(target_id) = register_entity_node(
                &mut graph,
                &mut index,
                &entity.text,
                &entity.label,
                &extraction_model_ref,
                snapshot_id,
                now,
            ) else {
                continue;
            };

            // The chunk a mention came from lives in the lexical graph, the
            // entity it names lives in the domain graph, so the link between
            // them crosses graphs rather than being a plain GraphStore edge.
            if entity.confidence < linking.min_link_confidence {
                continue;
            }
            if cross_links.link_count_for_entity(&target_id) >= linking.max_links_per_entity {
                warn!("skipping mention link {chunk_id}->{target_id}: maxLinksPerEntity reached");
                continue;
            }
            cross_links.add(CrossGraphLink {
                id: format!("{chunk_id}->{target_id}:mentions"),
                source_graph: GraphSide::Lexical,
                target_graph: GraphSide::Domain,
                source_id: chunk_id.to_string(),
                target_id: target_id.clone(),
                link_type: CrossLinkType::EntityMention,
                confidence: entity.confidence,
                metadata: Default::default(),
                created_at: now,
                validity: None,
            });
            info!("linked chunk {chunk_id} to entity {target_id} ({})", entity.text);

            let entity_embedding = alayasiki_core::embedding::deterministic_embedding(&entity.text, &extraction_model_ref, SEMANTIC_EMBEDDING_DIMS);
            let chunk_embedding = alayasiki_core::embedding::deterministic_embedding(content, &extraction_model_ref, SEMANTIC_EMBEDDING_DIMS);
            let similarity = cosine(&entity_embedding, &chunk_embedding);
            if similarity >= linking.semantic_grounding_threshold
                && cross_links.link_count_for_entity(&target_id) < linking.max_links_per_entity
            {
                cross_links.add(CrossGraphLink {
                    id: format!("{chunk_id}->{target_id}:semantic_grounding"),
                    source_graph: GraphSide::Lexical,
                    target_graph: GraphSide::Domain,
                    source_id: chunk_id.to_string(),
                    target_id: target_id.clone(),
                    link_type: CrossLinkType::SemanticGrounding,
                    confidence: similarity,
                    metadata: Default::default(),
                    created_at: now,
                    validity: None,
                });
            }

            // A chunk and an entity it mentions share the time expression the
            // chunk carries, since there's nothing finer-grained than the
            // chunk to attribute an extracted date to.
            if !content_years.is_empty() && cross_links.link_count_for_entity(&target_id) < linking.max_links_per_entity {
                cross_links.add(CrossGraphLink {
                    id: format!("{chunk_id}->{target_id}:temporal_alignment"),
                    source_graph: GraphSide::Lexical,
                    target_graph: GraphSide::Domain,
                    source_id: chunk_id.to_string(),
                    target_id: target_id.clone(),
                    link_type: CrossLinkType::TemporalAlignment,
                    confidence: entity.confidence,
                    metadata: [("year".to_string(), PropertyValue::String(content_years[0].clone()))].into_iter().collect(),
                    created_at: now,
                    validity: None,
                });
            }
        }

        for relation in &extraction.relations {
            let source_id = entity_id(&relation.source_text);
            let target_id = entity_id(&relation.target_text);
            if graph.get_node(&source_id).is_none() || graph.get_node(&target_id).is_none() {
                continue;
            }
            let edge_id = format!("{source_id}-{}-{target_id}", relation.relation_type);
            if graph.get_edge(&edge_id).is_none() {
                let mut edge = Edge::new(edge_id, source_id.clone(), target_id.clone(), relation.relation_type.clone(), relation.confidence, now);
                edge.properties.insert(EVIDENCE_TRACKED_PROPERTY.to_string(), PropertyValue::String("true".to_string()));
                self.temporal.assign_default_validity(&mut edge, classify_relation(&relation.relation_type));
                close_conflicting_relations(&mut graph, &self.temporal, &edge);
                if let Err(e) = graph.add_edge(edge) {
                    error!("failed to add relation edge {source_id}->{target_id}: {e}");
                    continue;
                }
            }

            // Both endpoints of a relation are mentioned in the same chunk,
            // which is the evidence the relation rests on.
            for endpoint in [&source_id, &target_id] {
                if cross_links.link_count_for_entity(endpoint) >= linking.max_links_per_entity {
                    continue;
                }
                cross_links.add(CrossGraphLink {
                    id: format!("{chunk_id}->{endpoint}:evidence_support:{}", relation.relation_type),
                    source_graph: GraphSide::Lexical,
                    target_graph: GraphSide::Domain,
                    source_id: chunk_id.to_string(),
                    target_id: endpoint.clone(),
                    link_type: CrossLinkType::EvidenceSupport,
                    confidence: relation.confidence,
                    metadata: Default::default(),
                    created_at: now,
                    validity: None,
                });
            }
        }

        for dependency in &extraction.dependencies {
            let Some(head_id) =
                register_entity_node(&mut graph, &mut index, &dependency.head_text, "Dependency", &extraction_model_ref, snapshot_id, now)
            else {
                continue;
            };
            let Some(dependent_id) =
                register_entity_node(&mut graph, &mut index, &dependency.dependent_text, "Dependency", &extraction_model_ref, snapshot_id, now)
            else {
                continue;
            };
            let edge_id = format!("{head_id}-{}-{dependent_id}", dependency.relation);
            if graph.get_edge(&edge_id).is_none() {
                let mut edge = Edge::new(edge_id, head_id, dependent_id, dependency.relation.clone(), 1.0, now);
                self.temporal.assign_default_validity(&mut edge, RelationClass::Stable);
                if let Err(e) = graph.add_edge(edge) {
                    error!("failed to add dependency edge {}: {e}", dependency.relation);
                }
            }
        }
        Ok(())
    }

    async fn process_resolution(&self, node_ids: &[String]) -> anyhow::Result<()> {
        let graph = self.graph.read().await;
        let index = self.index.read().await;
        let nodes: Vec<Node> = node_ids.iter().filter_map(|id| graph.get_node(id)).collect();
        let buckets = resolver::bucket_by_type(&nodes);

        for (node_type, targets) in &buckets {
            let candidates: Vec<Node> = index.query_by_type(node_type).into_iter().filter_map(|id| graph.get_node(&id)).collect();
            for target in targets {
                let matches = index.resolve_entity(target, candidates.iter());
                if !matches.is_empty() {
                    info!("resolver found {} candidate(s) for {}", matches.len(), target.id);
                }
            }
        }
        Ok(())
    }

    async fn process_clustering(&self, node_type: Option<String>, now: i64) -> anyhow::Result<()> {
        let graph = self.graph.read().await;
        let ids: Vec<String> = match &node_type {
            Some(t) => self.index.read().await.query_by_type(t).into_iter().collect(),
            None => graph.node_ids().cloned().collect(),
        };
        let nodes: Vec<Node> = ids.iter().filter_map(|id| graph.get_node(id)).collect();
        let members: Vec<ClusterMember> = nodes
            .iter()
            .filter_map(|n| n.embedding.as_ref().map(|e| ClusterMember { id: &n.id, node_type: &n.node_type, embedding: e }))
            .collect();

        if members.is_empty() {
            return Ok(());
        }
        let index = self.index.read().await;
        let section = alayasiki_core::config::ClusteringSection::default();
        let clusters = index.cluster(&members, &section, now);
        info!("rebuilt {} cluster(s)", clusters.len());
        Ok(())
    }

    async fn process_expiry(&self, cutoff_unix_ms: i64) -> anyhow::Result<()> {
        let mut graph = self.graph.write().await;
        let cross_links = self.cross_links.read().await;
        let ids: Vec<String> = graph.node_ids().cloned().collect();

        let mut support_counts: HashMap<String, usize> = HashMap::new();
        for id in &ids {
            for edge in graph.out_edges(id) {
                if edge.properties.contains_key(EVIDENCE_TRACKED_PROPERTY) {
                    support_counts.insert(edge.id.clone(), evidence_support_count(&cross_links, &edge));
                }
            }
        }

        for id in &ids {
            let mut tracked: Vec<Edge> = graph.out_edges(id).into_iter().filter(|e| e.properties.contains_key(EVIDENCE_TRACKED_PROPERTY)).collect();
            if self.temporal.apply_cross_graph_inconsistency(&mut tracked, &support_counts, cutoff_unix_ms) > 0 {
                for edge in &tracked {
                    if edge.invalidation_reason == Some(InvalidationReason::CrossGraphInconsistency) {
                        let _ = graph.update_edge(edge.clone());
                    }
                }
            }
        }

        for id in ids {
            let edges: Vec<Edge> = graph.out_edges(&id);
            let expired = self.temporal.expired_before(&edges, cutoff_unix_ms);
            for edge_id in expired {
                let edge_id = edge_id.to_string();
                let _ = graph.remove_edge(&edge_id);
            }
        }
        Ok(())
    }

    /// C9 overflow enforcement: once the tracked access-order set exceeds
    /// `maxMemoryNodes`, evicts the policy-chosen candidates, cascading the
    /// removal through C1 (`GraphStore::remove_node`, which already drops
    /// incident edges) and C3 (`IndexManager::remove_node`). C8 needs no
    /// separate step since an evicted node's edges are gone with it.
    async fn process_eviction(&self, now: i64, temporal_cutoff_age: i64) -> anyhow::Result<()> {
        let candidates = {
            let memory = self.memory.read().await;
            memory.eviction_candidates(now, temporal_cutoff_age)
        };
        if candidates.is_empty() {
            return Ok(());
        }

        let mut graph = self.graph.write().await;
        let mut index = self.index.write().await;
        let mut memory = self.memory.write().await;
        for id in &candidates {
            graph.remove_node(id);
            index.remove_node(id);
            memory.forget(id);
        }
        info!("evicted {} node(s) over the memory cap", candidates.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slm::lightweight::TriplexLiteExtractor;
    use slm::ner::MockEntityExtractor;
    use storage::temporal::DefaultValidityPeriods;

    fn worker_with(extractor: Arc<dyn TextAnalysisProvider>) -> Worker {
        let (_tx, rx) = mpsc::channel(1);
        Worker::new(
            rx,
            Arc::new(RwLock::new(GraphStore::new(1000, 1000))),
            Arc::new(RwLock::new(IndexManager::new(Default::default(), Default::default()))),
            Arc::new(TemporalTracker::new(DefaultValidityPeriods::default())),
            Arc::new(RwLock::new(CrossLinkStore::new())),
            Arc::new(RwLock::new(MemoryManager::new(&Default::default()))),
            Arc::new(RwLock::new(None)),
            extractor,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn entity_mention_links_are_installed_for_confident_entities() {
        let worker = worker_with(Arc::new(MockEntityExtractor::new()));
        worker
            .process_extraction("chunk-1", "I love programming in Rust and building AI systems.", "legacy-default", "snap-1", 0)
            .await
            .unwrap();

        let graph = worker.graph.read().await;
        let rust_id = entity_id("Rust");
        assert!(graph.get_node(&rust_id).is_some());

        let cross_links = worker.cross_links.read().await;
        let mentions: Vec<_> = cross_links.links_to(&rust_id).into_iter().filter(|l| l.link_type == CrossLinkType::EntityMention).collect();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].source_id, "chunk-1");
    }

    #[tokio::test]
    async fn relation_candidates_install_domain_edges_with_evidence_support_links() {
        let worker = worker_with(Arc::new(TriplexLiteExtractor));
        worker
            .process_extraction("chunk-2", "The startup acquired another company in a partnership", "legacy-default", "snap-1", 0)
            .await
            .unwrap();

        let graph = worker.graph.read().await;
        let acquired_id = entity_id("acquired");
        let company_id = entity_id("company");
        let edge_id = format!("{acquired_id}-acquired-{company_id}");
        let edge = graph.get_edge(&edge_id).expect("acquired relation edge should have been installed");
        assert_eq!(edge.edge_type, "acquired");

        let cross_links = worker.cross_links.read().await;
        assert!(cross_links
            .links_to(&acquired_id)
            .iter()
            .any(|l| l.link_type == CrossLinkType::EvidenceSupport));
        assert!(cross_links
            .links_to(&company_id)
            .iter()
            .any(|l| l.link_type == CrossLinkType::EvidenceSupport));
    }

    #[tokio::test]
    async fn dependency_edges_install_hierarchical_relations() {
        let worker = worker_with(Arc::new(TriplexLiteExtractor));
        worker
            .process_extraction("chunk-3", "Acme Robotics is a subsidiary of Globex Corp", "legacy-default", "snap-1", 0)
            .await
            .unwrap();

        let graph = worker.graph.read().await;
        let parent_id = entity_id("parent");
        let subsidiary_id = entity_id("subsidiary");
        let edge_id = format!("{parent_id}-parent_of-{subsidiary_id}");
        let edge = graph.get_edge(&edge_id).expect("parent_of dependency edge should have been installed");
        assert_eq!(edge.edge_type, "parent_of");
    }

    #[tokio::test]
    async fn temporal_alignment_links_entities_sharing_a_year_expression() {
        let worker = worker_with(Arc::new(MockEntityExtractor::new()));
        worker
            .process_extraction("chunk-4", "Graph database adoption accelerated in 2023.", "legacy-default", "snap-1", 0)
            .await
            .unwrap();

        let graph_id = entity_id("Graph");
        let cross_links = worker.cross_links.read().await;
        let alignments: Vec<_> = cross_links
            .links_to(&graph_id)
            .into_iter()
            .filter(|l| l.link_type == CrossLinkType::TemporalAlignment)
            .collect();
        assert_eq!(alignments.len(), 1);
        assert_eq!(alignments[0].metadata.get("year").and_then(PropertyValue::as_str), Some("2023"));
    }

    #[test]
    fn time_expressions_finds_years_in_order() {
        assert_eq!(time_expressions("Founded in 1998, expanded by 2024."), vec!["1998".to_string(), "2024".to_string()]);
        assert!(time_expressions("No dates here.").is_empty());
    }

    #[test]
    fn classify_relation_sorts_known_keywords_into_event_and_state() {
        assert_eq!(classify_relation("acquired"), RelationClass::Event);
        assert_eq!(classify_relation("works_at"), RelationClass::State);
        assert_eq!(classify_relation("knows"), RelationClass::Stable);
    }

    #[tokio::test]
    async fn close_conflicting_relations_supersedes_a_changed_employer() {
        let mut graph = GraphStore::new(100, 100);
        graph.add_node(Node::new("alice", "person", 0)).unwrap();
        graph.add_node(Node::new("acme", "org", 0)).unwrap();
        graph.add_node(Node::new("globex", "org", 0)).unwrap();

        let mut first = Edge::new("alice-works_at-acme", "alice", "acme", "works_at", 1.0, 0);
        let temporal = TemporalTracker::new(DefaultValidityPeriods::default());
        temporal.assign_default_validity(&mut first, RelationClass::State);
        close_conflicting_relations(&mut graph, &temporal, &first);
        graph.add_edge(first).unwrap();

        let mut second = Edge::new("alice-works_at-globex", "alice", "globex", "works_at", 1.0, 1_000);
        temporal.assign_default_validity(&mut second, RelationClass::State);
        close_conflicting_relations(&mut graph, &temporal, &second);
        graph.add_edge(second).unwrap();

        let old = graph.get_edge("alice-works_at-acme").unwrap();
        assert_eq!(old.invalidation_reason, Some(InvalidationReason::Superseded));
        assert!(!old.is_valid_at(1_000));

        let current = graph.get_edge("alice-works_at-globex").unwrap();
        assert!(current.is_valid_at(1_000));
    }

    #[tokio::test]
    async fn close_conflicting_relations_closes_the_antonym_relation() {
        let mut graph = GraphStore::new(100, 100);
        graph.add_node(Node::new("bob", "person", 0)).unwrap();
        graph.add_node(Node::new("initech", "org", 0)).unwrap();

        let temporal = TemporalTracker::new(DefaultValidityPeriods::default());
        let mut employed = Edge::new("bob-works_at-initech", "bob", "initech", "works_at", 1.0, 0);
        temporal.assign_default_validity(&mut employed, RelationClass::State);
        graph.add_edge(employed).unwrap();

        let mut departed = Edge::new("bob-no_longer_works_at-initech", "bob", "initech", "no_longer_works_at", 1.0, 500);
        temporal.assign_default_validity(&mut departed, RelationClass::Event);
        close_conflicting_relations(&mut graph, &temporal, &departed);
        graph.add_edge(departed).unwrap();

        let employed = graph.get_edge("bob-works_at-initech").unwrap();
        assert_eq!(employed.invalidation_reason, Some(InvalidationReason::Contradicted));
        assert!(!employed.is_valid_at(500));
    }

    #[tokio::test]
    async fn process_resolution_only_compares_candidates_of_the_same_type() {
        let worker = worker_with(Arc::new(MockEntityExtractor::new()));
        let now = 0;

        {
            let mut graph = worker.graph.write().await;
            let mut index = worker.index.write().await;
            for (id, node_type, name) in [
                ("p1", "person", "Alice Johnson"),
                ("p2", "person", "alice johnson"),
                ("o1", "org", "alice johnson"),
            ] {
                let node = Node::new(id, node_type, now).with_property("name", PropertyValue::String(name.to_string()));
                graph.add_node(node.clone()).unwrap();
                index.index_node(&node).unwrap();
            }
        }

        // Should not panic or cross-contaminate buckets even though the
        // "org" node has a name identical to the "person" nodes.
        worker.process_resolution(&["p1".to_string(), "p2".to_string(), "o1".to_string()]).await.unwrap();
    }

    #[tokio::test]
    async fn process_eviction_drops_overflow_nodes_from_graph_and_index() {
        let (_tx, rx) = mpsc::channel(1);
        let memory_config = alayasiki_core::config::MemoryConfig { max_memory_nodes: 2, ..Default::default() };
        let worker = Worker::new(
            rx,
            Arc::new(RwLock::new(GraphStore::new(1000, 1000))),
            Arc::new(RwLock::new(IndexManager::new(Default::default(), Default::default()))),
            Arc::new(TemporalTracker::new(DefaultValidityPeriods::default())),
            Arc::new(RwLock::new(CrossLinkStore::new())),
            Arc::new(RwLock::new(MemoryManager::new(&memory_config))),
            Arc::new(RwLock::new(None)),
            Arc::new(MockEntityExtractor::new()),
            CancellationToken::new(),
        );

        {
            let mut graph = worker.graph.write().await;
            let mut index = worker.index.write().await;
            let mut memory = worker.memory.write().await;
            for (id, accessed_at) in [("a", 0), ("b", 10), ("c", 20)] {
                let node = Node::new(id, "person", 0);
                graph.add_node(node.clone()).unwrap();
                index.index_node(&node).unwrap();
                memory.record_access(id, accessed_at);
            }
        }

        worker.process_eviction(100, 1_000_000).await.unwrap();

        let graph = worker.graph.read().await;
        assert!(graph.get_node("a").is_none(), "least-recently-accessed node should be evicted");
        assert!(graph.get_node("b").is_some());
        assert!(graph.get_node("c").is_some());

        let index = worker.index.read().await;
        assert!(!index.query_by_type("person").contains("a"));
    }

    #[tokio::test]
    async fn process_flush_writes_current_graph_state_through_the_wired_persistence_manager() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = PersistenceManager::open(
            dir.path(),
            alayasiki_core::config::StorageConfig { compression_enabled: false, ..Default::default() },
            Arc::new(storage::crypto::NoOpCipher),
        )
        .await
        .unwrap();

        let (_tx, rx) = mpsc::channel(1);
        let worker = Worker::new(
            rx,
            Arc::new(RwLock::new(GraphStore::new(1000, 1000))),
            Arc::new(RwLock::new(IndexManager::new(Default::default(), Default::default()))),
            Arc::new(TemporalTracker::new(DefaultValidityPeriods::default())),
            Arc::new(RwLock::new(CrossLinkStore::new())),
            Arc::new(RwLock::new(MemoryManager::new(&Default::default()))),
            Arc::new(RwLock::new(Some(Arc::new(persistence)))),
            Arc::new(MockEntityExtractor::new()),
            CancellationToken::new(),
        );

        {
            let mut graph = worker.graph.write().await;
            graph.add_node(Node::new("a", "person", 0)).unwrap();
            graph.add_node(Node::new("b", "person", 0)).unwrap();
            graph.add_edge(Edge::new("a-knows-b", "a", "b", "knows", 1.0, 0)).unwrap();
        }

        worker.process_flush(1_000).await.unwrap();

        let reopened = PersistenceManager::open(
            dir.path(),
            alayasiki_core::config::StorageConfig { compression_enabled: false, ..Default::default() },
            Arc::new(storage::crypto::NoOpCipher),
        )
        .await
        .unwrap();
        let recovered_nodes = reopened.recover_nodes().await.unwrap();
        let recovered_edges = reopened.recover_edges().await.unwrap();
        assert_eq!(recovered_nodes.len(), 2);
        assert_eq!(recovered_edges.len(), 1);
    }

    #[tokio::test]
    async fn process_expiry_closes_relations_that_lost_all_evidence_support() {
        let worker = worker_with(Arc::new(TriplexLiteExtractor));
        worker
            .process_extraction("chunk-5", "The startup acquired another company in a partnership", "legacy-default", "snap-1", 0)
            .await
            .unwrap();

        let acquired_id = entity_id("acquired");
        let company_id = entity_id("company");
        let edge_id = format!("{acquired_id}-acquired-{company_id}");
        {
            let graph = worker.graph.read().await;
            assert!(graph.get_edge(&edge_id).unwrap().is_valid_at(0));
        }

        {
            let mut cross_links = worker.cross_links.write().await;
            *cross_links = CrossLinkStore::new();
        }

        worker.process_expiry(0).await.unwrap();

        let graph = worker.graph.read().await;
        let edge = graph.get_edge(&edge_id).unwrap();
        assert_eq!(edge.invalidation_reason, Some(InvalidationReason::CrossGraphInconsistency));
    }
}
