//! C7 ingestion pipeline: chunk the request into the lexical graph,
//! enqueue domain-graph extraction jobs, and (optionally) enforce
//! authorization and tenant governance around the whole operation.

use crate::chunker::{Chunker, SemanticChunker};
use crate::embedding::{DeterministicEmbedder, Embedder};
use crate::extract::{detect_content_kind, extract_pdf_text, extract_utf8, ContentKind};
use crate::policy::{ContentPolicy, NoOpPolicy, PolicyError};
use alayasiki_core::audit::{AuditEvent, AuditOperation, AuditOutcome, AuditSink};
use alayasiki_core::auth::{Action, AuthzError, Authorizer, Principal, ResourceContext};
use alayasiki_core::config::{ChunkingConfig, EngineConfig};
use alayasiki_core::governance::{GovernanceError, GovernancePolicyStore};
use alayasiki_core::ingest::{ContentHash, IngestionRequest};
use alayasiki_core::model::{LexicalRelation, LexicalRelationType};
use dashmap::DashMap;
use jobs::queue::{Job, JobQueue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use storage::cross_link::CrossLinkStore;
use storage::graph_store::{GraphStore, GraphStoreError};
use storage::index::VectorIndexConfig;
use storage::index_manager::IndexManager;
use storage::crypto::AtRestCipher;
use storage::lexical::LexicalStore;
use storage::memory::MemoryManager;
use storage::persistence::{PersistenceError, PersistenceManager};
use storage::temporal::{DefaultValidityPeriods, TemporalTracker};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, RwLock};

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("unsupported content type: {0}")]
    UnsupportedType(String),
    #[error("invalid UTF-8 content")]
    InvalidUtf8,
    #[error("content extraction failed: {0}")]
    ExtractionFailed(String),
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),
    #[error("graph error: {0}")]
    Graph(#[from] GraphStoreError),
    #[error("not authorized: {0}")]
    Unauthorized(#[from] AuthzError),
    #[error("governance error: {0}")]
    Governance(#[from] GovernanceError),
}

impl alayasiki_core::error::AlayasikiError for IngestionError {
    fn error_code(&self) -> alayasiki_core::error::ErrorCode {
        use alayasiki_core::error::ErrorCode;
        match self {
            IngestionError::UnsupportedType(_) => ErrorCode::InvalidArgument,
            IngestionError::InvalidUtf8 => ErrorCode::DecodeError,
            IngestionError::ExtractionFailed(_) => ErrorCode::Internal,
            IngestionError::Policy(_) => ErrorCode::InvalidArgument,
            IngestionError::Graph(e) => e.error_code(),
            IngestionError::Unauthorized(_) => ErrorCode::PermissionDenied,
            IngestionError::Governance(_) => ErrorCode::InvalidConfig,
        }
    }
}

/// Everything an ingest touches: the domain graph, the lexical graph, the
/// cross-graph link catalogue, the retrieval indices, and the temporal
/// tracker. `IngestionPipeline` owns these behind `Arc` so a co-wired
/// `jobs::worker::Worker` can share identical state for domain-graph
/// extraction.
pub struct IngestionPipeline {
    config: EngineConfig,
    graph: Arc<RwLock<GraphStore>>,
    lexical: Arc<RwLock<LexicalStore>>,
    cross_links: Arc<RwLock<CrossLinkStore>>,
    index: Arc<RwLock<IndexManager>>,
    temporal: Arc<TemporalTracker>,
    memory: Arc<RwLock<MemoryManager>>,
    /// Set once `open_persistence` succeeds; `None` means the pipeline runs
    /// in-memory only and `Job::FlushShards` is a no-op. A shared cell
    /// (rather than a constructor argument) because opening the WAL and
    /// backup directories is async and `with_components` isn't.
    persistence: Arc<RwLock<Option<Arc<PersistenceManager>>>>,
    chunker: Box<dyn Chunker>,
    embedder: Box<dyn Embedder>,
    policy: Box<dyn ContentPolicy>,
    default_model_id: String,
    job_queue: Option<Arc<dyn JobQueue>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    governance: Option<Arc<dyn GovernancePolicyStore>>,
    /// Completed-ingest results keyed by idempotency key / content hash.
    idempotency: Arc<DashMap<String, Vec<String>>>,
    /// Real per-key locks; the teacher's DashMap-as-lock never actually
    /// blocked concurrent callers, so two ingests racing on the same
    /// idempotency key both ran to completion and duplicated chunks.
    locks: Arc<DashMap<String, Arc<AsyncMutex<()>>>>,
    snapshot_counter: Arc<AtomicU64>,
}

impl IngestionPipeline {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_components(
            config,
            Box::new(SemanticChunker::default()),
            Box::new(DeterministicEmbedder::default()),
            Box::new(NoOpPolicy),
            "embedding-default-v1",
        )
    }

    pub fn with_chunker(config: EngineConfig, chunker: Box<dyn Chunker>) -> Self {
        Self::with_components(
            config,
            chunker,
            Box::new(DeterministicEmbedder::default()),
            Box::new(NoOpPolicy),
            "embedding-default-v1",
        )
    }

    pub fn with_components(
        config: EngineConfig,
        chunker: Box<dyn Chunker>,
        embedder: Box<dyn Embedder>,
        policy: Box<dyn ContentPolicy>,
        default_model_id: impl Into<String>,
    ) -> Self {
        let graph = GraphStore::new(config.graph.max_nodes, config.graph.max_edges_per_node);
        let index = IndexManager::new(VectorIndexConfig::default(), config.resolution.clone());
        let temporal = TemporalTracker::new(DefaultValidityPeriods::default());
        let memory = MemoryManager::new(&config.memory);
        Self {
            graph: Arc::new(RwLock::new(graph)),
            lexical: Arc::new(RwLock::new(LexicalStore::new())),
            cross_links: Arc::new(RwLock::new(CrossLinkStore::new())),
            index: Arc::new(RwLock::new(index)),
            temporal: Arc::new(temporal),
            memory: Arc::new(RwLock::new(memory)),
            persistence: Arc::new(RwLock::new(None)),
            chunker,
            embedder,
            policy,
            default_model_id: default_model_id.into(),
            job_queue: None,
            audit_sink: None,
            governance: None,
            idempotency: Arc::new(DashMap::new()),
            locks: Arc::new(DashMap::new()),
            snapshot_counter: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    pub fn graph(&self) -> Arc<RwLock<GraphStore>> {
        self.graph.clone()
    }

    pub fn lexical(&self) -> Arc<RwLock<LexicalStore>> {
        self.lexical.clone()
    }

    pub fn cross_links(&self) -> Arc<RwLock<CrossLinkStore>> {
        self.cross_links.clone()
    }

    pub fn index(&self) -> Arc<RwLock<IndexManager>> {
        self.index.clone()
    }

    pub fn temporal(&self) -> Arc<TemporalTracker> {
        self.temporal.clone()
    }

    pub fn memory(&self) -> Arc<RwLock<MemoryManager>> {
        self.memory.clone()
    }

    /// Shared handle a co-wired `jobs::worker::Worker` reads to service
    /// `Job::FlushShards`. `None` until `open_persistence` succeeds.
    pub fn persistence(&self) -> Arc<RwLock<Option<Arc<PersistenceManager>>>> {
        self.persistence.clone()
    }

    /// Opens the on-disk WAL/backup/shard directories under
    /// `config.storage.data_dir` and wires them in, so subsequent
    /// `Job::FlushShards` runs (and `PersistenceManager::recover_nodes`/
    /// `recover_edges` on restart) have somewhere real to read and write.
    pub async fn open_persistence(&self, cipher: Arc<dyn AtRestCipher>) -> Result<(), PersistenceError> {
        let manager = PersistenceManager::open(&self.config.storage.data_dir, self.config.storage.clone(), cipher).await?;
        *self.persistence.write().await = Some(Arc::new(manager));
        Ok(())
    }

    /// Current WAL position, for scoping query-side semantic cache entries
    /// and for pinning a time-travel query to a consistent snapshot.
    pub fn snapshot_id(&self) -> String {
        format!("wal-lsn-{}", self.snapshot_counter.load(Ordering::SeqCst))
    }

    pub fn set_job_queue(&mut self, queue: Arc<dyn JobQueue>) {
        self.job_queue = Some(queue);
    }

    pub fn set_audit_sink(&mut self, sink: Arc<dyn AuditSink>) {
        self.audit_sink = Some(sink);
    }

    pub fn set_governance_policy_store(&mut self, store: Arc<dyn GovernancePolicyStore>) {
        self.governance = Some(store);
    }

    pub async fn ingest(&self, request: IngestionRequest) -> Result<Vec<String>, IngestionError> {
        self.ingest_inner(request, HashMap::new()).await
    }

    /// Authorizes the caller for `Action::Ingest` against `resource`, applies
    /// any tenant governance policy (residency enforcement, retention/KMS
    /// stamping), and only then ingests. Denials and governance violations
    /// are recorded to the audit sink (when set) before returning.
    pub async fn ingest_authorized(
        &self,
        request: IngestionRequest,
        principal: &Principal,
        authorizer: &Authorizer,
        resource: &ResourceContext,
    ) -> Result<Vec<String>, IngestionError> {
        if let Err(err) = authorizer.authorize(principal, Action::Ingest, resource) {
            self.record_audit(
                AuditOperation::Ingest,
                AuditOutcome::Denied,
                Some(principal.subject.clone()),
                Some(principal.tenant.clone()),
                None,
                [("error".to_string(), err.to_string())].into_iter().collect(),
            );
            return Err(IngestionError::Unauthorized(err));
        }

        let mut governance_tags = HashMap::new();
        if let Some(store) = &self.governance {
            let tenant = &principal.tenant;
            if let Some(policy) = store.get_policy(tenant).map_err(IngestionError::Governance)? {
                let region = request.metadata().get("region").map(String::as_str);
                if let Err(err) = policy.ensure_residency(region) {
                    self.record_audit(
                        AuditOperation::Ingest,
                        AuditOutcome::Denied,
                        Some(principal.subject.clone()),
                        Some(tenant.clone()),
                        None,
                        [("error".to_string(), err.to_string())].into_iter().collect(),
                    );
                    return Err(IngestionError::Governance(err));
                }
                governance_tags.insert("tenant".to_string(), tenant.clone());
                governance_tags.insert("residency_region".to_string(), policy.residency_region.clone());
                if let Some(kms_key_id) = policy.kms_key_id() {
                    governance_tags.insert("kms_key_id".to_string(), kms_key_id.to_string());
                }
                governance_tags.insert(
                    "retention_until_unix".to_string(),
                    policy.retention_deadline_unix(chrono_now_ms() as u64 / 1000).to_string(),
                );
            }
        }

        self.ingest_inner(request, governance_tags).await
    }

    fn record_audit(
        &self,
        operation: AuditOperation,
        outcome: AuditOutcome,
        actor: Option<String>,
        tenant: Option<String>,
        model_id: Option<String>,
        metadata: HashMap<String, String>,
    ) {
        if let Some(sink) = &self.audit_sink {
            let mut event = AuditEvent::new(operation, outcome);
            event.actor = actor;
            event.tenant = tenant;
            event.model_id = model_id;
            event.metadata = metadata;
            if let Err(err) = sink.record(event) {
                tracing::warn!(error = %err, "failed to record audit event");
            }
        }
    }

    async fn ingest_inner(
        &self,
        request: IngestionRequest,
        extra_tags: HashMap<String, String>,
    ) -> Result<Vec<String>, IngestionError> {
        let content_hash = request.content_hash();
        let idempotency_key = request.idempotency_key().map(str::to_string);
        let lock_key = idempotency_key.clone().unwrap_or_else(|| content_hash.clone());

        let lock = self
            .locks
            .entry(lock_key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(key) = idempotency_key.as_deref() {
            if let Some(ids) = self.idempotency.get(key) {
                return Ok(ids.clone());
            }
        }
        if let Some(ids) = self.idempotency.get(&content_hash) {
            return Ok(ids.clone());
        }

        let result = self
            .ingest_uncached(request, &content_hash, idempotency_key.as_deref(), extra_tags)
            .await;

        self.locks.remove(&lock_key);

        if let Ok(chunk_ids) = &result {
            if let Some(key) = &idempotency_key {
                self.idempotency.insert(key.clone(), chunk_ids.clone());
            }
            self.idempotency.insert(content_hash, chunk_ids.clone());
        }

        result
    }

    async fn ingest_uncached(
        &self,
        request: IngestionRequest,
        content_hash: &str,
        idempotency_key: Option<&str>,
        extra_tags: HashMap<String, String>,
    ) -> Result<Vec<String>, IngestionError> {
        let model_id = request.model_id().unwrap_or(&self.default_model_id).to_string();

        let (text, mut tags) = extract_request_text(request)?;
        tags.insert("content_hash".to_string(), content_hash.to_string());
        tags.insert("model_id".to_string(), model_id.clone());
        if let Some(key) = idempotency_key {
            tags.insert("idempotency_key".to_string(), key.to_string());
        }
        for (k, v) in extra_tags {
            tags.insert(k, v);
        }
        let tenant = tags.get("tenant").cloned();

        let text = self.policy.apply(&text)?;

        let now = chrono_now_ms();
        let source = tags.get("filename").cloned();
        let mut chunks = self.chunker.chunk(&text, source, &tags, now).await;

        let snapshot_id = format!("wal-lsn-{}", self.snapshot_counter.fetch_add(1, Ordering::SeqCst));

        for (i, chunk) in chunks.iter_mut().enumerate() {
            chunk.id = format!("chunk-{content_hash}-{i}");
        }

        let window = self.config.dual_graph.chunking.cooccurrence_window;
        let chunk_tokens: Vec<(String, std::collections::HashSet<String>)> = chunks
            .iter()
            .map(|c| (c.id.clone(), tokenize(&c.content).collect()))
            .collect();

        let mut chunk_ids = Vec::with_capacity(chunks.len());
        {
            let mut lexical = self.lexical.write().await;
            let mut memory = self.memory.write().await;
            for (i, mut chunk) in chunks.into_iter().enumerate() {
                memory.record_access(&chunk.id, now);
                match self.embedder.embed(&chunk.content, &model_id).await {
                    Ok(embedding) => chunk.embedding = Some(embedding),
                    Err(err) => {
                        tracing::warn!(error = %err, chunk_id = %chunk.id, "embedding failed, continuing without it")
                    }
                }
                chunk_ids.push(chunk.id.clone());
                lexical.add_chunk(chunk);

                if i > 0 {
                    let (prev_id, _) = &chunk_tokens[i - 1];
                    let (curr_id, _) = &chunk_tokens[i];
                    lexical.add_relation(LexicalRelation {
                        id: format!("lexrel-seq-{content_hash}-{i}"),
                        source: prev_id.clone(),
                        target: curr_id.clone(),
                        relation_type: LexicalRelationType::Sequential,
                        weight: 1.0,
                    });
                }

                for distance in 1..=window.min(i) {
                    let (other_id, other_tokens) = &chunk_tokens[i - distance];
                    let (curr_id, curr_tokens) = &chunk_tokens[i];
                    if other_tokens.intersection(curr_tokens).next().is_some() {
                        lexical.add_relation(LexicalRelation {
                            id: format!("lexrel-cooc-{content_hash}-{i}-{distance}"),
                            source: other_id.clone(),
                            target: curr_id.clone(),
                            relation_type: LexicalRelationType::CoOccurrence,
                            weight: (1.0 - distance as f32 / window as f32).max(0.1),
                        });
                    }
                }
            }
        }

        if let Some(queue) = &self.job_queue {
            for id in &chunk_ids {
                let content = self
                    .lexical
                    .read()
                    .await
                    .get_chunk(id)
                    .map(|c| c.content)
                    .unwrap_or_default();
                let job = Job::ExtractEntities {
                    chunk_id: id.clone(),
                    content,
                    model_id: model_id.clone(),
                    snapshot_id: snapshot_id.clone(),
                    now,
                };
                if let Err(err) = queue.enqueue(job).await {
                    tracing::warn!(error = %err, chunk_id = %id, "failed to enqueue extraction job");
                }
            }
        }

        self.record_audit(
            AuditOperation::Ingest,
            AuditOutcome::Succeeded,
            None,
            tenant,
            Some(model_id),
            HashMap::new(),
        );

        Ok(chunk_ids)
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|t| t.to_lowercase())
        .filter(|t| t.len() >= 2 && t.len() <= 50)
}

fn chrono_now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn extract_request_text(
    request: IngestionRequest,
) -> Result<(String, HashMap<String, String>), IngestionError> {
    match request {
        IngestionRequest::Text { content, metadata, .. } => Ok((content, metadata)),
        IngestionRequest::File { filename, content, mime_type, mut metadata, .. } => {
            let kind = detect_content_kind(&mime_type, Some(&filename));
            metadata.insert("filename".to_string(), filename);
            metadata.insert("mime_type".to_string(), mime_type.clone());

            match kind {
                ContentKind::Text | ContentKind::Markdown | ContentKind::Json => {
                    let text = extract_utf8(&content).map_err(|_| IngestionError::InvalidUtf8)?;
                    Ok((text, metadata))
                }
                ContentKind::Pdf => {
                    if let Some(text) = extract_pdf_text(&content) {
                        Ok((text, metadata))
                    } else {
                        Err(IngestionError::ExtractionFailed("pdf".to_string()))
                    }
                }
                ContentKind::Unsupported => Err(IngestionError::UnsupportedType(mime_type)),
            }
        }
    }
}

#[allow(dead_code)]
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(SemanticChunker::new(ChunkingConfig::default()))
}
