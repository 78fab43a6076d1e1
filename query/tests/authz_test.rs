use std::collections::HashMap;
use std::sync::Arc;

use alayasiki_core::auth::{Authorizer, AuthzError, Principal, ResourceContext};
use alayasiki_core::config::{ClusteringSection, EngineConfig, ResolutionConfig};
use alayasiki_core::ingest::IngestionRequest;
use ingestion::embedding::DeterministicEmbedder;
use ingestion::processor::IngestionPipeline;
use query::dsl::{LexicalQuery, QueryRequest};
use query::engine::{QueryEngine, QueryError};

async fn build_engine() -> (IngestionPipeline, QueryEngine) {
    let pipeline = IngestionPipeline::new(EngineConfig::default());
    pipeline
        .ingest(IngestionRequest::Text {
            content: "Toyota expands EV strategy across new markets.".to_string(),
            metadata: HashMap::new(),
            idempotency_key: None,
            model_id: None,
        })
        .await
        .unwrap();

    let engine = QueryEngine::new(
        pipeline.graph(),
        pipeline.lexical(),
        pipeline.cross_links(),
        pipeline.index(),
        pipeline.temporal(),
        pipeline.memory(),
        ResolutionConfig::default(),
        ClusteringSection::default(),
        Arc::new(DeterministicEmbedder::default()),
        "embedding-default-v1",
    );
    (pipeline, engine)
}

fn request() -> QueryRequest {
    QueryRequest {
        lexical: LexicalQuery {
            text: Some("EV strategy".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn execute_authorized_allows_reader_role() {
    let (pipeline, engine) = build_engine().await;
    let principal = Principal::new("user-1", "acme").with_roles(["reader"]);
    let authorizer = Authorizer::default();
    let resource = ResourceContext::new("acme");

    let response = engine
        .execute_authorized(&request(), &principal, &authorizer, &resource, &pipeline.snapshot_id())
        .await
        .unwrap();

    assert!(!response.results.is_empty());
}

#[tokio::test]
async fn execute_authorized_denies_ingestor_role() {
    let (pipeline, engine) = build_engine().await;
    let principal = Principal::new("user-1", "acme").with_roles(["ingestor"]);
    let authorizer = Authorizer::default();
    let resource = ResourceContext::new("acme");

    let err = engine
        .execute_authorized(&request(), &principal, &authorizer, &resource, &pipeline.snapshot_id())
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::Unauthorized(AuthzError::PermissionDenied { .. })));
}

#[tokio::test]
async fn execute_authorized_enforces_tenant_boundary() {
    let (pipeline, engine) = build_engine().await;
    let principal = Principal::new("user-1", "acme").with_roles(["reader"]);
    let authorizer = Authorizer::default();
    let resource = ResourceContext::new("other-tenant");

    let err = engine
        .execute_authorized(&request(), &principal, &authorizer, &resource, &pipeline.snapshot_id())
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::Unauthorized(AuthzError::TenantMismatch { .. })));
}
