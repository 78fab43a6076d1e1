use std::collections::HashMap;
use std::sync::Arc;

use alayasiki_core::auth::{Authorizer, Principal, ResourceContext};
use alayasiki_core::config::{ClusteringSection, EngineConfig, ResolutionConfig};
use alayasiki_core::error::{AlayasikiError, ErrorCode};
use alayasiki_core::ingest::IngestionRequest;
use ingestion::embedding::DeterministicEmbedder;
use ingestion::processor::IngestionPipeline;
use query::dsl::{LexicalQuery, QueryOptions, QueryRequest};
use query::engine::{QueryEngine, QueryError};

async fn engine() -> (IngestionPipeline, QueryEngine) {
    let pipeline = IngestionPipeline::new(EngineConfig::default());
    pipeline
        .ingest(IngestionRequest::Text {
            content: "Toyota expands EV strategy.".to_string(),
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

#[tokio::test]
async fn invalid_top_k_maps_to_invalid_argument() {
    let (_pipeline, engine) = engine().await;
    let request = QueryRequest {
        lexical: LexicalQuery {
            text: Some("EV".to_string()),
            ..Default::default()
        },
        options: QueryOptions {
            top_k: 0,
            ..Default::default()
        },
        ..Default::default()
    };

    let err = engine.execute(&request).await.unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidArgument);
    assert!(matches!(err, QueryError::InvalidQuery(_)));
}

#[tokio::test]
async fn empty_request_maps_to_invalid_argument() {
    let (_pipeline, engine) = engine().await;
    let err = engine.execute(&QueryRequest::default()).await.unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidArgument);
}

#[tokio::test]
async fn unauthorized_query_maps_to_permission_denied() {
    let (pipeline, engine) = engine().await;
    let principal = Principal::new("user-1", "acme").with_roles(["ingestor"]);
    let authorizer = Authorizer::default();
    let resource = ResourceContext::new("acme");

    let request = QueryRequest {
        lexical: LexicalQuery {
            text: Some("EV".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    let err = engine
        .execute_authorized(&request, &principal, &authorizer, &resource, &pipeline.snapshot_id())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::PermissionDenied);
}
