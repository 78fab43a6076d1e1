use std::collections::HashMap;
use std::sync::Arc;

use alayasiki_core::config::{ClusteringSection, EngineConfig, ResolutionConfig};
use alayasiki_core::ingest::IngestionRequest;
use ingestion::embedding::DeterministicEmbedder;
use ingestion::processor::IngestionPipeline;
use query::dsl::LexicalQuery;
use query::dsl::QueryRequest;
use query::engine::QueryEngine;

#[tokio::test]
async fn query_excludes_retention_expired_chunks() {
    let pipeline = IngestionPipeline::new(EngineConfig::default());
    let ids = pipeline
        .ingest(IngestionRequest::Text {
            content: "expired evidence about EV strategy".to_string(),
            metadata: HashMap::new(),
            idempotency_key: None,
            model_id: None,
        })
        .await
        .unwrap();
    let chunk_id = ids[0].clone();

    {
        let lexical = pipeline.lexical();
        let mut store = lexical.write().await;
        let mut chunk = store.remove_chunk(&chunk_id).unwrap();
        chunk.metadata.tags.insert("retention_until_unix".to_string(), "1".to_string());
        store.add_chunk(chunk);
    }

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

    let request = QueryRequest {
        lexical: LexicalQuery {
            text: Some("EV strategy".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    let response = engine.execute(&request).await.unwrap();
    assert!(response.results.is_empty());
    assert_eq!(response.explain.retention_excluded, 1);
}
