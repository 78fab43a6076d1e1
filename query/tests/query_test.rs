use std::collections::HashMap;
use std::sync::Arc;

use alayasiki_core::config::{ClusteringSection, EngineConfig, ResolutionConfig};
use alayasiki_core::ingest::IngestionRequest;
use ingestion::embedding::DeterministicEmbedder;
use ingestion::processor::IngestionPipeline;
use jobs::queue::ChannelJobQueue;
use jobs::worker::Worker;
use query::dsl::{CrossGraphQuery, DomainQuery, LexicalQuery, QueryOptions, QueryRequest, SortBy};
use query::engine::QueryEngine;
use query::ResultKind;
use slm::ner::MockEntityExtractor;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn engine_over(pipeline: &IngestionPipeline) -> QueryEngine {
    QueryEngine::new(
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
    )
}

async fn pipeline_with_domain_graph() -> IngestionPipeline {
    let mut pipeline = IngestionPipeline::new(EngineConfig::default());

    let (tx, rx) = mpsc::channel(100);
    let job_queue = Arc::new(ChannelJobQueue::new(tx));
    let extractor = Arc::new(MockEntityExtractor::new());
    let worker = Worker::new(
        rx,
        pipeline.graph(),
        pipeline.index(),
        pipeline.temporal(),
        pipeline.cross_links(),
        pipeline.memory(),
        pipeline.persistence(),
        extractor,
        CancellationToken::new(),
    );
    tokio::spawn(async move {
        worker.run().await;
    });
    pipeline.set_job_queue(job_queue);

    pipeline
        .ingest(IngestionRequest::Text {
            content: "Rust is increasingly used for AI tooling and graph databases.".to_string(),
            metadata: HashMap::from([("source".to_string(), "market_report.txt".to_string())]),
            idempotency_key: Some("query-test-doc-1".to_string()),
            model_id: Some("embedding-default-v1".to_string()),
        })
        .await
        .unwrap();

    tokio::time::sleep(tokio::time::Duration::from_millis(300)).await;
    pipeline
}

#[test]
fn json_dsl_parses_defaults_and_rejects_empty_query() {
    let request = QueryRequest::parse_json(r#"{"lexical":{"text":"graph database"}}"#).unwrap();
    assert_eq!(request.options.top_k, 20);
    assert_eq!(request.options.sort_by, SortBy::Relevance);
    assert!(request.validate().is_ok());

    let empty = QueryRequest::parse_json("{}").unwrap();
    assert!(empty.validate().is_err());
}

#[tokio::test]
async fn lexical_query_surfaces_the_ingested_chunk() {
    let pipeline = pipeline_with_domain_graph().await;
    let engine = engine_over(&pipeline);

    let request = QueryRequest {
        lexical: LexicalQuery {
            text: Some("graph databases".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    let response = engine.execute(&request).await.unwrap();
    assert!(response.results.iter().any(|r| r.kind() == ResultKind::Chunk));
}

#[tokio::test]
async fn domain_query_filters_by_extracted_entity_label() {
    let pipeline = pipeline_with_domain_graph().await;
    let engine = engine_over(&pipeline);

    let request = QueryRequest {
        domain: DomainQuery {
            entity_types: vec!["Language".to_string()],
            ..Default::default()
        },
        ..Default::default()
    };
    let response = engine.execute(&request).await.unwrap();
    assert!(response.results.iter().any(|r| r.kind() == ResultKind::Entity));

    let no_match = QueryRequest {
        domain: DomainQuery {
            entity_types: vec!["Currency".to_string()],
            ..Default::default()
        },
        ..Default::default()
    };
    let response = engine.execute(&no_match).await.unwrap();
    assert!(response.results.iter().all(|r| r.kind() != ResultKind::Entity));
}

#[tokio::test]
async fn domain_query_filters_by_relation_type() {
    let pipeline = pipeline_with_domain_graph().await;
    let engine = engine_over(&pipeline);

    let request = QueryRequest {
        domain: DomainQuery {
            relation_types: vec!["related_to".to_string()],
            ..Default::default()
        },
        ..Default::default()
    };
    let response = engine.execute(&request).await.unwrap();
    assert!(response.results.iter().any(|r| r.kind() == ResultKind::Entity));
}

#[tokio::test]
async fn cross_graph_query_surfaces_entity_mention_links_after_extraction() {
    let pipeline = pipeline_with_domain_graph().await;
    let engine = engine_over(&pipeline);

    let request = QueryRequest {
        cross_graph: CrossGraphQuery {
            link_type: Some("entity_mention".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    let response = engine.execute(&request).await.unwrap();
    assert!(response.explain.cross_graph_matches > 0);
    assert!(response.results.iter().any(|r| r.kind() == ResultKind::CrossLink));
}

#[tokio::test]
async fn empty_cross_graph_catalogue_yields_no_cross_link_results() {
    // No job queue/worker wired in, so nothing ever extracts entities or
    // installs cross-links for this pipeline.
    let pipeline = IngestionPipeline::new(EngineConfig::default());
    let engine = engine_over(&pipeline);

    let request = QueryRequest {
        cross_graph: CrossGraphQuery {
            link_type: Some("entity_mention".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    let response = engine.execute(&request).await.unwrap();
    assert!(response.results.is_empty());
    assert_eq!(response.explain.cross_graph_matches, 0);
}

#[tokio::test]
async fn top_k_caps_the_combined_result_stream() {
    let pipeline = pipeline_with_domain_graph().await;
    let engine = engine_over(&pipeline);

    let request = QueryRequest {
        domain: DomainQuery {
            entity_name: Some("a".to_string()),
            ..Default::default()
        },
        options: QueryOptions {
            top_k: 1,
            ..Default::default()
        },
        ..Default::default()
    };
    let response = engine.execute(&request).await.unwrap();
    assert!(response.results.len() <= 1);
}

#[tokio::test]
async fn annotate_clusters_assigns_isolated_or_cluster_membership() {
    let pipeline = pipeline_with_domain_graph().await;
    let engine = engine_over(&pipeline);

    let request = QueryRequest {
        domain: DomainQuery {
            entity_types: vec!["Language".to_string(), "Topic".to_string(), "Concept".to_string()],
            ..Default::default()
        },
        options: QueryOptions {
            annotate_clusters: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let response = engine.execute(&request).await.unwrap();
    for item in response.results.iter().filter(|r| r.kind() == ResultKind::Entity) {
        assert!(item.cluster.is_some());
    }
}
