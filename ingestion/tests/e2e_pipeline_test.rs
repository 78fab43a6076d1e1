use std::collections::HashMap;
use std::sync::Arc;

use alayasiki_core::config::EngineConfig;
use alayasiki_core::ingest::IngestionRequest;
use ingestion::processor::IngestionPipeline;
use jobs::queue::ChannelJobQueue;
use jobs::worker::Worker;
use slm::ner::MockEntityExtractor;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_e2e_multi_document_ingest_builds_lexical_graph() {
    let pipeline = IngestionPipeline::new(EngineConfig::default());

    let mut company_meta = HashMap::new();
    company_meta.insert("source".to_string(), "report/toyota-2024.md".to_string());

    let mut policy_meta = HashMap::new();
    policy_meta.insert("source".to_string(), "policy/ev-2022.md".to_string());

    let company_ids = pipeline
        .ingest(IngestionRequest::Text {
            content: "Toyota expands EV battery partnerships in 2024. Toyota is a major automaker.".to_string(),
            metadata: company_meta,
            idempotency_key: Some("e2e-doc-company".to_string()),
            model_id: Some("embedding-default-v1".to_string()),
        })
        .await
        .unwrap();

    let policy_ids = pipeline
        .ingest(IngestionRequest::Text {
            content: "Government policy update for EV recycling in 2022.".to_string(),
            metadata: policy_meta,
            idempotency_key: Some("e2e-doc-policy".to_string()),
            model_id: Some("embedding-default-v1".to_string()),
        })
        .await
        .unwrap();

    assert!(!company_ids.is_empty());
    assert!(!policy_ids.is_empty());

    let lexical = pipeline.lexical();
    let store = lexical.read().await;
    assert_eq!(store.chunk_count(), company_ids.len() + policy_ids.len());

    // Co-occurrence should link the two chunks in the Toyota document, which
    // repeats "Toyota" across sentence boundaries.
    if company_ids.len() > 1 {
        let relations = store.out_relations(&company_ids[0]);
        assert!(!relations.is_empty());
    }
}

#[tokio::test]
async fn test_e2e_job_queue_driven_domain_graph_population() {
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
    let _worker_handle = tokio::spawn(async move {
        worker.run().await;
    });

    pipeline.set_job_queue(job_queue);

    pipeline
        .ingest(IngestionRequest::Text {
            content: "Rust is increasingly used for AI tooling and graph databases."
                .to_string(),
            metadata: HashMap::from([("source".to_string(), "market_report.txt".to_string())]),
            idempotency_key: Some("doc-1".to_string()),
            model_id: Some("embedding-default-v1".to_string()),
        })
        .await
        .unwrap();

    tokio::time::sleep(tokio::time::Duration::from_millis(300)).await;

    let graph = pipeline.graph();
    let store = store_node_count(&graph).await;
    assert!(store > 0, "expected entity extraction to populate the domain graph");
}

async fn store_node_count(
    graph: &Arc<tokio::sync::RwLock<storage::graph_store::GraphStore>>,
) -> usize {
    graph.read().await.node_count()
}
