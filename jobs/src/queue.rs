use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Background work staged off the request path. Each variant corresponds
/// to a unit of the C7 ingestion pipeline or a maintenance sweep that
/// doesn't need to block a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Job {
    ExtractEntities {
        chunk_id: String,
        content: String,
        model_id: String,
        snapshot_id: String,
        now: i64,
    },
    ResolveEntities {
        node_ids: Vec<String>,
    },
    RebuildClusters {
        node_type: Option<String>,
        now: i64,
    },
    InvalidateExpiredRelations {
        cutoff_unix_ms: i64,
    },
    EvictOverflow {
        now: i64,
        temporal_cutoff_age: i64,
    },
    FlushShards {
        at: i64,
    },
}

#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> anyhow::Result<()>;
}

/// Simple in-memory queue using Tokio channels.
pub struct ChannelJobQueue {
    sender: mpsc::Sender<Job>,
}

impl ChannelJobQueue {
    pub fn new(sender: mpsc::Sender<Job>) -> Self {
        Self { sender }
    }
}

#[async_trait::async_trait]
impl JobQueue for ChannelJobQueue {
    async fn enqueue(&self, job: Job) -> anyhow::Result<()> {
        self.sender.send(job).await.map_err(|e| anyhow::anyhow!("queue send error: {e}"))
    }
}
