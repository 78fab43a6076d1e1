//! C12 persistence: JSONL shard files for nodes/edges/deletions/lexical
//! graphs/domain graphs/cross-graph links, optionally gzip- or
//! brotli-compressed, backed by the WAL for durability of in-flight writes
//! and the snapshot manager for periodic full-state checkpoints. Grounded
//! on `repo.rs`'s open/replay/backup shape, with the on-disk format moved
//! from `rkyv` to JSONL per the data model's serde realization.

use crate::crypto::AtRestCipher;
use crate::snapshot::{SnapshotError, SnapshotManager};
use crate::wal::{Wal, WalError};
use alayasiki_core::config::{CompressionAlgorithm, StorageConfig};
use alayasiki_core::error::{AlayasikiError, ErrorCode};
use alayasiki_core::model::{CrossGraphLink, DomainRelation, Edge, LexicalRelation, Node, TextChunk};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("wal error: {0}")]
    Wal(#[from] WalError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl AlayasikiError for PersistenceError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::Internal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardKind {
    Nodes,
    Edges,
    Deletions,
    LexicalGraphs,
    DomainGraphs,
    CrossGraphLinks,
}

impl ShardKind {
    fn dir_name(&self) -> &'static str {
        match self {
            ShardKind::Nodes => "nodes",
            ShardKind::Edges => "edges",
            ShardKind::Deletions => "deletions",
            ShardKind::LexicalGraphs => "lexical_graphs",
            ShardKind::DomainGraphs => "domain_graphs",
            ShardKind::CrossGraphLinks => "cross_graph_links",
        }
    }
}

/// Which side of the graph a deletion tombstone refers to, per the
/// `node_delete`/`edge_delete` envelope `type` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionKind {
    Node,
    Edge,
}

impl DeletionKind {
    fn type_tag(&self) -> &'static str {
        match self {
            DeletionKind::Node => "node_delete",
            DeletionKind::Edge => "edge_delete",
        }
    }
}

/// Formats a Unix-ms timestamp as ISO-8601 (RFC 3339, millisecond
/// precision), the wire representation every shard envelope uses.
fn to_iso8601(unix_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(unix_ms)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).expect("epoch is representable"))
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn compressed_extension(algorithm: CompressionAlgorithm) -> &'static str {
    match algorithm {
        CompressionAlgorithm::Gzip => "jsonl.gz",
        CompressionAlgorithm::Brotli => "jsonl.br",
    }
}

fn compress(algorithm: CompressionAlgorithm, data: &[u8]) -> std::io::Result<Vec<u8>> {
    match algorithm {
        CompressionAlgorithm::Gzip => {
            let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
        CompressionAlgorithm::Brotli => {
            let mut output = Vec::new();
            let params = brotli::enc::BrotliEncoderParams::default();
            brotli::BrotliCompress(&mut std::io::Cursor::new(data), &mut output, &params)?;
            Ok(output)
        }
    }
}

fn decompress(algorithm: CompressionAlgorithm, data: &[u8]) -> std::io::Result<Vec<u8>> {
    match algorithm {
        CompressionAlgorithm::Gzip => {
            use std::io::Read;
            let mut decoder = flate2::read::GzDecoder::new(data);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            Ok(out)
        }
        CompressionAlgorithm::Brotli => {
            let mut out = Vec::new();
            brotli::BrotliDecompress(&mut std::io::Cursor::new(data), &mut out)?;
            Ok(out)
        }
    }
}

fn decompress_by_extension(path: &Path, raw: &[u8]) -> std::io::Result<Vec<u8>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("gz") => decompress(CompressionAlgorithm::Gzip, raw),
        Some("br") => decompress(CompressionAlgorithm::Brotli, raw),
        _ => Ok(raw.to_vec()),
    }
}

async fn write_lines(dir: &Path, kind: ShardKind, timestamp: i64, body: Vec<u8>, config: &StorageConfig) -> Result<PathBuf, PersistenceError> {
    fs::create_dir_all(dir).await?;

    let (bytes, ext) = if config.compression_enabled {
        (compress(config.compression_algorithm, &body)?, compressed_extension(config.compression_algorithm))
    } else {
        (body, "jsonl")
    };

    let path = dir.join(format!("{}_{timestamp}.{ext}", kind.dir_name().trim_end_matches('s')));
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, &bytes).await?;
    fs::rename(&tmp_path, &path).await?;
    Ok(path)
}

/// Writes `items` as a single JSONL shard file, one `{type, data, timestamp}`
/// envelope per line, named `<kind>_<timestamp>.<ext>` under
/// `data_dir/<kind_dir>/`. `type_tag` identifies the payload shape (e.g.
/// `"node"`, `"lexical_chunk"`) since a single `ShardKind` directory can hold
/// more than one JSON shape (the lexical shard holds both chunks and
/// relations).
pub async fn write_shard<T: Serialize>(
    data_dir: &Path,
    kind: ShardKind,
    type_tag: &str,
    timestamp: i64,
    items: &[T],
    config: &StorageConfig,
) -> Result<PathBuf, PersistenceError> {
    let ts = to_iso8601(timestamp);
    let mut body = Vec::new();
    for item in items {
        let envelope = serde_json::json!({ "type": type_tag, "data": item, "timestamp": ts });
        serde_json::to_writer(&mut body, &envelope)?;
        body.push(b'\n');
    }
    write_lines(&data_dir.join(kind.dir_name()), kind, timestamp, body, config).await
}

/// Writes deletion tombstones as `{type: "node_delete" | "edge_delete", id,
/// timestamp}` envelopes, one per line.
pub async fn write_deletion_shard(
    data_dir: &Path,
    dkind: DeletionKind,
    timestamp: i64,
    ids: &[String],
    config: &StorageConfig,
) -> Result<PathBuf, PersistenceError> {
    let ts = to_iso8601(timestamp);
    let mut body = Vec::new();
    for id in ids {
        let envelope = serde_json::json!({ "type": dkind.type_tag(), "id": id, "timestamp": ts });
        serde_json::to_writer(&mut body, &envelope)?;
        body.push(b'\n');
    }
    write_lines(&data_dir.join(ShardKind::Deletions.dir_name()), ShardKind::Deletions, timestamp, body, config).await
}

#[derive(Deserialize)]
struct ShardEnvelope<T> {
    data: T,
}

/// Reads a JSONL shard file written by `write_shard`, auto-detecting
/// compression from its extension and unwrapping the `{type, data,
/// timestamp}` envelope.
pub async fn read_shard<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PersistenceError> {
    let raw = fs::read(path).await?;
    let decompressed = decompress_by_extension(path, &raw)?;

    let mut items = Vec::new();
    for line in decompressed.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }
        let envelope: ShardEnvelope<T> = serde_json::from_slice(line)?;
        items.push(envelope.data);
    }
    Ok(items)
}

#[derive(Deserialize)]
struct DeletionEnvelope {
    #[serde(rename = "type")]
    type_: String,
    id: String,
}

/// Reads a deletion shard written by `write_deletion_shard`, returning
/// `(kind_tag, id)` pairs so callers can filter by `"node_delete"` /
/// `"edge_delete"`.
pub async fn read_deletion_shard(path: &Path) -> Result<Vec<(String, String)>, PersistenceError> {
    let raw = fs::read(path).await?;
    let decompressed = decompress_by_extension(path, &raw)?;

    let mut items = Vec::new();
    for line in decompressed.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }
        let envelope: DeletionEnvelope = serde_json::from_slice(line)?;
        items.push((envelope.type_, envelope.id));
    }
    Ok(items)
}

/// Lists shard files under `data_dir/<kind_dir>/` in lexicographic (hence
/// chronological, given the zero-padded-free timestamp naming) order —
/// recovery replays them in this order before applying any tombstones.
pub async fn list_shards(data_dir: &Path, kind: ShardKind) -> Result<Vec<PathBuf>, PersistenceError> {
    let dir = data_dir.join(kind.dir_name());
    if !dir.as_path().exists() {
        return Ok(Vec::new());
    }
    let mut entries = fs::read_dir(&dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.path().extension().is_some() {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Ties the WAL, snapshot manager, and JSONL shard files together behind
/// one handle. WAL entries cover in-flight mutations since the last shard
/// flush; shards are the durable, queryable-at-rest representation.
pub struct PersistenceManager {
    data_dir: PathBuf,
    config: StorageConfig,
    wal: Arc<Mutex<Wal>>,
    snapshots: SnapshotManager,
}

impl PersistenceManager {
    pub async fn open(data_dir: impl AsRef<Path>, config: StorageConfig, cipher: Arc<dyn AtRestCipher>) -> Result<Self, PersistenceError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let wal_path = data_dir.join("wal.log");
        let wal = Wal::open_with_cipher(&wal_path, cipher).await?;
        let snapshots = SnapshotManager::new(data_dir.join("backups"));
        Ok(Self {
            data_dir,
            config,
            wal: Arc::new(Mutex::new(wal)),
            snapshots,
        })
    }

    pub async fn append_wal(&self, payload: &[u8]) -> Result<u64, PersistenceError> {
        let mut wal = self.wal.lock().await;
        Ok(wal.append(payload).await?)
    }

    pub async fn flush_node_shard(&self, nodes: &[Node], at: i64) -> Result<PathBuf, PersistenceError> {
        write_shard(&self.data_dir, ShardKind::Nodes, "node", at, nodes, &self.config).await
    }

    pub async fn flush_edge_shard(&self, edges: &[Edge], at: i64) -> Result<PathBuf, PersistenceError> {
        write_shard(&self.data_dir, ShardKind::Edges, "edge", at, edges, &self.config).await
    }

    pub async fn flush_node_deletion_shard(&self, deleted_ids: &[String], at: i64) -> Result<PathBuf, PersistenceError> {
        write_deletion_shard(&self.data_dir, DeletionKind::Node, at, deleted_ids, &self.config).await
    }

    pub async fn flush_edge_deletion_shard(&self, deleted_ids: &[String], at: i64) -> Result<PathBuf, PersistenceError> {
        write_deletion_shard(&self.data_dir, DeletionKind::Edge, at, deleted_ids, &self.config).await
    }

    pub async fn flush_lexical_shard(&self, chunks: &[TextChunk], relations: &[LexicalRelation], at: i64) -> Result<(PathBuf, PathBuf), PersistenceError> {
        let chunk_path = write_shard(&self.data_dir, ShardKind::LexicalGraphs, "lexical_chunk", at, chunks, &self.config).await?;
        let relation_path = write_shard(&self.data_dir, ShardKind::LexicalGraphs, "lexical_relation", at + 1, relations, &self.config).await?;
        Ok((chunk_path, relation_path))
    }

    pub async fn flush_domain_shard(&self, relations: &[DomainRelation], at: i64) -> Result<PathBuf, PersistenceError> {
        write_shard(&self.data_dir, ShardKind::DomainGraphs, "domain_relation", at, relations, &self.config).await
    }

    pub async fn flush_cross_link_shard(&self, links: &[CrossGraphLink], at: i64) -> Result<PathBuf, PersistenceError> {
        write_shard(&self.data_dir, ShardKind::CrossGraphLinks, "cross_graph_link", at, links, &self.config).await
    }

    /// Loads every node shard in chronological order, then applies
    /// `node_delete` deletion-shard tombstones last.
    pub async fn recover_nodes(&self) -> Result<Vec<Node>, PersistenceError> {
        let mut nodes = Vec::new();
        for path in list_shards(&self.data_dir, ShardKind::Nodes).await? {
            nodes.extend(read_shard::<Node>(&path).await?);
        }

        let mut deleted = std::collections::HashSet::new();
        for path in list_shards(&self.data_dir, ShardKind::Deletions).await? {
            for (type_tag, id) in read_deletion_shard(&path).await? {
                if type_tag == DeletionKind::Node.type_tag() {
                    deleted.insert(id);
                }
            }
        }
        nodes.retain(|n| !deleted.contains(&n.id));
        Ok(nodes)
    }

    /// Loads every edge shard in chronological order, then applies
    /// `edge_delete` deletion-shard tombstones last.
    pub async fn recover_edges(&self) -> Result<Vec<Edge>, PersistenceError> {
        let mut edges = Vec::new();
        for path in list_shards(&self.data_dir, ShardKind::Edges).await? {
            edges.extend(read_shard::<Edge>(&path).await?);
        }

        let mut deleted = std::collections::HashSet::new();
        for path in list_shards(&self.data_dir, ShardKind::Deletions).await? {
            for (type_tag, id) in read_deletion_shard(&path).await? {
                if type_tag == DeletionKind::Edge.type_tag() {
                    deleted.insert(id);
                }
            }
        }
        edges.retain(|e| !deleted.contains(&e.id));
        Ok(edges)
    }

    pub async fn create_backup(&self, lsn: u64, data: &[u8]) -> Result<PathBuf, PersistenceError> {
        Ok(self.snapshots.create_snapshot(lsn, data).await?)
    }

    pub async fn latest_backup(&self) -> Result<Option<(u64, PathBuf)>, PersistenceError> {
        Ok(self.snapshots.latest_snapshot().await?)
    }

    /// Deletes shard and backup files older than `retention_days` measured
    /// from `now` (Unix ms), per `StorageConfig::backup_retention_days`.
    pub async fn apply_retention(&self, now: i64) -> Result<usize, PersistenceError> {
        let cutoff = now - (self.config.backup_retention_days as i64) * 86_400_000;
        let backups_dir = self.data_dir.join("backups");
        if !backups_dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        let mut entries = fs::read_dir(&backups_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Ok(metadata) = entry.metadata().await {
                if let Ok(modified) = metadata.modified() {
                    let modified_ms = modified
                        .duration_since(std::time::UNIX_EPOCH)
                        .map(|d| d.as_millis() as i64)
                        .unwrap_or(0);
                    if modified_ms < cutoff {
                        fs::remove_file(entry.path()).await?;
                        removed += 1;
                    }
                }
            }
        }
        Ok(removed)
    }
}
