//! Chunking (C7, first stage): sentence-level splitting first; if no
//! sentence falls within `[minChunkSize, maxChunkSize]`, fall back to
//! paragraph-level (blank-line split); otherwise emit a single
//! document-level chunk covering the whole input.

use alayasiki_core::config::ChunkingConfig;
use alayasiki_core::model::{ChunkMetadata, ChunkType, TextChunk};
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait Chunker: Send + Sync {
    async fn chunk(
        &self,
        content: &str,
        source: Option<String>,
        tags: &HashMap<String, String>,
        now: i64,
    ) -> Vec<TextChunk>;
}

pub struct SemanticChunker {
    config: ChunkingConfig,
}

impl SemanticChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }
}

impl Default for SemanticChunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'!' | b'?') {
            let end = i + 1;
            let candidate = text[start..end].trim();
            if !candidate.is_empty() {
                sentences.push(candidate);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn split_paragraphs(text: &str) -> Vec<&str> {
    text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()).collect()
}

/// Length adequacy + terminal punctuation presence + whitespace ratio,
/// each scaled by its configured weight. The Open Question this resolves
/// (spec section 9) is which weights to use by default; they are
/// configurable rather than fixed.
fn chunk_confidence(text: &str, config: &ChunkingConfig) -> f32 {
    let len = text.len();
    let length_score = if len >= config.min_chunk_size && len <= config.max_chunk_size {
        1.0
    } else if len < config.min_chunk_size {
        len as f32 / config.min_chunk_size.max(1) as f32
    } else {
        (config.max_chunk_size.max(1) as f32 / len as f32).min(1.0)
    };

    let punctuation_score = if text.trim_end().ends_with(['.', '!', '?']) { 1.0 } else { 0.0 };

    let whitespace_count = text.chars().filter(|c| c.is_whitespace()).count();
    let whitespace_ratio = whitespace_count as f32 / len.max(1) as f32;
    let whitespace_score = (1.0 - (whitespace_ratio - 0.15).abs() / 0.15).clamp(0.0, 1.0);

    (config.length_weight * length_score
        + config.punctuation_weight * punctuation_score
        + config.whitespace_weight * whitespace_score)
        .clamp(0.0, 1.0)
}

/// Ids are placeholders (`chunk-<granularity>-<position>`); the pipeline
/// overwrites them with a content-derived id once chunking is done so the
/// same content re-ingested produces the same chunk ids.
fn build_chunk(
    index: usize,
    position: usize,
    content: &str,
    chunk_type: ChunkType,
    source: Option<String>,
    tags: &HashMap<String, String>,
    now: i64,
    config: &ChunkingConfig,
) -> TextChunk {
    TextChunk {
        id: format!("chunk-{index}-{position}"),
        content: content.to_string(),
        metadata: ChunkMetadata {
            source,
            timestamp: now,
            chunk_type,
            position,
            confidence: chunk_confidence(content, config),
            tags: tags.clone(),
        },
        embedding: None,
    }
}

#[async_trait]
impl Chunker for SemanticChunker {
    async fn chunk(
        &self,
        content: &str,
        source: Option<String>,
        tags: &HashMap<String, String>,
        now: i64,
    ) -> Vec<TextChunk> {
        let sentences = split_sentences(content);
        let any_sentence_fits = sentences
            .iter()
            .any(|s| s.len() >= self.config.min_chunk_size && s.len() <= self.config.max_chunk_size);

        if any_sentence_fits {
            return sentences
                .into_iter()
                .enumerate()
                .map(|(i, text)| build_chunk(0, i, text, ChunkType::Sentence, source.clone(), tags, now, &self.config))
                .collect();
        }

        let paragraphs = split_paragraphs(content);
        let any_paragraph_fits = paragraphs
            .iter()
            .any(|p| p.len() >= self.config.min_chunk_size && p.len() <= self.config.max_chunk_size);

        if any_paragraph_fits {
            return paragraphs
                .into_iter()
                .enumerate()
                .map(|(i, text)| build_chunk(1, i, text, ChunkType::Paragraph, source.clone(), tags, now, &self.config))
                .collect();
        }

        vec![build_chunk(2, 0, content.trim(), ChunkType::Document, source, tags, now, &self.config)]
    }
}
