//! Lexical graph catalogue: text chunks and the relations between them
//! (`sequential`, `co_occurrence`, `similarity`), plus the token and
//! chunk-type retrieval indices spec 4.6 calls for. Grounded on
//! `graph_store.rs`'s plain-`HashMap`-behind-a-struct shape, since the
//! lexical graph needs the same CRUD + reverse-index pattern as the
//! domain graph but over `TextChunk`/`LexicalRelation` instead of
//! `Node`/`Edge`.

use alayasiki_core::model::{ChunkType, LexicalRelation, TextChunk};
use std::collections::{HashMap, HashSet};

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|t| t.to_lowercase())
        .filter(|t| t.len() >= 2 && t.len() <= 50)
}

#[derive(Default)]
pub struct LexicalStore {
    chunks: HashMap<String, TextChunk>,
    relations: HashMap<String, LexicalRelation>,
    out_relations: HashMap<String, Vec<String>>,
    token_index: HashMap<String, HashSet<String>>,
    chunk_type_index: HashMap<ChunkType, HashSet<String>>,
}

impl LexicalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chunk(&mut self, chunk: TextChunk) {
        for token in tokenize(&chunk.content) {
            self.token_index.entry(token).or_default().insert(chunk.id.clone());
        }
        self.chunk_type_index
            .entry(chunk.metadata.chunk_type)
            .or_default()
            .insert(chunk.id.clone());
        self.chunks.insert(chunk.id.clone(), chunk);
    }

    pub fn get_chunk(&self, id: &str) -> Option<TextChunk> {
        self.chunks.get(id).cloned()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn add_relation(&mut self, relation: LexicalRelation) {
        self.out_relations
            .entry(relation.source.clone())
            .or_default()
            .push(relation.id.clone());
        self.relations.insert(relation.id.clone(), relation);
    }

    pub fn out_relations(&self, chunk_id: &str) -> Vec<LexicalRelation> {
        self.out_relations
            .get(chunk_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.relations.get(id).cloned())
            .collect()
    }

    pub fn query_token(&self, token: &str) -> HashSet<String> {
        self.token_index.get(&token.to_lowercase()).cloned().unwrap_or_default()
    }

    pub fn query_chunk_type(&self, chunk_type: ChunkType) -> HashSet<String> {
        self.chunk_type_index.get(&chunk_type).cloned().unwrap_or_default()
    }

    pub fn remove_chunk(&mut self, id: &str) -> Option<TextChunk> {
        let chunk = self.chunks.remove(id)?;
        for ids in self.token_index.values_mut() {
            ids.remove(id);
        }
        if let Some(ids) = self.chunk_type_index.get_mut(&chunk.metadata.chunk_type) {
            ids.remove(id);
        }
        if let Some(out) = self.out_relations.remove(id) {
            for relation_id in out {
                self.relations.remove(&relation_id);
            }
        }
        self.relations.retain(|_, r| r.target != id);
        Some(chunk)
    }

    pub fn all_chunks(&self) -> impl Iterator<Item = &TextChunk> {
        self.chunks.values()
    }
}
