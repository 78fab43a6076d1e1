//! The caller-supplied `context` object threaded through `Engine::add_memory`
//! and `Engine::query_memory` (spec section 6): who's asking, from what
//! session, when, from what source, plus an optional hint list of entities
//! already believed relevant.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryContext {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: Option<i64>,
    pub source: Option<String>,
    #[serde(default)]
    pub relevant_entities: Vec<String>,
}

impl MemoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds the context into the tag bag `IngestionRequest::Text.metadata`
    /// carries, so provenance survives into `ChunkMetadata.tags` alongside
    /// governance tags.
    pub fn as_tags(&self) -> HashMap<String, String> {
        let mut tags = HashMap::new();
        if let Some(user_id) = &self.user_id {
            tags.insert("user_id".to_string(), user_id.clone());
        }
        if let Some(session_id) = &self.session_id {
            tags.insert("session_id".to_string(), session_id.clone());
        }
        if let Some(source) = &self.source {
            tags.insert("source".to_string(), source.clone());
        }
        tags
    }
}
