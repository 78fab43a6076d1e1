//! Query DSL for C11, the unified query processor: one request carries a
//! lexical sub-query, a domain sub-query, a cross-graph sub-query, and the
//! cross-cutting blocks (memory prioritization, entity resolution,
//! clustering, sort/limit) layered on top of all three.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_TOP_K: usize = 20;
const MAX_TOP_K: usize = 1_000;

/// Inverted-index match mode for [`LexicalQuery::text`]. `Phrase` degrades
/// to `All` at execution time (no positional index is maintained) but the
/// degradation is surfaced on the response rather than applied silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextMode {
    #[default]
    Any,
    All,
    Phrase,
}

/// The lexical sub-query: free-text search over chunk content, vector
/// similarity over chunk embeddings, and/or a chunk-type filter. A lexical
/// result matches if it satisfies any one of the three that was supplied
/// (the three are unioned, not intersected).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct LexicalQuery {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub text_mode: TextMode,
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
    #[serde(default)]
    pub chunk_type: Option<String>,
}

impl LexicalQuery {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.vector.is_none() && self.chunk_type.is_none()
    }
}

/// The domain sub-query: entity-type filter, entity-name substring/fuzzy
/// filter, relationship-type filter, vector similarity over entity
/// embeddings. When every field is empty and the lexical query carries
/// free text, the engine falls back to matching entity name/properties
/// against that text (section 4.9 step 3).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct DomainQuery {
    #[serde(default)]
    pub entity_types: Vec<String>,
    #[serde(default)]
    pub entity_name: Option<String>,
    #[serde(default)]
    pub relation_types: Vec<String>,
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
}

impl DomainQuery {
    pub fn is_empty(&self) -> bool {
        self.entity_types.is_empty()
            && self.entity_name.is_none()
            && self.relation_types.is_empty()
            && self.vector.is_none()
    }
}

/// The cross-graph sub-query: filter the link catalogue by link type and
/// by which side of the dual graph each endpoint lives on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct CrossGraphQuery {
    #[serde(default)]
    pub link_type: Option<String>,
    #[serde(default)]
    pub source_graph: Option<String>,
    #[serde(default)]
    pub target_graph: Option<String>,
}

impl CrossGraphQuery {
    pub fn is_empty(&self) -> bool {
        self.link_type.is_none() && self.source_graph.is_none() && self.target_graph.is_none()
    }
}

/// How the merged result stream is ordered before the result cap is
/// applied. Ties break by newer-first creation time, then by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Relevance,
    Confidence,
    Timestamp,
}

/// Cross-cutting blocks that apply across all three sub-queries once their
/// partial result sets are in hand.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueryOptions {
    #[serde(default)]
    pub prioritize_memory: bool,
    #[serde(default)]
    pub resolve_entities: bool,
    #[serde(default)]
    pub annotate_clusters: bool,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Evaluate the query as of this Unix-millisecond timestamp instead of
    /// "now" (section 4.7's `asOf` temporal query capability).
    #[serde(default)]
    pub as_of: Option<i64>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            prioritize_memory: false,
            resolve_entities: false,
            annotate_clusters: false,
            sort_by: SortBy::default(),
            top_k: default_top_k(),
            as_of: None,
        }
    }
}

const fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// A unified query request: zero, one, two, or all three sub-queries may
/// be populated. An entirely empty request (no lexical text/vector, no
/// domain filter, no cross-graph filter) is rejected by [`QueryRequest::validate`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct QueryRequest {
    #[serde(default)]
    pub lexical: LexicalQuery,
    #[serde(default)]
    pub domain: DomainQuery,
    #[serde(default)]
    pub cross_graph: CrossGraphQuery,
    #[serde(default)]
    pub options: QueryOptions,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryValidationError {
    #[error("at least one of lexical, domain, or cross_graph must be populated")]
    EmptyQuery,
    #[error("options.top_k must be between 1 and {0}")]
    InvalidTopK(usize),
    #[error("domain.entity_types must not contain empty values")]
    InvalidEntityTypeFilter,
    #[error("domain.relation_types must not contain empty values")]
    InvalidRelationTypeFilter,
}

impl QueryRequest {
    pub fn parse_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), QueryValidationError> {
        if self.lexical.is_empty() && self.domain.is_empty() && self.cross_graph.is_empty() {
            return Err(QueryValidationError::EmptyQuery);
        }
        if self.options.top_k == 0 || self.options.top_k > MAX_TOP_K {
            return Err(QueryValidationError::InvalidTopK(MAX_TOP_K));
        }
        if has_empty_values(&self.domain.entity_types) {
            return Err(QueryValidationError::InvalidEntityTypeFilter);
        }
        if has_empty_values(&self.domain.relation_types) {
            return Err(QueryValidationError::InvalidRelationTypeFilter);
        }
        Ok(())
    }
}

fn has_empty_values(values: &[String]) -> bool {
    values.iter().any(|value| value.trim().is_empty())
}
