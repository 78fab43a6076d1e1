//! Dual-graph data model: nodes and edges of the domain graph, chunks and
//! lexical relations of the lexical graph, cross-graph links binding them,
//! and the clustering types layered on top.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A typed property value. Plain `String` property bags can't support the
/// property index's numeric range operators (`lt`/`gt`/`lte`/`gte`), so
/// values carry a type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

pub type PropertyBag = HashMap<String, PropertyValue>;

/// Reason a relationship's validity window was closed. Closed set per
/// spec section 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationReason {
    Superseded,
    Contradicted,
    Expired,
    ManuallyInvalidated,
    CrossGraphInconsistency,
}

/// Half-open validity interval `[valid_from, valid_until)`, in Unix
/// milliseconds. `valid_until = None` means "currently valid, no known end".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub valid_from: i64,
    pub valid_until: Option<i64>,
}

impl ValidityWindow {
    pub fn from_now(now: i64) -> Self {
        Self {
            valid_from: now,
            valid_until: None,
        }
    }

    /// Whether `t` falls within `[valid_from, valid_until)`.
    pub fn contains(&self, t: i64) -> bool {
        t >= self.valid_from && self.valid_until.map(|until| t < until).unwrap_or(true)
    }
}

/// A node of the domain graph. Type is an open string set (`person`,
/// `organization`, `location`, `concept`, `event`, `technology`,
/// `text_chunk`, ...); ids are stable strings assigned by the caller or the
/// extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub node_type: String,
    pub properties: PropertyBag,
    pub embedding: Option<Vec<f32>>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, now: i64) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            properties: HashMap::new(),
            embedding: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// The display name of an entity, if one was set; most callers store it
    /// under `name`.
    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").and_then(PropertyValue::as_str)
    }
}

/// A directed, typed edge of the domain graph. `weight` is a scalar
/// relevance in `[0, 1]`. Edges optionally carry a validity window and, once
/// closed, the reason it was closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub edge_type: String,
    pub weight: f32,
    pub properties: PropertyBag,
    pub created_at: i64,
    pub updated_at: i64,
    pub validity: Option<ValidityWindow>,
    pub invalidation_reason: Option<InvalidationReason>,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        edge_type: impl Into<String>,
        weight: f32,
        now: i64,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            edge_type: edge_type.into(),
            weight,
            properties: HashMap::new(),
            created_at: now,
            updated_at: now,
            validity: None,
            invalidation_reason: None,
        }
    }

    pub fn is_valid_at(&self, t: i64) -> bool {
        match &self.validity {
            Some(window) => window.contains(t),
            None => true,
        }
    }

    pub fn invalidate(&mut self, reason: InvalidationReason, at: i64) {
        let window = self.validity.get_or_insert(ValidityWindow {
            valid_from: self.created_at,
            valid_until: None,
        });
        window.valid_until = Some(at);
        self.invalidation_reason = Some(reason);
    }
}

/// Granularity at which a text chunk was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Sentence,
    Paragraph,
    Document,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: Option<String>,
    pub timestamp: i64,
    pub chunk_type: ChunkType,
    pub position: usize,
    pub confidence: f32,
    /// Caller-supplied provenance/governance tags (tenant, residency region,
    /// retention deadline, ...) carried alongside the fixed fields above.
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// A node of the lexical graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LexicalRelationType {
    Sequential,
    CoOccurrence,
    Similarity,
}

/// An edge of the lexical graph, connecting two chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalRelation {
    pub id: String,
    pub source: String,
    pub target: String,
    pub relation_type: LexicalRelationType,
    pub weight: f32,
}

/// A typed relation between two domain entities. `relation_type` is drawn
/// from an open relation vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRelation {
    pub id: String,
    pub source: String,
    pub target: String,
    pub relation_type: String,
    pub confidence: f32,
    pub properties: PropertyBag,
}

/// Parent/children/sibling mapping for a set of entities. A node appears in
/// at most one parent per hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityHierarchy {
    pub id: String,
    pub parent_to_children: HashMap<String, Vec<String>>,
    pub child_to_parent: HashMap<String, String>,
    pub siblings: HashMap<String, Vec<String>>,
}

impl EntityHierarchy {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Attach `child` under `parent`, evicting it from any previous parent.
    pub fn attach(&mut self, parent: &str, child: &str) {
        if let Some(old_parent) = self.child_to_parent.get(child).cloned() {
            if let Some(children) = self.parent_to_children.get_mut(&old_parent) {
                children.retain(|c| c != child);
            }
        }
        self.parent_to_children
            .entry(parent.to_string())
            .or_default()
            .push(child.to_string());
        self.child_to_parent
            .insert(child.to_string(), parent.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphSide {
    Lexical,
    Domain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossLinkType {
    EntityMention,
    EvidenceSupport,
    SemanticGrounding,
    TemporalAlignment,
}

/// A typed, confidence-scored edge whose endpoints live in different graphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossGraphLink {
    pub id: String,
    pub source_graph: GraphSide,
    pub target_graph: GraphSide,
    pub source_id: String,
    pub target_id: String,
    pub link_type: CrossLinkType,
    pub confidence: f32,
    pub metadata: PropertyBag,
    pub created_at: i64,
    pub validity: Option<ValidityWindow>,
}

/// A group of entities sharing an embedding space, with a derived theme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub member_ids: Vec<String>,
    pub centroid: Vec<f32>,
    pub theme: String,
    pub confidence: f32,
    pub updated_at: i64,
}
