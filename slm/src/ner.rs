use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub text: String,
    pub label: String,
    pub confidence: f32,
}

/// A candidate domain relation between two entity mentions, keyed by
/// surface text rather than node id — the C7 extractor resolves mentions
/// to node ids after thresholding and capping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationCandidate {
    pub source_text: String,
    pub relation_type: String,
    pub target_text: String,
    pub confidence: f32,
}

/// A dependency-parse edge between two tokens/phrases, used to support
/// hierarchical relation installation (`parent_of`, `is_a`) when present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependencyEdge {
    pub head_text: String,
    pub dependent_text: String,
    pub relation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ExtractionResult {
    pub entities: Vec<Entity>,
    pub relations: Vec<RelationCandidate>,
    pub dependencies: Vec<DependencyEdge>,
}

/// Pluggable text-analysis provider: NER + relation + dependency
/// extraction from raw text, with per-item confidences. Implementations
/// range from keyword-matching mocks (below) to real NLP model wrappers;
/// the engine only ever talks to this trait.
#[async_trait]
pub trait TextAnalysisProvider: Send + Sync {
    async fn analyze(&self, text: &str) -> anyhow::Result<ExtractionResult>;
}

pub struct MockEntityExtractor {
    keywords: Vec<(String, String)>, // (keyword, label)
    relation_signals: Vec<(String, String, String)>, // (subject hint, relation, object hint)
}

impl MockEntityExtractor {
    pub fn new() -> Self {
        Self {
            keywords: vec![
                ("Rust".to_string(), "Language".to_string()),
                ("Python".to_string(), "Language".to_string()),
                ("AI".to_string(), "Topic".to_string()),
                ("Database".to_string(), "Topic".to_string()),
                ("Graph".to_string(), "Concept".to_string()),
                ("Vector".to_string(), "Concept".to_string()),
            ],
            relation_signals: vec![(
                "Rust".to_string(),
                "related_to".to_string(),
                "AI".to_string(),
            )],
        }
    }
}

impl Default for MockEntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextAnalysisProvider for MockEntityExtractor {
    async fn analyze(&self, text: &str) -> anyhow::Result<ExtractionResult> {
        let lower_text = text.to_lowercase();
        let mut entities = Vec::new();

        for (keyword, label) in &self.keywords {
            if lower_text.contains(&keyword.to_lowercase()) {
                entities.push(Entity {
                    text: keyword.clone(),
                    label: label.clone(),
                    confidence: 0.9,
                });
            }
        }

        let mut relations = Vec::new();
        for (subject, relation, object) in &self.relation_signals {
            if lower_text.contains(&subject.to_lowercase()) && lower_text.contains(&object.to_lowercase()) {
                relations.push(RelationCandidate {
                    source_text: subject.clone(),
                    relation_type: relation.clone(),
                    target_text: object.clone(),
                    confidence: 0.7,
                });
            }
        }

        Ok(ExtractionResult { entities, relations, dependencies: Vec::new() })
    }
}
