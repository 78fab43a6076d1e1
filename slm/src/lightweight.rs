use crate::ner::{DependencyEdge, ExtractionResult, Entity, RelationCandidate, TextAnalysisProvider};
use crate::registry::{ModelRegistry, RegistryError};
use std::sync::Arc;

pub const TRIPLEX_LITE_MODEL: &str = "triplex-lite";
pub const GLM_FLASH_LITE_MODEL: &str = "glm-4-flash-lite";

/// Lightweight relation-signal extractor: cheap keyword matching tuned
/// for cost-focused first-pass extraction (business-event relation
/// signals + hierarchical hints), cross-linked with a parent/child
/// dependency edge when both sides of an `is_a`-style phrase are found.
pub struct TriplexLiteExtractor;

#[async_trait::async_trait]
impl TextAnalysisProvider for TriplexLiteExtractor {
    async fn analyze(&self, text: &str) -> anyhow::Result<ExtractionResult> {
        let mut entities = Vec::new();
        let mut relations = Vec::new();
        let mut dependencies = Vec::new();
        let lower = text.to_lowercase();

        for keyword in ["acquired", "merged", "invested", "partnership"] {
            if lower.contains(keyword) {
                entities.push(Entity {
                    text: keyword.to_string(),
                    label: "RelationSignal".to_string(),
                    confidence: 0.86,
                });
            }
        }

        for keyword in ["company", "organization", "startup"] {
            if lower.contains(keyword) {
                entities.push(Entity {
                    text: keyword.to_string(),
                    label: "EntityHint".to_string(),
                    confidence: 0.82,
                });
            }
        }

        if lower.contains("rust") {
            entities.push(Entity {
                text: "rust".to_string(),
                label: "TechnicalTopic".to_string(),
                confidence: 0.8,
            });
        }

        if lower.contains("acquired") && (lower.contains("company") || lower.contains("startup")) {
            relations.push(RelationCandidate {
                source_text: "acquired".to_string(),
                relation_type: "acquired".to_string(),
                target_text: "company".to_string(),
                confidence: 0.75,
            });
        }

        if lower.contains("subsidiary of") {
            dependencies.push(DependencyEdge {
                head_text: "parent".to_string(),
                dependent_text: "subsidiary".to_string(),
                relation: "parent_of".to_string(),
            });
        }

        Ok(ExtractionResult { entities, relations, dependencies })
    }
}

pub struct GlmFlashLiteExtractor;

#[async_trait::async_trait]
impl TextAnalysisProvider for GlmFlashLiteExtractor {
    async fn analyze(&self, text: &str) -> anyhow::Result<ExtractionResult> {
        let mut entities = Vec::new();
        let lower = text.to_lowercase();

        for keyword in ["graph", "vector", "database", "index", "query"] {
            if lower.contains(keyword) {
                entities.push(Entity {
                    text: keyword.to_string(),
                    label: "TechnicalTopic".to_string(),
                    confidence: 0.84,
                });
            }
        }

        let mut relations = Vec::new();
        if lower.contains("graph") && lower.contains("index") {
            relations.push(RelationCandidate {
                source_text: "graph".to_string(),
                relation_type: "indexed_by".to_string(),
                target_text: "index".to_string(),
                confidence: 0.7,
            });
        }

        Ok(ExtractionResult { entities, relations, dependencies: Vec::new() })
    }
}

pub fn register_default_lightweight_models(
    registry: &mut ModelRegistry,
) -> Result<(), RegistryError> {
    registry.register(TRIPLEX_LITE_MODEL, "1.0.0", Arc::new(TriplexLiteExtractor))?;
    registry.register(
        GLM_FLASH_LITE_MODEL,
        "1.0.0",
        Arc::new(GlmFlashLiteExtractor),
    )?;

    // Keep Triplex as default extraction model for cost-focused extraction first.
    registry.activate(TRIPLEX_LITE_MODEL, "1.0.0")?;

    Ok(())
}
