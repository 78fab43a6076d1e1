use alayasiki_core::error::{AlayasikiError, ErrorCode};
use ingestion::processor::IngestionError;
use query::engine::QueryError;
use storage::graph_store::GraphStoreError;
use storage::index::VectorIndexError;
use storage::persistence::PersistenceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("ingestion failed: {0}")]
    Ingestion(#[from] IngestionError),
    #[error("query failed: {0}")]
    Query(#[from] QueryError),
    #[error("graph error: {0}")]
    Graph(#[from] GraphStoreError),
    #[error("vector index error: {0}")]
    Vector(#[from] VectorIndexError),
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("entity not found: {0}")]
    EntityNotFound(String),
    #[error("relationship not found: {0}")]
    RelationshipNotFound(String),
}

impl AlayasikiError for EngineError {
    fn error_code(&self) -> ErrorCode {
        match self {
            EngineError::Ingestion(e) => e.error_code(),
            EngineError::Query(e) => e.error_code(),
            EngineError::Graph(e) => e.error_code(),
            EngineError::Vector(e) => e.error_code(),
            EngineError::Persistence(e) => e.error_code(),
            EngineError::EntityNotFound(_) => ErrorCode::NotFound,
            EngineError::RelationshipNotFound(_) => ErrorCode::NotFound,
        }
    }
}
