pub mod context;
pub mod engine;
pub mod error;

pub use context::MemoryContext;
pub use engine::{
    AddMemoryMetadata, AddMemoryOptions, AddMemoryResult, DualGraphResult, Engine, Metrics, SubgraphResult,
    TemporalRelationshipQuery,
};
pub use error::EngineError;
