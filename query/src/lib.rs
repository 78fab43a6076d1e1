pub mod dsl;
pub mod engine;
pub mod semantic_cache;

pub use dsl::{CrossGraphQuery, DomainQuery, LexicalQuery, QueryOptions, QueryRequest, QueryValidationError, SortBy, TextMode};
pub use engine::{QueryEngine, QueryError, QueryExplain, QueryResponse, QueryResultItem, ResultData, ResultKind};
pub use semantic_cache::{EvictionPolicy, SemanticCache, SemanticCacheConfig, SemanticCacheKey};
