//! The C3 index stack: label, property, text, vector, and pattern indexes
//! layered over the C1 graph store.

pub mod label;
pub mod pattern;
pub mod property;
pub mod text;
pub mod vector;

pub use label::LabelIndex;
pub use pattern::{match_pattern, Pattern, PatternDirection, PatternEdge, PatternMatch, PatternNode};
pub use property::{PropertyIndex, PropertyOp};
pub use text::{TextIndex, TextQueryMode};
pub use vector::{DistanceMetric, ScoredId, VectorIndex, VectorIndexConfig, VectorIndexError};
