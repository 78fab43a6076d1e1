use serde::{Deserialize, Serialize};

/// Semantic error kinds shared across every crate in the engine. Module-level
/// `thiserror` enums map their variants onto this set via `AlayasikiError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    PermissionDenied,
    Unauthenticated,
    ResourceExhausted,
    Internal,

    CapacityExceeded,
    MissingEndpoint,
    DimensionMismatch,
    NotInitialized,
    InvalidConfig,
    ProviderUnavailable,
    DecodeError,
    Cancelled,
    DeadlineExceeded,
    ConsistencyViolation,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
            ErrorCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::CapacityExceeded => "CAPACITY_EXCEEDED",
            ErrorCode::MissingEndpoint => "MISSING_ENDPOINT",
            ErrorCode::DimensionMismatch => "DIMENSION_MISMATCH",
            ErrorCode::NotInitialized => "NOT_INITIALIZED",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            ErrorCode::DecodeError => "DECODE_ERROR",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ErrorCode::ConsistencyViolation => "CONSISTENCY_VIOLATION",
        };
        write!(f, "{}", s)
    }
}

pub trait AlayasikiError: std::error::Error {
    fn error_code(&self) -> ErrorCode;
}

/// A structured error entry as returned alongside partial outputs per
/// section 7 ("each API returns a structured result carrying
/// `errors: [kind, message]*`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub kind: ErrorCode,
    pub message: String,
}

impl ErrorEntry {
    pub fn from_error(err: &dyn AlayasikiError) -> Self {
        Self {
            kind: err.error_code(),
            message: err.to_string(),
        }
    }
}
