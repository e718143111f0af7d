use thiserror::Error;

/// Cross-cutting error taxonomy. Subsystem crates keep their own error enums
/// and convert into this at the service boundary, where `http_status` decides
/// the response code.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("model output rejected: {0}")]
    ParseFailure(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MemoryError {
    /// Short error code string carried in API envelopes and logs.
    pub fn code(&self) -> &'static str {
        match self {
            MemoryError::BadRequest(_) => "BAD_REQUEST",
            MemoryError::Unauthorized(_) => "UNAUTHORIZED",
            MemoryError::Forbidden(_) => "FORBIDDEN",
            MemoryError::NotFound(_) => "NOT_FOUND",
            MemoryError::Conflict(_) => "CONFLICT",
            MemoryError::ParseFailure(_) => "PARSE_FAILURE",
            MemoryError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            MemoryError::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            MemoryError::Config(_) => "CONFIG_ERROR",
            MemoryError::Serialization(_) => "SERIALIZATION_ERROR",
            MemoryError::Io(_) => "IO_ERROR",
            MemoryError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the gateway maps this kind to.
    pub fn http_status(&self) -> u16 {
        match self {
            MemoryError::BadRequest(_) => 400,
            MemoryError::Unauthorized(_) => 401,
            MemoryError::Forbidden(_) => 403,
            MemoryError::NotFound(_) => 404,
            MemoryError::Conflict(_) => 409,
            MemoryError::ParseFailure(_) => 422,
            MemoryError::ServiceUnavailable(_) => 503,
            MemoryError::QuotaExceeded(_) => 402,
            MemoryError::Config(_) => 400,
            MemoryError::Serialization(_) => 500,
            MemoryError::Io(_) => 500,
            MemoryError::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;
