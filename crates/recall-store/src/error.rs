use recall_core::MemoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("illegal buffer transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for MemoryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { kind, id } => {
                MemoryError::NotFound(format!("{kind} {id}"))
            }
            StoreError::InvalidProfile(msg) => MemoryError::BadRequest(msg),
            StoreError::InvalidTransition { from, to } => {
                MemoryError::Conflict(format!("buffer transition {from} -> {to}"))
            }
            StoreError::Database(e) => MemoryError::Internal(e.to_string()),
            StoreError::Serialization(e) => MemoryError::Internal(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
