use recall_core::MemoryError;
use recall_llm::ProviderError;
use recall_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Truncation left nothing to process.
    #[error("no blobs to process after truncation")]
    EmptyBatch,

    #[error("llm error: {0}")]
    Llm(#[from] ProviderError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("model output rejected: {0}")]
    Parse(String),
}

impl From<PipelineError> for MemoryError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::EmptyBatch => MemoryError::BadRequest(e.to_string()),
            PipelineError::Llm(e) => MemoryError::ServiceUnavailable(e.to_string()),
            PipelineError::Store(e) => e.into(),
            PipelineError::Parse(msg) => MemoryError::ParseFailure(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
