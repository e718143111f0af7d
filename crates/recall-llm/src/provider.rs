use async_trait::async_trait;

/// Request for one completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub input: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Stable identifier of the system prompt, used by the gateway's prompt
    /// registry and by providers that support prefix caching. Opaque here.
    pub prompt_id: Option<String>,
}

/// Response from a provider (non-streaming). Token counts are the provider's
/// own when reported, zero otherwise.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

/// Common interface for completion + embedding backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// Send a completion request and wait for the full response. The returned
    /// text is uninterpreted; parsing belongs to the prompt contracts.
    async fn complete(&self, req: &CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Embed a batch of texts, one vector per input, in order.
    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("request timeout after {ms}ms")]
    Timeout { ms: u64 },
}

impl ProviderError {
    /// Whether the gateway should retry. Client-side errors (4xx other than
    /// 429, malformed responses) are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Unavailable(_)
            | ProviderError::Timeout { .. } => true,
            ProviderError::Api { status, .. } => *status >= 500,
            ProviderError::Parse(_) => false,
        }
    }
}
