//! LLM gateway: the single suspendable call-out for completions and
//! embeddings, with retries, token accounting, and a system-prompt registry.

pub mod gateway;
pub mod openai;
pub mod provider;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use gateway::{CompleteOptions, LlmGateway};
pub use openai::OpenAiProvider;
pub use provider::{CompletionRequest, CompletionResponse, LlmProvider, ProviderError};
