use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use recall_core::config::LlmConfig;
use recall_core::tokens::count_tokens;
use recall_store::projects::ProjectStore;
use tracing::{debug, warn};

use crate::provider::{CompletionRequest, CompletionResponse, LlmProvider, ProviderError};

const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_CAP_MS: u64 = 10_000;
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Per-call options. The defaults match the pipeline's precise stages.
#[derive(Debug, Clone)]
pub struct CompleteOptions {
    /// Override the configured default model.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Register/reference the system prompt under this id. When the id is
    /// already registered, an empty `system` argument reuses the stored
    /// prompt, so stages render their (large, stable) system prompt once.
    pub prompt_id: Option<&'static str>,
    /// Bypass the prompt registry entirely for this call.
    pub no_cache: bool,
}

impl Default for CompleteOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.2,
            max_tokens: DEFAULT_MAX_TOKENS,
            prompt_id: None,
            no_cache: false,
        }
    }
}

/// The single suspendable call-out for completions and embeddings.
///
/// Wraps a provider with bounded exponential-backoff retries on transient
/// failures, a per-call timeout, per-project daily token accounting, and a
/// system-prompt registry. Cancellation-safe: dropping a returned future
/// aborts the underlying HTTP call.
pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    projects: Arc<ProjectStore>,
    config: LlmConfig,
    prompt_registry: DashMap<&'static str, String>,
}

impl LlmGateway {
    pub fn new(provider: Arc<dyn LlmProvider>, projects: Arc<ProjectStore>, config: LlmConfig) -> Self {
        Self {
            provider,
            projects,
            config,
            prompt_registry: DashMap::new(),
        }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Pre-register a stable system prompt under a name. Subsequent
    /// `complete` calls carrying the same `prompt_id` may pass an empty
    /// system string.
    pub fn register_prompt(&self, prompt_id: &'static str, system: impl FnOnce() -> String) {
        self.prompt_registry
            .entry(prompt_id)
            .or_insert_with(system);
    }

    /// Run one completion with retries. Returns the raw text.
    pub async fn complete(
        &self,
        project_id: &str,
        input: &str,
        system: &str,
        opts: CompleteOptions,
    ) -> Result<String, ProviderError> {
        let system = match (system.is_empty(), opts.prompt_id) {
            (true, Some(id)) if !opts.no_cache => self
                .prompt_registry
                .get(id)
                .map(|s| s.clone())
                .unwrap_or_default(),
            _ => {
                if let Some(id) = opts.prompt_id {
                    if !opts.no_cache {
                        self.prompt_registry
                            .entry(id)
                            .or_insert_with(|| system.to_string());
                    }
                }
                system.to_string()
            }
        };
        let req = CompletionRequest {
            model: opts
                .model
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
            system,
            input: input.to_string(),
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
            prompt_id: opts.prompt_id.map(String::from),
        };

        let resp = self
            .with_retries(|| async { self.provider.complete(&req).await })
            .await?;
        self.record_usage(project_id, &req, &resp);
        Ok(resp.content)
    }

    /// Embed a batch of texts. `phase` labels the call site in logs.
    pub async fn embed(
        &self,
        project_id: &str,
        texts: &[String],
        phase: &str,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let model = self.config.embedding_model.clone();
        let vectors = self
            .with_retries(|| async { self.provider.embed(&model, texts).await })
            .await?;
        let tokens: usize = texts.iter().map(|t| count_tokens(t)).sum();
        debug!(phase, tokens, "embedding batch done");
        if let Err(e) = self.projects.record_usage(project_id, tokens as u64, 0) {
            warn!(error = %e, "failed to record embedding usage");
        }
        Ok(vectors)
    }

    async fn with_retries<T, F, Fut>(&self, call: F) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut attempt: u32 = 0;
        loop {
            let result = match tokio::time::timeout(timeout, call()).await {
                Ok(r) => r,
                Err(_) => Err(ProviderError::Timeout {
                    ms: timeout.as_millis() as u64,
                }),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = backoff_delay(attempt, &e);
                    warn!(
                        provider = self.provider.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient provider error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn record_usage(&self, project_id: &str, req: &CompletionRequest, resp: &CompletionResponse) {
        // fall back to a local estimate when the provider reports nothing
        let tokens_in = if resp.tokens_in > 0 {
            resp.tokens_in as u64
        } else {
            count_tokens(&req.system) as u64 + count_tokens(&req.input) as u64
        };
        let tokens_out = if resp.tokens_out > 0 {
            resp.tokens_out as u64
        } else {
            count_tokens(&resp.content) as u64
        };
        if let Err(e) = self.projects.record_usage(project_id, tokens_in, tokens_out) {
            warn!(error = %e, "failed to record llm usage");
        }
    }
}

fn backoff_delay(attempt: u32, error: &ProviderError) -> Duration {
    if let ProviderError::RateLimited { retry_after_ms } = error {
        return Duration::from_millis(*retry_after_ms);
    }
    let exp = BACKOFF_BASE_MS.saturating_mul(1 << attempt.min(5)).min(BACKOFF_CAP_MS);
    let jitter = rand::rng().random_range(0..BACKOFF_BASE_MS / 2);
    Duration::from_millis(exp + jitter)
}
