//! Scripted provider for tests. Responses are queued per `prompt_id`, so
//! concurrent pipeline stages stay deterministic.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::provider::{CompletionRequest, CompletionResponse, LlmProvider, ProviderError};

#[derive(Clone, Default)]
pub struct ScriptedProvider {
    replies: Arc<Mutex<HashMap<String, VecDeque<Result<String, ()>>>>>,
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for calls carrying this `prompt_id`.
    pub fn push(&self, prompt_id: &str, response: &str) {
        self.replies
            .lock()
            .unwrap()
            .entry(prompt_id.to_string())
            .or_default()
            .push_back(Ok(response.to_string()));
    }

    /// Queue a transient failure for calls carrying this `prompt_id`.
    pub fn push_error(&self, prompt_id: &str) {
        self.replies
            .lock()
            .unwrap()
            .entry(prompt_id.to_string())
            .or_default()
            .push_back(Err(()));
    }

    /// Every completion request seen so far, in call order.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        self.calls.lock().unwrap().push(req.clone());
        let key = req.prompt_id.clone().unwrap_or_default();
        let next = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(|q| q.pop_front());
        match next {
            Some(Ok(content)) => Ok(CompletionResponse {
                content,
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
            }),
            Some(Err(())) => Err(ProviderError::Unavailable("scripted failure".into())),
            None => Err(ProviderError::Parse(format!(
                "no scripted reply for prompt_id '{key}'"
            ))),
        }
    }

    async fn embed(&self, _model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        // deterministic toy embedding: length and byte-sum features
        Ok(texts
            .iter()
            .map(|t| {
                let sum: u32 = t.bytes().map(u32::from).sum();
                vec![
                    (t.len() % 97) as f32 / 97.0,
                    (sum % 101) as f32 / 101.0,
                    1.0,
                ]
            })
            .collect())
    }
}
