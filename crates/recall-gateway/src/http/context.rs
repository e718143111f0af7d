use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Extension;
use serde::Deserialize;
use serde_json::json;

use recall_core::types::ChatMessage;
use recall_core::MemoryError;
use recall_pipeline::ContextParams;

use crate::app::AppState;
use crate::auth::ProjectId;
use crate::http::common::{ok, split_csv, ApiResult};

#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    pub max_tokens: Option<usize>,
    /// Comma-separated topic lists.
    pub prefer_topics: Option<String>,
    pub only_topics: Option<String>,
    /// JSON object `{topic: limit}`.
    pub topic_limits: Option<String>,
    pub max_subtopic_size: Option<usize>,
    pub profile_event_ratio: Option<f64>,
    #[serde(default)]
    pub require_event_summary: bool,
    /// JSON array of recent chat messages for chat-aware filtering.
    pub chats: Option<String>,
}

/// GET /users/context/{id} — the composed memory string.
pub async fn get_context(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path(user_id): Path<String>,
    Query(query): Query<ContextQuery>,
) -> ApiResult {
    state.users.get(&project_id, &user_id)?;

    let topic_limits: HashMap<String, usize> = match &query.topic_limits {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| MemoryError::BadRequest(format!("invalid topic_limits: {e}")))?,
        None => HashMap::new(),
    };
    let chat_hint: Vec<ChatMessage> = match &query.chats {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| MemoryError::BadRequest(format!("invalid chats: {e}")))?,
        None => Vec::new(),
    };
    let ratio = query.profile_event_ratio.unwrap_or(0.8);
    if !(0.0..=1.0).contains(&ratio) {
        return Err(
            MemoryError::BadRequest("profile_event_ratio must be within [0, 1]".into()).into(),
        );
    }

    let params = ContextParams {
        max_tokens: query.max_tokens.unwrap_or(1000),
        prefer_topics: split_csv(query.prefer_topics.as_deref()),
        only_topics: split_csv(query.only_topics.as_deref()),
        topic_limits,
        max_subtopic_size: query.max_subtopic_size,
        profile_event_ratio: ratio,
        require_event_summary: query.require_event_summary,
        chat_hint,
    };
    let config = state.projects.parsed_profile_config(&project_id)?;
    let context = state
        .composer
        .compose(&project_id, &user_id, &config, &params)
        .await?;
    Ok(ok(json!({ "context": context })))
}
