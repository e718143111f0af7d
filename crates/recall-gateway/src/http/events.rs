use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use recall_core::MemoryError;
use recall_store::types::EventPatch;

use crate::app::AppState;
use crate::auth::ProjectId;
use crate::http::common::{ok, ok_empty, ApiResult};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_topk")]
    pub topk: usize,
    pub max_token_size: Option<usize>,
    #[serde(default)]
    pub need_summary: bool,
}

fn default_topk() -> usize {
    10
}

pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path(user_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let events = state.events.list(
        &project_id,
        &user_id,
        query.topk,
        query.max_token_size,
        query.need_summary,
    )?;
    Ok(ok(json!({ "events": events })))
}

pub async fn update_event(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path((user_id, event_id)): Path<(String, String)>,
    Json(patch): Json<EventPatch>,
) -> ApiResult {
    state
        .events
        .update(&project_id, &user_id, &event_id, &patch)?;
    Ok(ok_empty())
}

pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path((user_id, event_id)): Path<(String, String)>,
) -> ApiResult {
    state.events.delete(&project_id, &user_id, &event_id)?;
    Ok(ok_empty())
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default = "default_topk")]
    pub topk: usize,
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f32,
}

fn default_threshold() -> f32 {
    0.2
}

/// GET /users/event/search/{id} — semantic search over event tips.
pub async fn search_events(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path(user_id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> ApiResult {
    if query.query.trim().is_empty() {
        return Err(MemoryError::BadRequest("empty search query".into()).into());
    }
    let mut vectors = state
        .llm
        .embed(&project_id, &[query.query.clone()], "event_search")
        .await
        .map_err(|e| MemoryError::ServiceUnavailable(e.to_string()))?;
    if vectors.is_empty() {
        return Err(MemoryError::ServiceUnavailable("embedding returned nothing".into()).into());
    }
    let hits = state.events.search(
        &project_id,
        &user_id,
        &vectors.remove(0),
        query.topk,
        query.similarity_threshold,
    )?;
    let events: Vec<serde_json::Value> = hits
        .into_iter()
        .map(|(event, similarity)| {
            json!({
                "event": event,
                "similarity": similarity,
            })
        })
        .collect();
    Ok(ok(json!({ "events": events })))
}
