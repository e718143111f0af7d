use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Extension;
use serde::Deserialize;
use serde_json::json;

use recall_core::types::{BlobType, BufferStatus};

use crate::app::AppState;
use crate::auth::ProjectId;
use crate::http::common::{ok, ApiResult};

#[derive(Debug, Deserialize)]
pub struct FlushQuery {
    #[serde(default)]
    pub wait_process: bool,
}

/// POST /users/buffer/{id}/{type} — explicit flush. Synchronous callers get
/// the commit result; otherwise the idle batch is handed to the background
/// worker.
pub async fn flush_buffer(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path((user_id, blob_type)): Path<(String, BlobType)>,
    Query(query): Query<FlushQuery>,
) -> ApiResult {
    if query.wait_process {
        let result = state
            .scheduler
            .flush_sync(&project_id, &user_id, blob_type)
            .await?;
        return Ok(ok(json!({ "flush": result })));
    }
    let ids = state
        .buffer
        .pending_ids(&project_id, &user_id, blob_type, BufferStatus::Idle)?;
    if !ids.is_empty() {
        state
            .scheduler
            .spawn_background(&project_id, &user_id, blob_type, &ids)?;
    }
    Ok(ok(json!({ "flush": serde_json::Value::Null })))
}

#[derive(Debug, Deserialize)]
pub struct CapacityQuery {
    pub status: Option<String>,
}

/// GET /users/buffer/capacity/{id}/{type} — introspect the buffer.
pub async fn buffer_capacity(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path((user_id, blob_type)): Path<(String, BlobType)>,
    Query(query): Query<CapacityQuery>,
) -> ApiResult {
    let status: BufferStatus = query
        .status
        .as_deref()
        .unwrap_or("idle")
        .parse()
        .map_err(recall_core::MemoryError::BadRequest)?;
    let ids = state
        .buffer
        .pending_ids(&project_id, &user_id, blob_type, status)?;
    let token_size = state
        .buffer
        .token_sum(&project_id, &user_id, blob_type, status)?;
    Ok(ok(json!({
        "ids": ids,
        "count": ids.len(),
        "token_size": token_size,
    })))
}
