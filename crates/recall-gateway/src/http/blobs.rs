use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use recall_core::tokens::count_tokens;
use recall_core::types::{Blob, BlobType};

use crate::app::AppState;
use crate::auth::ProjectId;
use crate::http::common::{ok, ok_empty, ApiResult};

#[derive(Debug, Deserialize)]
pub struct InsertQuery {
    #[serde(default)]
    pub wait_process: bool,
}

/// POST /blobs/insert/{id} — persist a blob, enqueue it, and either flush
/// synchronously (`wait_process`) or let the size trigger schedule a
/// background flush.
pub async fn insert_blob(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path(user_id): Path<String>,
    Query(query): Query<InsertQuery>,
    Json(blob): Json<Blob>,
) -> ApiResult {
    // reject unknown users before writing anything
    state.users.get(&project_id, &user_id)?;

    let token_size = count_tokens(&blob.render(&Utc::now()));
    let blob_id = state.blobs.put(&project_id, &user_id, &blob)?;
    state.buffer.enqueue(
        &project_id,
        &user_id,
        blob.blob_type(),
        &blob_id,
        token_size,
    )?;

    let flush_result = if blob.blob_type() == BlobType::Chat {
        state
            .scheduler
            .on_enqueue(&project_id, &user_id, BlobType::Chat, query.wait_process)
            .await?
    } else {
        None
    };

    Ok(ok(json!({
        "id": blob_id,
        "flush": flush_result,
    })))
}

pub async fn get_blob(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path((user_id, blob_id)): Path<(String, String)>,
) -> ApiResult {
    let record = state.blobs.get(&project_id, &user_id, &blob_id)?;
    Ok(ok(json!({
        "id": record.id,
        "blob_type": record.blob_type,
        "blob_data": record.blob,
        "created_at": record.created_at.to_rfc3339(),
    })))
}

pub async fn delete_blob(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path((user_id, blob_id)): Path<(String, String)>,
) -> ApiResult {
    state.blobs.delete(&project_id, &user_id, &blob_id)?;
    Ok(ok_empty())
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    10
}

pub async fn list_blob_ids(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path((user_id, blob_type)): Path<(String, BlobType)>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let ids = state.blobs.list_ids(
        &project_id,
        &user_id,
        blob_type,
        query.page,
        query.page_size,
    )?;
    Ok(ok(json!({ "ids": ids })))
}
