use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use crate::app::AppState;
use crate::auth::ProjectId;
use crate::http::common::{id_data, ok, ApiResult};

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    #[serde(rename = "type")]
    pub status_type: String,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

pub async fn append_status(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path(user_id): Path<String>,
    Json(body): Json<StatusBody>,
) -> ApiResult {
    state.users.get(&project_id, &user_id)?;
    let id = state
        .statuses
        .append(&project_id, &user_id, &body.status_type, body.attributes)?;
    Ok(ok(id_data(&id)))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "type")]
    pub status_type: String,
    #[serde(default)]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    10
}

pub async fn list_statuses(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path(user_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> ApiResult {
    let statuses = state.statuses.list(
        &project_id,
        &user_id,
        &query.status_type,
        query.page,
        query.page_size,
    )?;
    Ok(ok(json!({ "statuses": statuses })))
}
