use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;

use crate::app::AppState;
use crate::auth::ProjectId;
use crate::http::common::{id_data, ok, ok_empty, ApiResult};

#[derive(Debug, Deserialize)]
pub struct CreateUserBody {
    /// Optional client-supplied UUID.
    pub id: Option<String>,
    /// Opaque additional fields stored with the user.
    pub data: Option<serde_json::Value>,
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Json(body): Json<CreateUserBody>,
) -> ApiResult {
    let id = state.users.create(&project_id, body.id, body.data)?;
    Ok(ok(id_data(&id)))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path(user_id): Path<String>,
) -> ApiResult {
    let user = state.users.get(&project_id, &user_id)?;
    Ok(ok(user))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserBody {
    pub data: Option<serde_json::Value>,
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path(user_id): Path<String>,
    Json(body): Json<UpdateUserBody>,
) -> ApiResult {
    state.users.update(&project_id, &user_id, body.data)?;
    Ok(ok_empty())
}

/// Deleting a user cascades to its blobs, buffer entries, profiles, and
/// events.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path(user_id): Path<String>,
) -> ApiResult {
    state.users.delete(&project_id, &user_id)?;
    // the cascade bypasses the profile store, so its cache must go too
    state.profiles.invalidate(&project_id, &user_id);
    Ok(ok_empty())
}
