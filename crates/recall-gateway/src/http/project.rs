use std::sync::Arc;

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use recall_core::project::ProfileConfig;

use crate::app::AppState;
use crate::auth::ProjectId;
use crate::http::common::{ok, ok_empty, ApiResult};

pub async fn get_profile_config(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
) -> ApiResult {
    let config = state.projects.profile_config(&project_id)?;
    Ok(ok(json!({ "profile_config": config })))
}

#[derive(Debug, Deserialize)]
pub struct ProfileConfigBody {
    pub profile_config: String,
}

/// POST /project/profile_config — replace the project's YAML config. The
/// document is validated before it is stored.
pub async fn set_profile_config(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Json(body): Json<ProfileConfigBody>,
) -> ApiResult {
    ProfileConfig::from_yaml(&body.profile_config)?;
    state
        .projects
        .set_profile_config(&project_id, &body.profile_config)?;
    Ok(ok_empty())
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    #[serde(default = "default_last_days")]
    pub last_days: u32,
}

fn default_last_days() -> u32 {
    7
}

pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Query(query): Query<UsageQuery>,
) -> ApiResult {
    let usage = state.projects.usage(&project_id, query.last_days)?;
    Ok(ok(json!({ "usage": usage })))
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    #[serde(default)]
    pub search: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    10
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult {
    let (users, count) =
        state
            .users
            .list(&project_id, &query.search, query.limit, query.offset)?;
    Ok(ok(json!({ "users": users, "count": count })))
}
