use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use recall_core::types::ProfileAttributes;
use recall_store::profiles::SlotUpdate;

use crate::app::AppState;
use crate::auth::ProjectId;
use crate::http::common::{id_data, ok, ok_empty, ApiResult};

pub async fn list_profiles(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path(user_id): Path<String>,
) -> ApiResult {
    let profiles = state.profiles.list(&project_id, &user_id)?;
    Ok(ok(json!({ "profiles": profiles })))
}

#[derive(Debug, Deserialize)]
pub struct ProfileBody {
    pub content: String,
    pub attributes: AttributesBody,
}

#[derive(Debug, Deserialize)]
pub struct AttributesBody {
    pub topic: String,
    pub sub_topic: String,
}

impl AttributesBody {
    fn normalized(&self) -> ProfileAttributes {
        ProfileAttributes::new(&self.topic, &self.sub_topic)
    }
}

pub async fn add_profile(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path(user_id): Path<String>,
    Json(body): Json<ProfileBody>,
) -> ApiResult {
    let ids = state.profiles.add_many(
        &project_id,
        &user_id,
        &[(body.content, body.attributes.normalized())],
    )?;
    Ok(ok(id_data(&ids[0])))
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdateBody {
    pub content: String,
    pub attributes: Option<AttributesBody>,
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path((user_id, profile_id)): Path<(String, String)>,
    Json(body): Json<ProfileUpdateBody>,
) -> ApiResult {
    let updated = state.profiles.update_many(
        &project_id,
        &user_id,
        &[SlotUpdate {
            id: profile_id.clone(),
            content: body.content,
            attributes: body.attributes.map(|a| a.normalized()),
        }],
        false,
    )?;
    if updated.is_empty() {
        return Err(recall_core::MemoryError::NotFound(format!("profile {profile_id}")).into());
    }
    Ok(ok_empty())
}

pub async fn delete_profile(
    State(state): State<Arc<AppState>>,
    Extension(ProjectId(project_id)): Extension<ProjectId>,
    Path((user_id, profile_id)): Path<(String, String)>,
) -> ApiResult {
    // 404 on unknown ids, unlike the silent bulk path used by flushes
    state.profiles.get(&project_id, &user_id, &profile_id)?;
    state
        .profiles
        .delete_many(&project_id, &user_id, &[profile_id])?;
    Ok(ok_empty())
}
