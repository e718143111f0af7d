use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use recall_core::config::ROOT_PROJECT_ID;
use recall_core::MemoryError;

use crate::app::AppState;
use crate::http::common::ApiError;

/// The authenticated tenant, injected into request extensions.
#[derive(Debug, Clone)]
pub struct ProjectId(pub String);

/// Bearer-token auth: the process root token maps to the root project, any
/// other token must match a project secret. Suspended projects are rejected.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| MemoryError::Unauthorized("missing bearer token".into()))?;

    let project_id = if token == state.config.gateway.access_token {
        ROOT_PROJECT_ID.to_string()
    } else {
        state
            .projects
            .find_by_secret(token)
            .map_err(MemoryError::from)?
            .ok_or_else(|| MemoryError::Unauthorized("unknown token".into()))?
    };

    let project = state
        .projects
        .get(&project_id)
        .map_err(MemoryError::from)?
        .ok_or_else(|| MemoryError::Unauthorized("unknown project".into()))?;
    if project.status != "active" {
        return Err(MemoryError::Forbidden(format!(
            "project {project_id} is {}",
            project.status
        ))
        .into());
    }

    debug!(project_id, "request authenticated");
    request.extensions_mut().insert(ProjectId(project_id));
    Ok(next.run(request).await)
}
