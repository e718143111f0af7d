use std::sync::Arc;

use axum::extract::State;
use serde_json::json;

use crate::app::AppState;
use crate::http::common::{ok, ApiResult};

/// GET /healthcheck — liveness of the storage and coordination substrate.
pub async fn healthcheck(State(state): State<Arc<AppState>>) -> ApiResult {
    let db_ok = {
        let conn = state.db.lock().unwrap();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    };
    if !db_ok {
        return Err(recall_core::MemoryError::ServiceUnavailable(
            "database unreachable".into(),
        )
        .into());
    }
    Ok(ok(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
