use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use recall_core::MemoryError;

/// The uniform response envelope. `errno` is 0 on success, the HTTP-style
/// error code otherwise.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub data: serde_json::Value,
    pub errno: u16,
    pub errmsg: String,
}

pub fn ok(data: impl Serialize) -> Json<Envelope> {
    Json(Envelope {
        data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        errno: 0,
        errmsg: String::new(),
    })
}

pub fn ok_empty() -> Json<Envelope> {
    ok(serde_json::Value::Null)
}

/// Error wrapper mapping the core taxonomy onto HTTP statuses.
#[derive(Debug)]
pub struct ApiError(pub MemoryError);

impl<E: Into<MemoryError>> From<E> for ApiError {
    fn from(e: E) -> Self {
        ApiError(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(Envelope {
            data: serde_json::Value::Null,
            errno: status.as_u16(),
            errmsg: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult = Result<Json<Envelope>, ApiError>;

/// Split a comma-separated query value, dropping blanks.
pub fn split_csv(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// `{id: ...}` payload helper.
pub fn id_data(id: &str) -> serde_json::Value {
    json!({ "id": id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_splitting() {
        assert_eq!(
            split_csv(Some("a, b ,,c")),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(split_csv(None).is_empty());
        assert!(split_csv(Some("")).is_empty());
    }

    #[test]
    fn error_maps_to_status() {
        let err = ApiError(MemoryError::NotFound("user x".into()));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let err = ApiError(MemoryError::ParseFailure("bad output".into()));
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
