//! HTTP surface tests: auth, envelopes, and the insert-then-flush path,
//! driven through the router with tower's oneshot.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use recall_core::config::RecallConfig;
use recall_gateway::app::{build_router, AppState};
use recall_llm::testing::ScriptedProvider;

const TOKEN: &str = "test-root-token";

fn test_app() -> (Router, ScriptedProvider) {
    let mut config = RecallConfig::default();
    config.gateway.access_token = TOKEN.to_string();
    config.memory.min_event_summary_tokens = 1;
    config.llm.max_retries = 0;
    config.llm.timeout_secs = 5;

    let db = recall_store::open_in_memory().unwrap();
    let provider = ScriptedProvider::new();
    let state =
        Arc::new(AppState::new(config, db, Arc::new(provider.clone())).unwrap());
    (build_router(state), provider)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json");
    match body {
        Some(v) => builder.body(Body::from(v.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn create_user(app: &Router) -> String {
    let (status, body) = send(
        app,
        authed("POST", "/api/v1/users", Some(json!({"data": {"plan": "pro"}}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["errno"], 0);
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn healthcheck_needs_no_auth() {
    let (app, _) = test_app();
    let request = Request::builder()
        .uri("/api/v1/healthcheck")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["errno"], 0);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn missing_or_wrong_token_is_unauthorized() {
    let (app, _) = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["errno"], 401);

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/users")
        .header(header::AUTHORIZATION, "Bearer wrong")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn user_crud_roundtrip() {
    let (app, _) = test_app();
    let user_id = create_user(&app).await;

    let (status, body) = send(&app, authed("GET", &format!("/api/v1/users/{user_id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["additional_fields"]["plan"], "pro");

    let (status, _) = send(
        &app,
        authed("DELETE", &format!("/api/v1/users/{user_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, authed("GET", &format!("/api/v1/users/{user_id}"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errno"], 404);
}

#[tokio::test]
async fn insert_chat_with_wait_runs_the_pipeline() {
    let (app, provider) = test_app();
    let user_id = create_user(&app).await;

    provider.push("extract_profile", "- basic_info::name::Gus");
    provider.push("summary_chats", "User introduced themselves as Gus.");

    let blob = json!({
        "type": "chat",
        "messages": [
            {"role": "user", "content": "Hi, I'm Gus"},
            {"role": "assistant", "content": "Nice to meet you, Gus!"}
        ]
    });
    let (status, body) = send(
        &app,
        authed(
            "POST",
            &format!("/api/v1/blobs/insert/{user_id}?wait_process=true"),
            Some(blob),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["errno"], 0);
    assert_eq!(body["data"]["flush"]["added"].as_array().unwrap().len(), 1);
    let event_id = body["data"]["flush"]["event_id"].as_str().unwrap().to_string();

    // the profile slot is visible
    let (_, body) = send(
        &app,
        authed("GET", &format!("/api/v1/users/profile/{user_id}"), None),
    )
    .await;
    let profiles = body["data"]["profiles"].as_array().unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0]["attributes"]["topic"], "basic_info");
    assert!(profiles[0]["content"].as_str().unwrap().contains("Gus"));

    // the returned event id is readable through the event API
    let (_, body) = send(
        &app,
        authed("GET", &format!("/api/v1/users/event/{user_id}"), None),
    )
    .await;
    let events = body["data"]["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["id"], event_id.as_str());

    // context includes the new slot
    let (_, body) = send(
        &app,
        authed(
            "GET",
            &format!("/api/v1/users/context/{user_id}?max_tokens=500"),
            None,
        ),
    )
    .await;
    let context = body["data"]["context"].as_str().unwrap();
    assert!(context.contains("basic_info::name"));
}

#[tokio::test]
async fn deleting_a_user_also_drops_cached_profiles() {
    let (app, _) = test_app();
    let user_id = create_user(&app).await;

    let profile = json!({
        "content": "likes hiking",
        "attributes": {"topic": "interest", "sub_topic": "sports"}
    });
    let (status, _) = send(
        &app,
        authed(
            "POST",
            &format!("/api/v1/users/profile/{user_id}"),
            Some(profile),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // this read populates the profile cache for the user
    let (_, body) = send(
        &app,
        authed("GET", &format!("/api/v1/users/profile/{user_id}"), None),
    )
    .await;
    assert_eq!(body["data"]["profiles"].as_array().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        authed("DELETE", &format!("/api/v1/users/{user_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // within the cache TTL, the deleted slots must not resurface
    let (status, body) = send(
        &app,
        authed("GET", &format!("/api/v1/users/profile/{user_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["profiles"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn buffer_capacity_reports_idle_entries() {
    let (app, _) = test_app();
    let user_id = create_user(&app).await;

    let blob = json!({
        "type": "chat",
        "messages": [{"role": "user", "content": "hello there"}]
    });
    let (status, _) = send(
        &app,
        authed(
            "POST",
            &format!("/api/v1/blobs/insert/{user_id}"),
            Some(blob),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        authed(
            "GET",
            &format!("/api/v1/users/buffer/capacity/{user_id}/chat?status=idle"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 1);
    assert!(body["data"]["token_size"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn profile_config_is_validated_before_storing() {
    let (app, _) = test_app();

    let (status, _) = send(
        &app,
        authed(
            "POST",
            "/api/v1/project/profile_config",
            Some(json!({"profile_config": "language: fr"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let doc = "language: en\nprofile_strict_mode: true";
    let (status, _) = send(
        &app,
        authed(
            "POST",
            "/api/v1/project/profile_config",
            Some(json!({"profile_config": doc})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, authed("GET", "/api/v1/project/profile_config", None)).await;
    assert_eq!(body["data"]["profile_config"], doc);
}

#[tokio::test]
async fn event_search_uses_embeddings() {
    let (app, provider) = test_app();
    let user_id = create_user(&app).await;

    provider.push("extract_profile", "- interest::travel::loves China");
    provider.push("summary_chats", "User talked about a trip to China.");
    let blob = json!({
        "type": "chat",
        "messages": [{"role": "user", "content": "I love traveling to China"}]
    });
    send(
        &app,
        authed(
            "POST",
            &format!("/api/v1/blobs/insert/{user_id}?wait_process=true"),
            Some(blob),
        ),
    )
    .await;

    // the scripted embedding is deterministic, so the same text scores 1.0
    let (status, body) = send(
        &app,
        authed(
            "GET",
            &format!(
                "/api/v1/users/event/search/{user_id}?query=User%20talked%20about%20a%20trip%20to%20China.&topk=5&similarity_threshold=0.5"
            ),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let events = body["data"]["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0]["similarity"].as_f64().unwrap() > 0.99);
}
