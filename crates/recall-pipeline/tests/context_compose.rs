//! Context composer tests against in-memory SQLite.

use std::sync::Arc;
use std::time::Duration;

use recall_core::config::{LlmConfig, MemoryConfig, ROOT_PROJECT_ID};
use recall_core::project::ProfileConfig;
use recall_core::tokens::count_tokens;
use recall_core::types::{EventData, ProfileAttributes, ProfileDelta};
use recall_coord::Cache;
use recall_llm::testing::ScriptedProvider;
use recall_llm::LlmGateway;
use recall_pipeline::{ContextComposer, ContextParams};
use recall_store::events::EventStore;
use recall_store::profiles::ProfileStore;
use recall_store::projects::ProjectStore;

const USER: &str = "user-1";

fn composer() -> (Arc<ProfileStore>, Arc<EventStore>, ContextComposer) {
    let db = recall_store::open_in_memory().unwrap();
    let profiles = Arc::new(ProfileStore::new(
        db.clone(),
        Arc::new(Cache::new()),
        Duration::from_secs(300),
    ));
    let events = Arc::new(EventStore::new(db.clone()));
    let projects = Arc::new(ProjectStore::new(db));
    projects.ensure_root().unwrap();
    let gateway = Arc::new(LlmGateway::new(
        Arc::new(ScriptedProvider::new()),
        projects,
        LlmConfig {
            max_retries: 0,
            timeout_secs: 5,
            ..Default::default()
        },
    ));
    let composer = ContextComposer::new(
        profiles.clone(),
        events.clone(),
        gateway,
        MemoryConfig::default(),
    );
    (profiles, events, composer)
}

fn seed(profiles: &ProfileStore, events: &EventStore) {
    let slots: Vec<(String, ProfileAttributes)> = vec![
        (
            "software engineer at ACME".into(),
            ProfileAttributes::new("work", "title"),
        ),
        (
            "loves traveling to China".into(),
            ProfileAttributes::new("interest", "travel"),
        ),
        (
            "feeling optimistic lately".into(),
            ProfileAttributes::new("psychological", "mood"),
        ),
    ];
    profiles.add_many(ROOT_PROJECT_ID, USER, &slots).unwrap();
    for i in 0..3 {
        events
            .append(
                ROOT_PROJECT_ID,
                USER,
                &EventData {
                    event_tip: Some(format!("session {i} summary")),
                    event_tags: None,
                    profile_delta: vec![ProfileDelta {
                        content: format!("delta {i}"),
                        attributes: ProfileAttributes::new("work", "title"),
                    }],
                },
                None,
            )
            .unwrap();
    }
}

#[tokio::test]
async fn renders_profiles_and_events_within_budget() {
    let (profiles, events, composer) = composer();
    seed(&profiles, &events);

    let params = ContextParams {
        max_tokens: 400,
        ..Default::default()
    };
    let context = composer
        .compose(ROOT_PROJECT_ID, USER, &ProfileConfig::default(), &params)
        .await
        .unwrap();

    assert!(context.contains("<memory>"));
    assert!(context.contains("work::title: software engineer at ACME"));
    assert!(context.contains("session 2 summary"));
    // fixed overhead: the context-pack frame around the two sections
    let frame =
        recall_core::tokens::count_tokens(&recall_pipeline::prompts::context_pack::render(
            recall_pipeline::prompts::Lang::En,
            "",
            "",
        ));
    assert!(count_tokens(&context) <= params.max_tokens + frame);
}

#[tokio::test]
async fn only_topics_excludes_and_prefer_topics_leads() {
    let (profiles, events, composer) = composer();
    seed(&profiles, &events);

    let params = ContextParams {
        max_tokens: 400,
        only_topics: vec!["interest".into(), "psychological".into()],
        prefer_topics: vec!["psychological".into()],
        ..Default::default()
    };
    let context = composer
        .compose(ROOT_PROJECT_ID, USER, &ProfileConfig::default(), &params)
        .await
        .unwrap();

    assert!(!context.contains("work::title"));
    let mood = context.find("psychological::mood").unwrap();
    let travel = context.find("interest::travel").unwrap();
    assert!(mood < travel);
}

#[tokio::test]
async fn tiny_budget_yields_empty_sections() {
    let (profiles, events, composer) = composer();
    seed(&profiles, &events);

    let params = ContextParams {
        max_tokens: 1,
        ..Default::default()
    };
    let context = composer
        .compose(ROOT_PROJECT_ID, USER, &ProfileConfig::default(), &params)
        .await
        .unwrap();
    assert!(!context.contains("work::title"));
    assert!(!context.contains("session"));
}
