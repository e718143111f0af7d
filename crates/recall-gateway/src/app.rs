use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;

use recall_core::config::RecallConfig;
use recall_coord::{Cache, LockRegistry, WorkQueues};
use recall_llm::{LlmGateway, LlmProvider};
use recall_pipeline::{Consolidator, ContextComposer};
use recall_scheduler::FlushScheduler;
use recall_store::blobs::BlobStore;
use recall_store::buffer::BufferStore;
use recall_store::events::EventStore;
use recall_store::profiles::ProfileStore;
use recall_store::projects::ProjectStore;
use recall_store::status::UserStatusStore;
use recall_store::users::UserStore;
use recall_store::Db;

/// Central shared state — passed as Arc<AppState> to all handlers.
pub struct AppState {
    pub config: RecallConfig,
    pub db: Db,
    pub projects: Arc<ProjectStore>,
    pub users: Arc<UserStore>,
    pub blobs: Arc<BlobStore>,
    pub buffer: Arc<BufferStore>,
    pub profiles: Arc<ProfileStore>,
    pub events: Arc<EventStore>,
    pub statuses: Arc<UserStatusStore>,
    pub llm: Arc<LlmGateway>,
    pub scheduler: Arc<FlushScheduler>,
    pub composer: Arc<ContextComposer>,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire every subsystem onto the shared database and coordination
    /// registries. Ensures the root project exists.
    pub fn new(
        config: RecallConfig,
        db: Db,
        provider: Arc<dyn LlmProvider>,
    ) -> recall_store::Result<Self> {
        let cache = Arc::new(Cache::new());
        let locks = Arc::new(LockRegistry::new());
        let queues = Arc::new(WorkQueues::new());
        let shutdown = CancellationToken::new();

        let projects = Arc::new(ProjectStore::new(db.clone()));
        projects.ensure_root()?;
        let users = Arc::new(UserStore::new(db.clone()));
        let blobs = Arc::new(BlobStore::new(db.clone()));
        let buffer = Arc::new(BufferStore::new(db.clone()));
        let profiles = Arc::new(ProfileStore::new(
            db.clone(),
            cache,
            Duration::from_secs(config.memory.profile_cache_ttl_secs),
        ));
        let events = Arc::new(EventStore::new(db.clone()));
        let statuses = Arc::new(UserStatusStore::new(db.clone()));

        let llm = Arc::new(LlmGateway::new(provider, projects.clone(), config.llm.clone()));
        let consolidator = Arc::new(Consolidator::new(
            profiles.clone(),
            events.clone(),
            llm.clone(),
            config.memory.clone(),
        ));
        let composer = Arc::new(ContextComposer::new(
            profiles.clone(),
            events.clone(),
            llm.clone(),
            config.memory.clone(),
        ));
        let scheduler = Arc::new(FlushScheduler::new(
            buffer.clone(),
            blobs.clone(),
            projects.clone(),
            locks,
            queues,
            consolidator,
            config.memory.clone(),
            config.flush.clone(),
            shutdown.clone(),
        ));

        Ok(Self {
            config,
            db,
            projects,
            users,
            blobs,
            buffer,
            profiles,
            events,
            statuses,
            llm,
            scheduler,
            composer,
            shutdown,
        })
    }
}

/// Assemble the versioned API router. Everything except the healthcheck sits
/// behind bearer auth.
pub fn build_router(state: Arc<AppState>) -> Router {
    let authed = Router::new()
        .route("/users", post(crate::http::users::create_user))
        .route(
            "/users/{id}",
            get(crate::http::users::get_user)
                .put(crate::http::users::update_user)
                .delete(crate::http::users::delete_user),
        )
        .route(
            "/users/blobs/{id}/{blob_type}",
            get(crate::http::blobs::list_blob_ids),
        )
        .route("/blobs/insert/{id}", post(crate::http::blobs::insert_blob))
        .route(
            "/blobs/{id}/{blob_id}",
            get(crate::http::blobs::get_blob).delete(crate::http::blobs::delete_blob),
        )
        .route(
            "/users/buffer/{id}/{blob_type}",
            post(crate::http::buffer::flush_buffer),
        )
        .route(
            "/users/buffer/capacity/{id}/{blob_type}",
            get(crate::http::buffer::buffer_capacity),
        )
        .route(
            "/users/profile/{id}",
            get(crate::http::profiles::list_profiles).post(crate::http::profiles::add_profile),
        )
        .route(
            "/users/profile/{id}/{profile_id}",
            axum::routing::put(crate::http::profiles::update_profile)
                .delete(crate::http::profiles::delete_profile),
        )
        .route("/users/event/{id}", get(crate::http::events::list_events))
        .route(
            "/users/event/{id}/{event_id}",
            axum::routing::put(crate::http::events::update_event)
                .delete(crate::http::events::delete_event),
        )
        .route(
            "/users/event/search/{id}",
            get(crate::http::events::search_events),
        )
        .route(
            "/users/status/{id}",
            get(crate::http::status::list_statuses).post(crate::http::status::append_status),
        )
        .route("/users/context/{id}", get(crate::http::context::get_context))
        .route(
            "/project/profile_config",
            get(crate::http::project::get_profile_config)
                .post(crate::http::project::set_profile_config),
        )
        .route("/project/usage", get(crate::http::project::get_usage))
        .route("/project/users", get(crate::http::project::list_users))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::auth::require_auth,
        ));

    let api = Router::new()
        .route("/healthcheck", get(crate::http::health::healthcheck))
        .merge(authed);

    Router::new()
        .nest("/api/v1", api)
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
