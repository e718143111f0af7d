use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use recall_gateway::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recall_gateway=info,recall=info,tower_http=debug".into()),
        )
        .init();

    // config path: RECALL_CONFIG env > ~/.recall/recall.toml > defaults
    let config_path = std::env::var("RECALL_CONFIG").ok();
    let config = recall_core::config::RecallConfig::load(config_path.as_deref())
        .unwrap_or_else(|e| {
            tracing::warn!("config load failed ({}), using defaults", e);
            recall_core::config::RecallConfig::default()
        });

    let db = recall_store::open_db(&config.database.path)?;
    let provider = Arc::new(recall_llm::OpenAiProvider::new(
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
    ));

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState::new(config, db, provider)?);
    let shutdown = state.shutdown.clone();
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("recall gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
