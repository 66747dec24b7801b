use anyhow::{Context, Result};
use labels_engine::config::Config;
use labels_engine::server::{create_router, AppState};
use labels_engine::store::LabelStore;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when absent)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("labels_engine=info".parse()?),
        )
        .init();

    info!("Starting label server");

    let config = Config::from_env()?;
    info!(
        "Languages: {} (default: {})",
        config
            .labels
            .languages
            .iter()
            .map(|code| code.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        config.labels.default_language
    );

    let store = Arc::new(
        LabelStore::open(&config)
            .await
            .context("Failed to open label storage")?,
    );

    // Warm the cache so a broken store shows up at startup
    let loaded = store.load().await;
    match &loaded.warning {
        Some(warning) => warn!("Serving with an empty label table: {}", warning),
        None => info!("{} labels ready", loaded.table.len()),
    }

    if config.api_key.is_none() {
        info!("API_KEY not set, admin routes are disabled");
    }

    let state = Arc::new(AppState::new(store, config.labels.clone(), config.api_key.clone()));
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on {}", addr);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
