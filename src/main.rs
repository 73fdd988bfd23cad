//! metsel-loyalty server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints and the
//! session fold ticker.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use metsel_loyalty::api;
use metsel_loyalty::app_state::AppState;
use metsel_loyalty::config::{AcademyConfig, StorageBackend};
use metsel_loyalty::domain::{LevelTable, SystemClock};
use metsel_loyalty::persistence::{KeyValueStore, MemoryStore, PostgresStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AcademyConfig::from_env().map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        addr = %config.listen_addr,
        backend = %config.storage_backend,
        "starting metsel-loyalty"
    );

    let store: Arc<dyn KeyValueStore> = match config.storage_backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Postgres => Arc::new(
            PostgresStore::connect(&config)
                .await
                .context("connecting to postgres")?,
        ),
    };

    let state = AppState::build(
        store,
        Arc::new(SystemClock),
        LevelTable::default(),
        &config,
    );
    let sessions = Arc::clone(&state.session_service);
    let ticker = sessions.spawn_ticker(config.session_tick_interval());

    let app = api::build_app(state);
    #[cfg(feature = "swagger-ui")]
    let app = {
        use utoipa::OpenApi;
        app.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", api::openapi::ApiDoc::openapi()),
        )
    };

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ticker.stop();
    sessions.unload_all().await;
    tracing::info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
