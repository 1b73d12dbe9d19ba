//! `turnrelay serve`

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use turnrelay_core::api::{self, AppState};
use turnrelay_core::{PlanController, ProcessAgent, RelayConfig, SqliteStore};

pub async fn run(config: RelayConfig, bind: Option<String>) -> Result<()> {
    let db_path = config.storage.database_path()?;
    let store = SqliteStore::open(&db_path)?;
    info!("Plan database at {:?}", db_path);

    let agent = ProcessAgent::from_config(&config.agent);
    info!("Agent command: {}", config.agent.command);

    let controller = PlanController::new(Arc::new(store), Arc::new(agent))
        .with_turn_timeout(config.agent.turn_timeout());
    let app = api::router(AppState::new(controller));

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutting down");
}
