pub mod error;
pub mod handlers;
pub mod ip;
pub mod rate_limit;
pub mod routes;
pub mod state;

use anyhow::{Context, Result};
use state::AppState;
use std::net::SocketAddr;

pub async fn run(state: AppState) -> Result<()> {
    let bind_addr = state.config.server.bind_addr.clone();
    let app = routes::build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, finishing active requests...");
}
