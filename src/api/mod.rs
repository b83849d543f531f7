mod errors;
pub mod handlers;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::engine::ExecutionManager;

/// Shared application state accessible by all handlers.
pub struct AppState {
    pub manager: Arc<ExecutionManager>,
}

/// Build the REST + WebSocket router around a manager instance.
pub fn router(manager: Arc<ExecutionManager>) -> Router {
    let state = Arc::new(AppState { manager });

    Router::new()
        .route("/executions/start", post(handlers::start_execution))
        .route("/executions/active", get(handlers::list_active))
        .route("/executions/history", get(handlers::history))
        .route("/executions/stats/overview", get(handlers::stats_overview))
        .route("/executions/{id}", get(handlers::get_execution))
        .route("/executions/{id}/cancel", post(handlers::cancel_execution))
        .route("/ws", get(ws::websocket_handler))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server.
pub async fn serve(host: &str, port: u16, manager: Arc<ExecutionManager>) -> Result<()> {
    let app = router(manager);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Flowtrack API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
