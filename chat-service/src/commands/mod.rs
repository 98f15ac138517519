//! HTTP command modules.
//!
//! Handlers are grouped by domain:
//! - `auth`: Bearer token to caller identity
//! - `chat`: Turn submission, chat deletion and history
//! - `model`: Model registry and liveness

pub mod auth;
pub mod chat;
pub mod model;

use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

/// Every route the service exposes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat::submit_turn).delete(chat::delete_chat))
        .route("/api/history", get(chat::history))
        .route("/api/models", get(model::list_models))
        .route("/health", get(model::health))
        .with_state(state)
}

/// Bind the configured address and serve until the process exits.
pub async fn serve(state: AppState) -> Result<(), String> {
    let addr = format!("{}:{}", state.settings.server.host, state.settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", addr, e))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| format!("Server error: {}", e))
}
