//! Route Definitions

use super::{handlers::*, websocket::game_socket_handler};
use axum::{routing::get, Router};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // game socket
        .route("/ws", get(game_socket_handler))
        // history reads
        .route("/history", get(history_handler))
        .route("/topwin", get(top_win_handler))
        .route("/matchdata", get(match_data_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
