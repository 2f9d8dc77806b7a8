//! HTTP Request Handlers
//!
//! Read-only history endpoints plus health and metrics. The game itself runs
//! over the websocket in [`super::websocket`].

use super::{
    errors::ApiError,
    middleware::RequestId,
    models::{
        page_size, HealthResponse, HistoryQuery, HistoryResponse, MatchDataQuery,
        MatchDataResponse, TopWinQuery, TopWinResponse,
    },
};
use crate::directory::UserDirectory;
use crate::game::{GameEngine, PlayerKey};
use crate::history::HistoryStore;
use crate::metrics::GameMetrics;
use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub engine: GameEngine,
    pub directory: Arc<dyn UserDirectory>,
    pub history: Arc<dyn HistoryStore>,
    pub metrics: GameMetrics,
    pub version: String,
}

impl AppState {
    pub fn new(engine: GameEngine, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            history: engine.history().clone(),
            metrics: engine.metrics().clone(),
            engine,
            directory,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
        connections: state.engine.connections().len(),
        server_time: Utc::now(),
    })
}

fn player_from(
    request_id: &RequestId,
    user_id: Option<String>,
    operator_id: Option<String>,
) -> Result<PlayerKey, ApiError> {
    match (user_id, operator_id) {
        (Some(user_id), Some(operator_id)) if !user_id.is_empty() && !operator_id.is_empty() => {
            Ok(PlayerKey::new(operator_id, user_id))
        }
        _ => Err(ApiError::bad_request(
            request_id.0.clone(),
            "user_id and operator_id are required",
        )),
    }
}

/// Settled wagers of one player, newest first
/// GET /history?user_id=&operator_id=[&match_id=][&limit=]
pub async fn history_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let player = player_from(&request_id, params.user_id, params.operator_id)?;

    let settlements = match params.match_id {
        Some(match_id) => {
            let record = state
                .history
                .settlement(&match_id)
                .await
                .map_err(|e| ApiError::from_history(request_id.0.clone(), e))?
                .filter(|record| record.player() == player)
                .ok_or_else(|| {
                    ApiError::not_found(
                        request_id.0.clone(),
                        format!("match {} not found", match_id),
                    )
                })?;
            vec![record]
        }
        None => state
            .history
            .settlements_for_player(&player, page_size(params.limit))
            .await
            .map_err(|e| ApiError::from_history(request_id.0.clone(), e))?,
    };

    Ok(Json(HistoryResponse {
        count: settlements.len(),
        settlements,
    }))
}

/// Largest wins across all players
/// GET /topwin[?limit=]
pub async fn top_win_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(params): Query<TopWinQuery>,
) -> Result<Json<TopWinResponse>, ApiError> {
    let wins = state
        .history
        .top_wins(page_size(params.limit))
        .await
        .map_err(|e| ApiError::from_history(request_id.0.clone(), e))?;

    Ok(Json(TopWinResponse { wins }))
}

/// Recently ended rounds of one player
/// GET /matchdata?user_id=&operator_id=[&limit=]
pub async fn match_data_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(params): Query<MatchDataQuery>,
) -> Result<Json<MatchDataResponse>, ApiError> {
    let player = player_from(&request_id, params.user_id, params.operator_id)?;
    let rounds = state
        .history
        .rounds_for_player(&player, page_size(params.limit))
        .await
        .map_err(|e| ApiError::from_history(request_id.0.clone(), e))?;

    Ok(Json(MatchDataResponse { rounds }))
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.metrics.render(),
    )
}
