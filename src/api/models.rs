//! API Request/Response Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::{RoundRecord, SettlementRecord};

pub const DEFAULT_PAGE: usize = 20;
pub const MAX_PAGE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub connections: usize,
    pub server_time: DateTime<Utc>,
}

/// `GET /history`
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    pub user_id: Option<String>,
    pub operator_id: Option<String>,
    /// Single settlement lookup
    pub match_id: Option<String>,
    pub limit: Option<usize>,
}

/// `GET /topwin`
#[derive(Debug, Clone, Deserialize)]
pub struct TopWinQuery {
    pub limit: Option<usize>,
}

/// `GET /matchdata`
#[derive(Debug, Clone, Deserialize)]
pub struct MatchDataQuery {
    pub user_id: Option<String>,
    pub operator_id: Option<String>,
    pub limit: Option<usize>,
}

/// `GET /ws`
#[derive(Debug, Clone, Deserialize)]
pub struct GameSocketQuery {
    pub token: Option<String>,
    pub game_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub settlements: Vec<SettlementRecord>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopWinResponse {
    pub wins: Vec<SettlementRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDataResponse {
    pub rounds: Vec<RoundRecord>,
}

/// Clamp a requested page size to `1..=MAX_PAGE`
pub fn page_size(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE)
}
