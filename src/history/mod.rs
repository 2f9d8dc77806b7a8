//! Append-only history of bets, settlements and rounds
//!
//! Written by the settlement path, read by the HTTP history endpoints.

mod memory;
mod rocks;

pub use memory::MemoryHistoryStore;
pub use rocks::RocksHistoryStore;

use crate::game::types::{CommittedEvent, PlayerKey, Round, Wager, WagerStatus};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    #[error("corrupted record: {0}")]
    Corrupted(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type HistoryResult<T> = Result<T, HistoryError>;

/// Written once, when the wager's debit is confirmed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetRecord {
    pub match_id: String,
    pub operator_id: String,
    pub user_id: String,
    pub name: String,
    pub avatar: u32,
    pub bet_amount: Decimal,
    pub debit_txn_id: Option<String>,
    pub match_start_time: u64,
    pub created_at: u64,
}

impl BetRecord {
    pub fn from_wager(wager: &Wager, now_ms: u64) -> Self {
        Self {
            match_id: wager.wager_id.clone(),
            operator_id: wager.player.operator_id.clone(),
            user_id: wager.player.user_id.clone(),
            name: wager.name.clone(),
            avatar: wager.avatar,
            bet_amount: wager.bet_amount,
            debit_txn_id: wager.debit.txn_id().map(str::to_string),
            match_start_time: wager.match_start_time,
            created_at: now_ms,
        }
    }
}

/// Terminal outcome of a wager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub match_id: String,
    pub operator_id: String,
    pub user_id: String,
    pub name: String,
    pub avatar: u32,
    pub bet_amount: Decimal,
    pub win_amount: Decimal,
    pub multiplier: Decimal,
    pub max_mult: Decimal,
    pub status: WagerStatus,
    pub rounds_data: Vec<CommittedEvent>,
    pub debit_txn_id: Option<String>,
    pub credit_txn_id: Option<String>,
    pub match_start_time: u64,
    pub match_end_time: u64,
    pub server_time: u64,
}

impl SettlementRecord {
    pub fn from_wager(wager: &Wager, now_ms: u64) -> Self {
        Self {
            match_id: wager.wager_id.clone(),
            operator_id: wager.player.operator_id.clone(),
            user_id: wager.player.user_id.clone(),
            name: wager.name.clone(),
            avatar: wager.avatar,
            bet_amount: wager.bet_amount,
            win_amount: wager.win_amount,
            multiplier: wager.multiplier,
            max_mult: wager.last_multiplier,
            status: wager.status,
            rounds_data: wager.committed_events.clone(),
            debit_txn_id: wager.debit.txn_id().map(str::to_string),
            credit_txn_id: wager.credit.txn_id().map(str::to_string),
            match_start_time: wager.match_start_time,
            match_end_time: wager.match_end_time.unwrap_or(now_ms),
            server_time: now_ms,
        }
    }

    pub fn player(&self) -> PlayerKey {
        PlayerKey::new(self.operator_id.clone(), self.user_id.clone())
    }
}

/// A round that reached ENDED
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub operator_id: String,
    pub user_id: String,
    pub round: Round,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record_bet(&self, bet: &BetRecord) -> HistoryResult<()>;

    /// Re-recording the same match id replaces the earlier record
    async fn record_settlement(&self, settlement: &SettlementRecord) -> HistoryResult<()>;

    async fn record_round(&self, round: &RoundRecord) -> HistoryResult<()>;

    async fn bet(&self, match_id: &str) -> HistoryResult<Option<BetRecord>>;

    async fn settlement(&self, match_id: &str) -> HistoryResult<Option<SettlementRecord>>;

    /// Newest first
    async fn settlements_for_player(
        &self,
        player: &PlayerKey,
        limit: usize,
    ) -> HistoryResult<Vec<SettlementRecord>>;

    /// Winning settlements, largest win first
    async fn top_wins(&self, limit: usize) -> HistoryResult<Vec<SettlementRecord>>;

    async fn rounds_for_player(&self, player: &PlayerKey, limit: usize) -> HistoryResult<Vec<RoundRecord>>;
}
