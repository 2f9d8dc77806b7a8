//! Cashout notifications for downstream reconciliation

use crate::game::types::Wager;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

pub const CASHOUT_QUEUE: &str = "games_cashout";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashoutEvent {
    pub match_id: String,
    pub operator_id: String,
    pub user_id: String,
    pub game_id: String,
    pub bet_amount: Decimal,
    pub win_amount: Decimal,
    pub debit_txn_id: Option<String>,
    pub credit_txn_id: Option<String>,
    pub settled_at: u64,
}

impl CashoutEvent {
    pub fn from_wager(wager: &Wager, now_ms: u64) -> Self {
        Self {
            match_id: wager.wager_id.clone(),
            operator_id: wager.player.operator_id.clone(),
            user_id: wager.player.user_id.clone(),
            game_id: wager.game_id.clone(),
            bet_amount: wager.bet_amount,
            win_amount: wager.win_amount,
            debit_txn_id: wager.debit.txn_id().map(str::to_string),
            credit_txn_id: wager.credit.txn_id().map(str::to_string),
            settled_at: now_ms,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("queue {queue} unavailable: {reason}")]
    Unavailable { queue: &'static str, reason: String },
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_cashout(&self, event: &CashoutEvent) -> Result<(), PublishError>;
}

/// Fans cashout events out to in-process subscribers
pub struct BroadcastPublisher {
    sender: broadcast::Sender<CashoutEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CashoutEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish_cashout(&self, event: &CashoutEvent) -> Result<(), PublishError> {
        // No subscribers is not a failure; the event is fire-and-forget
        let receivers = self.sender.send(event.clone()).unwrap_or(0);
        debug!(
            queue = CASHOUT_QUEUE,
            match_id = %event.match_id,
            receivers,
            "Cashout published"
        );
        Ok(())
    }
}
