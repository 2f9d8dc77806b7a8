//! Round, wager and session records
//!
//! These are the values kept in the state store. They serialize with camelCase
//! field names, which is also the shape sent to clients.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable player identity: operator plus user id
///
/// Round and wager state is keyed by this, not by connection, so a reconnect
/// picks up an in-flight wager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerKey {
    pub operator_id: String,
    pub user_id: String,
}

impl PlayerKey {
    pub fn new(operator_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            operator_id: operator_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for PlayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.operator_id, self.user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    NotStarted,
    Ongoing,
    Ended,
}

/// One fruit in a round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// 1-based, unique within the round
    pub event_id: u32,
    /// Zero is a losing fruit
    pub multiplier: Decimal,
    pub asset_id: u8,
    /// Launch delay in milliseconds
    pub delay: u32,
    /// Flight duration in milliseconds
    pub flight_duration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub round_id: String,
    pub status: RoundStatus,
    pub start_time: u64,
    pub end_time: u64,
    pub server_time: u64,
    pub events: Vec<Event>,
}

impl Round {
    pub fn event(&self, event_id: u32) -> Option<&Event> {
        self.events.iter().find(|e| e.event_id == event_id)
    }
}

/// Cached rounds for one player: the live round and the one before it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyState {
    pub current: Round,
    #[serde(default)]
    pub previous: Option<Round>,
}

impl LobbyState {
    pub fn find(&self, round_id: &str) -> Option<&Round> {
        if self.current.round_id == round_id {
            return Some(&self.current);
        }
        self.previous.as_ref().filter(|r| r.round_id == round_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WagerStatus {
    NotStarted,
    Active,
    Committed,
    Win,
    Loss,
    Cancelled,
}

impl WagerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WagerStatus::Win | WagerStatus::Loss | WagerStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WagerStatus::NotStarted => "NOT_STARTED",
            WagerStatus::Active => "ACTIVE",
            WagerStatus::Committed => "COMMITTED",
            WagerStatus::Win => "WIN",
            WagerStatus::Loss => "LOSS",
            WagerStatus::Cancelled => "CANCELLED",
        }
    }
}

/// State of one money movement against the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerLeg {
    #[default]
    None,
    Pending,
    Done {
        #[serde(rename = "txnId")]
        txn_id: String,
    },
    Failed {
        reason: String,
    },
}

impl LedgerLeg {
    pub fn is_done(&self) -> bool {
        matches!(self, LedgerLeg::Done { .. })
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, LedgerLeg::Pending)
    }

    pub fn txn_id(&self) -> Option<&str> {
        match self {
            LedgerLeg::Done { txn_id } => Some(txn_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedEvent {
    pub round_id: String,
    pub event_id: u32,
    pub multiplier: Decimal,
    pub asset_id: u8,
}

/// A player's bet, from placement to settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wager {
    #[serde(rename = "matchId")]
    pub wager_id: String,
    pub player: PlayerKey,
    pub game_id: String,
    /// Ledger session token, refreshed when the player reconnects
    pub token: String,
    pub name: String,
    pub avatar: u32,
    pub bet_amount: Decimal,
    pub multiplier: Decimal,
    pub last_multiplier: Decimal,
    pub win_amount: Decimal,
    pub committed_events: Vec<CommittedEvent>,
    pub status: WagerStatus,
    pub match_start_time: u64,
    pub match_end_time: Option<u64>,
    #[serde(default)]
    pub debit: LedgerLeg,
    #[serde(default)]
    pub credit: LedgerLeg,
    #[serde(default)]
    pub credit_attempts: u32,
    #[serde(default)]
    pub bet_recorded: bool,
    #[serde(default)]
    pub settlement_recorded: bool,
    #[serde(default)]
    pub cashout_published: bool,
}

/// Wager as shown to the player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WagerView {
    pub match_id: String,
    pub bet_amount: Decimal,
    pub multiplier: Decimal,
    pub win_amount: Decimal,
    pub status: WagerStatus,
    pub cut_fruits: Vec<CommittedEvent>,
    pub match_start_time: u64,
    pub match_end_time: Option<u64>,
}

/// Cached per-connection player data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSession {
    pub conn_id: String,
    pub player: PlayerKey,
    pub name: String,
    pub avatar: u32,
    pub balance: Decimal,
    pub token: String,
    pub game_id: String,
}

/// Payload of the `info` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub user_id: String,
    pub operator_id: String,
    pub balance: Decimal,
}

impl From<&PlayerSession> for BalanceInfo {
    fn from(session: &PlayerSession) -> Self {
        Self {
            user_id: session.player.user_id.clone(),
            operator_id: session.player.operator_id.clone(),
            balance: session.balance,
        }
    }
}
