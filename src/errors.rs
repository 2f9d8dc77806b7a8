//! Error types for the fruitcut game server
//!
//! Every wager operation returns a [`GameError`]. Each variant belongs to one
//! [`ErrorKind`], which decides how the failure is reported to the player.

use serde::Serialize;

use crate::history::HistoryError;
use crate::queue::PublishError;
use crate::store::StoreError;

/// Failure classes used at the operation boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input. Nothing was mutated.
    Validation,
    /// No active wager/round, or the round is stale.
    StateConflict,
    /// The ledger refused or did not answer.
    UpstreamFailure,
    /// The ledger or the cache no longer knows the player's session.
    SessionExpired,
    /// Store or serialization failure inside the server.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::StateConflict => "state_conflict",
            ErrorKind::UpstreamFailure => "upstream_failure",
            ErrorKind::SessionExpired => "session_expired",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Errors produced by the wager state machine and its collaborators
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("bet amount missing or outside the configured limits")]
    InvalidAmount,

    #[error("cached balance is lower than the bet amount")]
    InsufficientBalance,

    #[error("no player session cached for this connection")]
    NoSession,

    #[error("a wager is already in progress for this player")]
    WagerInProgress,

    #[error("no active wager for match {match_id}")]
    NoActiveWager { match_id: String },

    #[error("round {round_id} is closed: {reason}")]
    RoundClosed { round_id: String, reason: &'static str },

    #[error("event {event_id:?} is not a valid target in round {round_id}")]
    InvalidEvent { round_id: String, event_id: Option<u32> },

    #[error("ledger debit failed for match {match_id}: {reason}")]
    DebitFailed { match_id: String, reason: String },

    #[error("ledger credit failed for match {match_id}: {reason}")]
    CreditFailed { match_id: String, reason: String },

    #[error("ledger reported an invalid session")]
    SessionExpired,

    #[error("state store failure: {0}")]
    Store(#[from] StoreError),

    #[error("history store failure: {0}")]
    History(#[from] HistoryError),

    #[error("cashout publish failure: {0}")]
    Publish(#[from] PublishError),
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::InvalidAmount
            | GameError::InsufficientBalance
            | GameError::InvalidEvent { .. } => ErrorKind::Validation,
            GameError::WagerInProgress
            | GameError::NoActiveWager { .. }
            | GameError::RoundClosed { .. } => ErrorKind::StateConflict,
            GameError::DebitFailed { .. } | GameError::CreditFailed { .. } => {
                ErrorKind::UpstreamFailure
            }
            GameError::NoSession | GameError::SessionExpired => ErrorKind::SessionExpired,
            GameError::Store(_) | GameError::History(_) | GameError::Publish(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Message sent to the player in a `betError` frame
    pub fn client_message(&self) -> &'static str {
        match self {
            GameError::InvalidAmount => "Invalid Bet Amount",
            GameError::InsufficientBalance => "Insufficient Balance",
            GameError::NoSession => "Invalid Player Details",
            GameError::WagerInProgress => "Bet already placed",
            GameError::NoActiveWager { .. } => "No active bet for the match ID",
            GameError::RoundClosed { .. } => "Round has been closed for this event",
            GameError::InvalidEvent { .. } => {
                "Invalid fruit id or fruit does not belong to the round"
            }
            GameError::DebitFailed { .. } => "Bet Cancelled by Upstream",
            GameError::CreditFailed { .. } => "Cashout pending, it will be retried",
            GameError::SessionExpired => "Session Timed Out",
            GameError::Store(_) | GameError::History(_) | GameError::Publish(_) => {
                "Something went wrong"
            }
        }
    }
}

pub type GameResult<T> = Result<T, GameError>;

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Startup-level error for the server binary
#[derive(Debug, thiserror::Error)]
pub enum FruitcutError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("History store error: {0}")]
    History(#[from] HistoryError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Upstream client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid listen address: {0}")]
    Address(#[from] std::net::AddrParseError),
}

pub type FruitcutResult<T> = Result<T, FruitcutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(GameError::InvalidAmount.kind(), ErrorKind::Validation);
        assert_eq!(
            GameError::NoActiveWager { match_id: "m".to_string() }.kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            GameError::DebitFailed {
                match_id: "m".to_string(),
                reason: "down".to_string()
            }
            .kind(),
            ErrorKind::UpstreamFailure
        );
        assert_eq!(GameError::SessionExpired.kind(), ErrorKind::SessionExpired);
    }

    #[test]
    fn test_client_message_hides_internal_detail() {
        let err = GameError::Store(StoreError::Backend("redis down at 10.0.0.7".to_string()));
        assert_eq!(err.client_message(), "Something went wrong");
        assert!(err.to_string().contains("10.0.0.7"));
    }

    #[test]
    fn test_configuration_error_display() {
        let err = ConfigurationError::InvalidValue {
            field: "game.min_bet".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        };
        assert!(err.to_string().contains("game.min_bet"));
        assert!(err.to_string().contains("must be positive"));
    }
}
