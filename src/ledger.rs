//! External balance ledger
//!
//! The ledger is the authority on player balances. Every call carries an
//! idempotency key (`<matchId>:debit` or `<matchId>:credit`) so a re-issued
//! call after a crash cannot move money twice.

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Debit => "debit",
            Direction::Credit => "credit",
        }
    }
}

pub fn idempotency_key(match_id: &str, direction: Direction) -> String {
    format!("{}:{}", match_id, direction.as_str())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerRequest {
    pub idempotency_key: String,
    pub txn_type: Direction,
    pub match_id: String,
    pub amount: Decimal,
    pub operator_id: String,
    pub user_id: String,
    pub game_id: String,
    #[serde(skip)]
    pub token: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LedgerReceipt {
    pub txn_id: String,
    /// Balance after the movement, when the ledger reports it
    #[serde(default)]
    pub balance: Option<Decimal>,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger rejected the session token")]
    InvalidSession,

    #[error("ledger rejected the request: {0}")]
    Rejected(String),

    #[error("ledger call timed out")]
    Timeout,

    #[error("ledger transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn debit(&self, request: &LedgerRequest) -> Result<LedgerReceipt, LedgerError>;
    async fn credit(&self, request: &LedgerRequest) -> Result<LedgerReceipt, LedgerError>;
}

/// JSON-over-HTTP ledger client
pub struct HttpLedger {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLedger {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, request: &LedgerRequest) -> Result<LedgerReceipt, LedgerError> {
        let url = format!("{}/service/operator/user/balance/v2", self.base_url);
        debug!(
            key = %request.idempotency_key,
            amount = %request.amount,
            "Ledger request"
        );

        let response = self
            .client
            .post(&url)
            .header("token", &request.token)
            .header("idempotency-key", &request.idempotency_key)
            .json(request)
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(LedgerError::InvalidSession);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Rejected(format!("{}: {}", status, body)));
        }

        response
            .json::<LedgerReceipt>()
            .await
            .map_err(|e| LedgerError::Transport(format!("invalid ledger response: {}", e)))
    }
}

fn map_transport(err: reqwest::Error) -> LedgerError {
    if err.is_timeout() {
        LedgerError::Timeout
    } else {
        LedgerError::Transport(err.to_string())
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn debit(&self, request: &LedgerRequest) -> Result<LedgerReceipt, LedgerError> {
        self.post(request).await
    }

    async fn credit(&self, request: &LedgerRequest) -> Result<LedgerReceipt, LedgerError> {
        self.post(request).await
    }
}
