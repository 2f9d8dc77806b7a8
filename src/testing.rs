//! In-process collaborators for tests and local play
//!
//! [`MockLedger`] keeps a balance and records every call, and can be told to
//! fail or stall upcoming calls. [`RecordingPublisher`] keeps published
//! cashouts. [`StaticUserDirectory`] resolves a fixed set of tokens.

use crate::directory::{DirectoryError, UserDirectory, UserProfile};
use crate::ledger::{Direction, Ledger, LedgerError, LedgerReceipt, LedgerRequest};
use crate::queue::{CashoutEvent, EventPublisher, PublishError, CASHOUT_QUEUE};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct MockLedger {
    calls: Mutex<Vec<LedgerRequest>>,
    applied: Mutex<HashSet<String>>,
    debit_failures: Mutex<VecDeque<LedgerError>>,
    credit_failures: Mutex<VecDeque<LedgerError>>,
    balance: Mutex<Option<Decimal>>,
    delay: Mutex<Option<Duration>>,
    next_txn: AtomicU64,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a balance and report it in receipts
    pub fn with_balance(balance: Decimal) -> Self {
        let ledger = Self::default();
        *lock(&ledger.balance) = Some(balance);
        ledger
    }

    pub fn fail_next_debit(&self, err: LedgerError) {
        lock(&self.debit_failures).push_back(err);
    }

    pub fn fail_next_credit(&self, err: LedgerError) {
        lock(&self.credit_failures).push_back(err);
    }

    /// Hold every call for `delay` before answering
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub fn balance(&self) -> Option<Decimal> {
        *lock(&self.balance)
    }

    pub fn calls(&self) -> Vec<LedgerRequest> {
        lock(&self.calls).clone()
    }

    pub fn debits(&self) -> Vec<LedgerRequest> {
        self.calls_for(Direction::Debit)
    }

    pub fn credits(&self) -> Vec<LedgerRequest> {
        self.calls_for(Direction::Credit)
    }

    fn calls_for(&self, direction: Direction) -> Vec<LedgerRequest> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.txn_type == direction)
            .cloned()
            .collect()
    }

    async fn apply(&self, request: &LedgerRequest) -> Result<LedgerReceipt, LedgerError> {
        lock(&self.calls).push(request.clone());

        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = match request.txn_type {
            Direction::Debit => lock(&self.debit_failures).pop_front(),
            Direction::Credit => lock(&self.credit_failures).pop_front(),
        };
        if let Some(err) = failure {
            return Err(err);
        }

        // replayed idempotency keys do not move money again
        let first_time = lock(&self.applied).insert(request.idempotency_key.clone());
        let mut balance = lock(&self.balance);
        if first_time {
            if let Some(current) = balance.as_mut() {
                match request.txn_type {
                    Direction::Debit => *current -= request.amount,
                    Direction::Credit => *current += request.amount,
                }
            }
        }

        Ok(LedgerReceipt {
            txn_id: format!("txn-{}", self.next_txn.fetch_add(1, Ordering::SeqCst) + 1),
            balance: *balance,
        })
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn debit(&self, request: &LedgerRequest) -> Result<LedgerReceipt, LedgerError> {
        self.apply(request).await
    }

    async fn credit(&self, request: &LedgerRequest) -> Result<LedgerReceipt, LedgerError> {
        self.apply(request).await
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<CashoutEvent>>,
    failures: Mutex<u32>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: u32) {
        *lock(&self.failures) = count;
    }

    pub fn events(&self) -> Vec<CashoutEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish_cashout(&self, event: &CashoutEvent) -> Result<(), PublishError> {
        {
            let mut failures = lock(&self.failures);
            if *failures > 0 {
                *failures -= 1;
                return Err(PublishError::Unavailable {
                    queue: CASHOUT_QUEUE,
                    reason: "scripted failure".to_string(),
                });
            }
        }
        lock(&self.events).push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct StaticUserDirectory {
    users: HashMap<String, UserProfile>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, token: impl Into<String>, profile: UserProfile) -> Self {
        self.users.insert(token.into(), profile);
        self
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn resolve(&self, token: &str, _game_id: &str) -> Result<UserProfile, DirectoryError> {
        self.users
            .get(token)
            .cloned()
            .ok_or(DirectoryError::UnknownToken)
    }
}

/// Profile with the given ids, a display name and a balance
pub fn profile(operator_id: &str, user_id: &str, balance: Decimal) -> UserProfile {
    UserProfile {
        user_id: user_id.to_string(),
        operator_id: operator_id.to_string(),
        name: format!("player-{}", user_id),
        balance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(key: &str, direction: Direction, amount: i64) -> LedgerRequest {
        LedgerRequest {
            idempotency_key: key.to_string(),
            txn_type: direction,
            match_id: "m1".to_string(),
            amount: Decimal::new(amount, 0),
            operator_id: "op".to_string(),
            user_id: "u1".to_string(),
            game_id: "g".to_string(),
            token: "t".to_string(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_mock_ledger_is_idempotent_per_key() {
        let ledger = MockLedger::with_balance(Decimal::new(100, 0));
        ledger.debit(&request("m1:debit", Direction::Debit, 10)).await.unwrap();
        let replay = ledger.debit(&request("m1:debit", Direction::Debit, 10)).await.unwrap();

        assert_eq!(replay.balance, Some(Decimal::new(90, 0)));
        assert_eq!(ledger.debits().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_failure_consumed_once() {
        let ledger = MockLedger::new();
        ledger.fail_next_credit(LedgerError::Timeout);
        assert!(ledger.credit(&request("k", Direction::Credit, 1)).await.is_err());
        assert!(ledger.credit(&request("k", Direction::Credit, 1)).await.is_ok());
    }
}
