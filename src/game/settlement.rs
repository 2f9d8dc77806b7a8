//! Ledger coordination for wagers
//!
//! Each wager moves money at most twice: one debit on the first cut and one
//! credit when it settles as a win. The leg is marked PENDING in the state
//! store before the ledger is called, so an interrupted call is re-issued
//! with the same idempotency key instead of being repeated under a new one.

use super::types::{BalanceInfo, LedgerLeg, Wager, WagerStatus};
use crate::clock::MonotonicClock;
use crate::errors::{GameError, GameResult};
use crate::history::{BetRecord, HistoryStore, SettlementRecord};
use crate::ledger::{idempotency_key, Direction, Ledger, LedgerError, LedgerReceipt, LedgerRequest};
use crate::metrics::GameMetrics;
use crate::queue::{CashoutEvent, EventPublisher};
use crate::store::GameState;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct LedgerCoordinator {
    ledger: Arc<dyn Ledger>,
    history: Arc<dyn HistoryStore>,
    publisher: Arc<dyn EventPublisher>,
    state: GameState,
    clock: MonotonicClock,
    metrics: GameMetrics,
    max_credit_attempts: u32,
}

impl LedgerCoordinator {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        history: Arc<dyn HistoryStore>,
        publisher: Arc<dyn EventPublisher>,
        state: GameState,
        clock: MonotonicClock,
        metrics: GameMetrics,
        max_credit_attempts: u32,
    ) -> Self {
        Self {
            ledger,
            history,
            publisher,
            state,
            clock,
            metrics,
            max_credit_attempts,
        }
    }

    fn request(wager: &Wager, direction: Direction, amount: Decimal) -> LedgerRequest {
        LedgerRequest {
            idempotency_key: idempotency_key(&wager.wager_id, direction),
            txn_type: direction,
            match_id: wager.wager_id.clone(),
            amount,
            operator_id: wager.player.operator_id.clone(),
            user_id: wager.player.user_id.clone(),
            game_id: wager.game_id.clone(),
            token: wager.token.clone(),
            description: format!(
                "{} {} for fruit cut match {}",
                direction.as_str(),
                amount,
                wager.wager_id
            ),
        }
    }

    fn map_failure(wager: &Wager, direction: Direction, err: &LedgerError) -> GameError {
        match (err, direction) {
            (LedgerError::InvalidSession, _) => GameError::SessionExpired,
            (_, Direction::Debit) => GameError::DebitFailed {
                match_id: wager.wager_id.clone(),
                reason: err.to_string(),
            },
            (_, Direction::Credit) => GameError::CreditFailed {
                match_id: wager.wager_id.clone(),
                reason: err.to_string(),
            },
        }
    }

    /// Issue the wager's debit unless it is already confirmed
    ///
    /// Returns the receipt when this call moved money. On success the bet
    /// record is written to history.
    pub async fn ensure_debit(&self, wager: &mut Wager) -> GameResult<Option<LedgerReceipt>> {
        if wager.debit.is_done() {
            return Ok(None);
        }

        let resumed = wager.debit.is_pending();
        wager.debit = LedgerLeg::Pending;
        self.state.save_wager(wager).await?;

        let request = Self::request(wager, Direction::Debit, wager.bet_amount);
        match self.ledger.debit(&request).await {
            Ok(receipt) => {
                self.metrics
                    .ledger_calls
                    .with_label_values(&["debit", "ok"])
                    .inc();
                info!(
                    player = %wager.player,
                    match_id = %wager.wager_id,
                    txn_id = %receipt.txn_id,
                    amount = %wager.bet_amount,
                    resumed,
                    "Debit confirmed"
                );
                wager.debit = LedgerLeg::Done {
                    txn_id: receipt.txn_id.clone(),
                };

                if !wager.bet_recorded {
                    let record = BetRecord::from_wager(wager, self.clock.now_ms());
                    match self.history.record_bet(&record).await {
                        Ok(()) => wager.bet_recorded = true,
                        Err(e) => warn!(match_id = %wager.wager_id, error = %e, "Failed to record bet"),
                    }
                }

                self.state.save_wager(wager).await?;
                Ok(Some(receipt))
            }
            Err(err) => {
                self.metrics
                    .ledger_calls
                    .with_label_values(&["debit", "failed"])
                    .inc();
                error!(
                    player = %wager.player,
                    match_id = %wager.wager_id,
                    key = %request.idempotency_key,
                    amount = %request.amount,
                    error = %err,
                    "Debit failed"
                );
                wager.debit = LedgerLeg::Failed {
                    reason: err.to_string(),
                };
                self.state.save_wager(wager).await?;
                Err(Self::map_failure(wager, Direction::Debit, &err))
            }
        }
    }

    pub fn can_retry_credit(&self, wager: &Wager) -> bool {
        wager.credit_attempts < self.max_credit_attempts
    }

    /// Pay out a winning wager
    ///
    /// Returns `None` when nothing was owed or the credit was already
    /// confirmed. A refused credit leaves the wager WIN with a FAILED leg.
    pub async fn credit(&self, wager: &mut Wager) -> GameResult<Option<LedgerReceipt>> {
        if wager.status != WagerStatus::Win
            || wager.credit.is_done()
            || wager.win_amount <= Decimal::ZERO
        {
            return Ok(None);
        }
        if !self.can_retry_credit(wager) {
            error!(
                player = %wager.player,
                match_id = %wager.wager_id,
                attempts = wager.credit_attempts,
                win_amount = %wager.win_amount,
                "Credit retry limit reached, wager kept for reconciliation"
            );
            return Err(GameError::CreditFailed {
                match_id: wager.wager_id.clone(),
                reason: "retry limit reached".to_string(),
            });
        }

        wager.credit_attempts += 1;
        wager.credit = LedgerLeg::Pending;
        self.state.save_wager(wager).await?;

        let request = Self::request(wager, Direction::Credit, wager.win_amount);
        let result = self.ledger.credit(&request).await;
        match result {
            Ok(receipt) => {
                self.metrics
                    .ledger_calls
                    .with_label_values(&["credit", "ok"])
                    .inc();
                info!(
                    player = %wager.player,
                    match_id = %wager.wager_id,
                    txn_id = %receipt.txn_id,
                    amount = %wager.win_amount,
                    attempt = wager.credit_attempts,
                    "Credit confirmed"
                );
                wager.credit = LedgerLeg::Done {
                    txn_id: receipt.txn_id.clone(),
                };
                self.state.save_wager(wager).await?;
                Ok(Some(receipt))
            }
            Err(err) => {
                self.metrics
                    .ledger_calls
                    .with_label_values(&["credit", "failed"])
                    .inc();
                error!(
                    player = %wager.player,
                    match_id = %wager.wager_id,
                    key = %request.idempotency_key,
                    amount = %request.amount,
                    attempt = wager.credit_attempts,
                    error = %err,
                    "Credit failed"
                );
                wager.credit = LedgerLeg::Failed {
                    reason: err.to_string(),
                };
                self.state.save_wager(wager).await?;
                Err(Self::map_failure(wager, Direction::Credit, &err))
            }
        }
    }

    /// Write the settlement record and, for paid wins, the cashout event
    ///
    /// Both steps are skipped once done, so a failed finalization can simply
    /// be retried. Progress is saved when a step fails.
    pub async fn finalize(&self, wager: &mut Wager) -> GameResult<()> {
        let result = self.finalize_steps(wager).await;
        if result.is_err() {
            if let Err(e) = self.state.save_wager(wager).await {
                warn!(match_id = %wager.wager_id, error = %e, "Failed to save finalization progress");
            }
        }
        result
    }

    async fn finalize_steps(&self, wager: &mut Wager) -> GameResult<()> {
        let now = self.clock.now_ms();

        if !wager.settlement_recorded {
            let record = SettlementRecord::from_wager(wager, now);
            self.history.record_settlement(&record).await?;
            wager.settlement_recorded = true;
        }

        if wager.status == WagerStatus::Win && wager.credit.is_done() && !wager.cashout_published {
            let event = CashoutEvent::from_wager(wager, now);
            self.publisher.publish_cashout(&event).await?;
            wager.cashout_published = true;
        }

        Ok(())
    }

    /// Apply a confirmed ledger movement to the cached session of `conn_id`
    ///
    /// The ledger's reported balance wins; without one the cached balance is
    /// shifted by `delta`.
    pub async fn reconcile_balance(
        &self,
        conn_id: Option<&str>,
        receipt: &LedgerReceipt,
        delta: Decimal,
    ) -> GameResult<Option<BalanceInfo>> {
        let Some(conn_id) = conn_id else {
            return Ok(None);
        };
        let Some(mut session) = self.state.load_session(conn_id).await? else {
            return Ok(None);
        };

        session.balance = receipt.balance.unwrap_or(session.balance + delta);
        self.state.save_session(&session).await?;
        Ok(Some(BalanceInfo::from(&session)))
    }
}
