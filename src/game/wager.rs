//! Wager state transitions
//!
//! Everything here is pure. The engine decides when a transition is allowed
//! (locks, round checks, ledger calls) and persists the result.

use super::types::{CommittedEvent, Event, LedgerLeg, PlayerSession, Wager, WagerStatus, WagerView};
use crate::money;
use rust_decimal::Decimal;

/// Result of applying a cut to an open wager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Wager stays open with a new multiplier
    Continue,
    /// Losing fruit or a payout that rounds to nothing
    Loss,
}

impl Wager {
    pub fn new(
        wager_id: String,
        session: &PlayerSession,
        bet_amount: Decimal,
        status: WagerStatus,
        now_ms: u64,
    ) -> Self {
        Self {
            wager_id,
            player: session.player.clone(),
            game_id: session.game_id.clone(),
            token: session.token.clone(),
            name: session.name.clone(),
            avatar: session.avatar,
            bet_amount,
            multiplier: Decimal::ONE,
            last_multiplier: Decimal::ZERO,
            win_amount: Decimal::ZERO,
            committed_events: Vec::new(),
            status,
            match_start_time: now_ms,
            match_end_time: None,
            debit: LedgerLeg::None,
            credit: LedgerLeg::None,
            credit_attempts: 0,
            bet_recorded: false,
            settlement_recorded: false,
            cashout_published: false,
        }
    }

    pub fn has_committed(&self) -> bool {
        !self.committed_events.is_empty()
    }

    pub fn has_cut(&self, round_id: &str, event_id: u32) -> bool {
        self.committed_events
            .iter()
            .any(|c| c.round_id == round_id && c.event_id == event_id)
    }

    /// Record a cut. Must only be called on an open wager.
    pub fn apply_commit(&mut self, round_id: &str, event: &Event) -> CommitOutcome {
        debug_assert!(!self.status.is_terminal());

        self.committed_events.push(CommittedEvent {
            round_id: round_id.to_string(),
            event_id: event.event_id,
            multiplier: event.multiplier,
            asset_id: event.asset_id,
        });
        self.last_multiplier = event.multiplier;
        self.multiplier *= event.multiplier;

        if event.multiplier.is_zero() {
            self.status = WagerStatus::Loss;
            self.win_amount = Decimal::ZERO;
            return CommitOutcome::Loss;
        }

        self.win_amount = money::win_amount(self.bet_amount, self.multiplier);
        if self.win_amount <= Decimal::ZERO {
            self.status = WagerStatus::Loss;
            self.win_amount = Decimal::ZERO;
            return CommitOutcome::Loss;
        }

        self.status = WagerStatus::Committed;
        CommitOutcome::Continue
    }

    /// A cut on a zero fruit, or a payout that rounds away, loses the wager
    pub fn is_lost(&self) -> bool {
        self.has_committed()
            && (self.committed_events.iter().any(|c| c.multiplier.is_zero())
                || money::win_amount(self.bet_amount, self.multiplier) <= Decimal::ZERO)
    }

    pub fn mark_loss(&mut self, now_ms: u64) {
        self.status = WagerStatus::Loss;
        self.win_amount = Decimal::ZERO;
        self.match_end_time = Some(now_ms);
    }

    pub fn mark_win(&mut self, now_ms: u64) {
        self.status = WagerStatus::Win;
        self.win_amount = money::win_amount(self.bet_amount, self.multiplier);
        self.match_end_time = Some(now_ms);
    }

    pub fn mark_cancelled(&mut self, now_ms: u64) {
        self.status = WagerStatus::Cancelled;
        self.win_amount = Decimal::ZERO;
        self.match_end_time = Some(now_ms);
    }

    pub fn view(&self) -> WagerView {
        WagerView {
            match_id: self.wager_id.clone(),
            bet_amount: self.bet_amount,
            multiplier: self.multiplier,
            win_amount: self.win_amount,
            status: self.status,
            cut_fruits: self.committed_events.clone(),
            match_start_time: self.match_start_time,
            match_end_time: self.match_end_time,
        }
    }
}
