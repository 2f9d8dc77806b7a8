use super::{BetRecord, HistoryResult, HistoryStore, RoundRecord, SettlementRecord};
use crate::game::types::{PlayerKey, WagerStatus};
use async_trait::async_trait;
use dashmap::DashMap;
use std::cmp::Reverse;

/// History kept in process memory, for tests and throwaway deployments
#[derive(Default)]
pub struct MemoryHistoryStore {
    bets: DashMap<String, BetRecord>,
    settlements: DashMap<String, SettlementRecord>,
    rounds: DashMap<PlayerKey, Vec<RoundRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settlement_count(&self) -> usize {
        self.settlements.len()
    }

    pub fn bet_count(&self) -> usize {
        self.bets.len()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn record_bet(&self, bet: &BetRecord) -> HistoryResult<()> {
        self.bets.insert(bet.match_id.clone(), bet.clone());
        Ok(())
    }

    async fn record_settlement(&self, settlement: &SettlementRecord) -> HistoryResult<()> {
        self.settlements
            .insert(settlement.match_id.clone(), settlement.clone());
        Ok(())
    }

    async fn record_round(&self, record: &RoundRecord) -> HistoryResult<()> {
        let player = PlayerKey::new(record.operator_id.clone(), record.user_id.clone());
        self.rounds.entry(player).or_default().push(record.clone());
        Ok(())
    }

    async fn bet(&self, match_id: &str) -> HistoryResult<Option<BetRecord>> {
        Ok(self.bets.get(match_id).map(|b| b.clone()))
    }

    async fn settlement(&self, match_id: &str) -> HistoryResult<Option<SettlementRecord>> {
        Ok(self.settlements.get(match_id).map(|s| s.clone()))
    }

    async fn settlements_for_player(
        &self,
        player: &PlayerKey,
        limit: usize,
    ) -> HistoryResult<Vec<SettlementRecord>> {
        let mut records: Vec<_> = self
            .settlements
            .iter()
            .filter(|s| s.operator_id == player.operator_id && s.user_id == player.user_id)
            .map(|s| s.clone())
            .collect();
        records.sort_by_key(|s| Reverse(s.match_end_time));
        records.truncate(limit);
        Ok(records)
    }

    async fn top_wins(&self, limit: usize) -> HistoryResult<Vec<SettlementRecord>> {
        let mut records: Vec<_> = self
            .settlements
            .iter()
            .filter(|s| s.status == WagerStatus::Win)
            .map(|s| s.clone())
            .collect();
        records.sort_by(|a, b| b.win_amount.cmp(&a.win_amount));
        records.truncate(limit);
        Ok(records)
    }

    async fn rounds_for_player(&self, player: &PlayerKey, limit: usize) -> HistoryResult<Vec<RoundRecord>> {
        let mut rounds = self
            .rounds
            .get(player)
            .map(|r| r.clone())
            .unwrap_or_default();
        rounds.sort_by_key(|r| Reverse(r.round.start_time));
        rounds.truncate(limit);
        Ok(rounds)
    }
}
