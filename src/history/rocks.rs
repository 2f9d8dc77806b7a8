//! RocksDB-backed history
//!
//! Records are JSON values. Listing queries go through secondary index keys
//! whose big-endian numeric part sorts newest (or largest) first.

use super::{BetRecord, HistoryError, HistoryResult, HistoryStore, RoundRecord, SettlementRecord};
use crate::game::types::{PlayerKey, WagerStatus};
use crate::money;
use async_trait::async_trait;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const SETTLEMENT_PREFIX: &str = "stl:rec:";
const SETTLEMENT_PLAYER_INDEX: &str = "stl:idx:";
const TOP_WIN_INDEX: &[u8] = b"stl:win:";
const BET_PREFIX: &str = "bet:";
const ROUND_PREFIX: &str = "round:";

#[derive(Clone)]
pub struct RocksHistoryStore {
    db: Arc<DB>,
}

impl RocksHistoryStore {
    pub fn open<P: AsRef<Path>>(path: P) -> HistoryResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(32 * 1024 * 1024);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> HistoryResult<Option<T>> {
        let Some(bytes) = self.db.get(key)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            HistoryError::Corrupted(format!(
                "{}: {}",
                String::from_utf8_lossy(key),
                e
            ))
        })
    }

    /// Values of up to `limit` keys starting with `prefix`, in key order
    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> HistoryResult<Vec<Vec<u8>>> {
        let mut values = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item?;
            if !key.starts_with(prefix) || values.len() >= limit {
                break;
            }
            values.push(value.to_vec());
        }
        Ok(values)
    }

    fn settlements_from_index(&self, prefix: &[u8], limit: usize) -> HistoryResult<Vec<SettlementRecord>> {
        let mut records = Vec::new();
        for match_id in self.scan_prefix(prefix, limit)? {
            let key = settlement_key(&String::from_utf8_lossy(&match_id));
            if let Some(record) = self.get_json::<SettlementRecord>(&key)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

fn settlement_key(match_id: &str) -> Vec<u8> {
    format!("{}{}", SETTLEMENT_PREFIX, match_id).into_bytes()
}

fn player_index_prefix(player: &PlayerKey) -> Vec<u8> {
    format!("{}{}:", SETTLEMENT_PLAYER_INDEX, player).into_bytes()
}

fn player_index_key(player: &PlayerKey, time_ms: u64, match_id: &str) -> Vec<u8> {
    // prefix | inv_time(be) | match_id
    let mut key = player_index_prefix(player);
    key.extend_from_slice(&(u64::MAX - time_ms).to_be_bytes());
    key.extend_from_slice(match_id.as_bytes());
    key
}

fn top_win_key(win_cents: u64, match_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(TOP_WIN_INDEX.len() + 8 + match_id.len());
    key.extend_from_slice(TOP_WIN_INDEX);
    key.extend_from_slice(&(u64::MAX - win_cents).to_be_bytes());
    key.extend_from_slice(match_id.as_bytes());
    key
}

fn bet_key(match_id: &str) -> Vec<u8> {
    format!("{}{}", BET_PREFIX, match_id).into_bytes()
}

fn round_prefix(player: &PlayerKey) -> Vec<u8> {
    format!("{}{}:", ROUND_PREFIX, player).into_bytes()
}

fn round_key(player: &PlayerKey, start_time: u64, round_id: &str) -> Vec<u8> {
    let mut key = round_prefix(player);
    key.extend_from_slice(&(u64::MAX - start_time).to_be_bytes());
    key.extend_from_slice(round_id.as_bytes());
    key
}

#[async_trait]
impl HistoryStore for RocksHistoryStore {
    async fn record_bet(&self, bet: &BetRecord) -> HistoryResult<()> {
        let bytes = serde_json::to_vec(bet)?;
        self.db.put(bet_key(&bet.match_id), bytes)?;
        debug!(match_id = %bet.match_id, "Bet recorded");
        Ok(())
    }

    async fn record_settlement(&self, settlement: &SettlementRecord) -> HistoryResult<()> {
        let bytes = serde_json::to_vec(settlement)?;
        let player = settlement.player();
        let match_id = settlement.match_id.as_str();

        let mut batch = WriteBatch::default();
        if let Some(previous) = self.get_json::<SettlementRecord>(&settlement_key(match_id))? {
            batch.delete(player_index_key(&player, previous.match_end_time, match_id));
            batch.delete(top_win_key(money::to_cents(previous.win_amount), match_id));
        }
        batch.put(settlement_key(match_id), bytes);
        batch.put(
            player_index_key(&player, settlement.match_end_time, match_id),
            match_id.as_bytes(),
        );
        if settlement.status == WagerStatus::Win {
            batch.put(
                top_win_key(money::to_cents(settlement.win_amount), match_id),
                match_id.as_bytes(),
            );
        }
        self.db.write(batch)?;

        debug!(
            match_id,
            status = settlement.status.as_str(),
            win_amount = %settlement.win_amount,
            "Settlement recorded"
        );
        Ok(())
    }

    async fn record_round(&self, record: &RoundRecord) -> HistoryResult<()> {
        let player = PlayerKey::new(record.operator_id.clone(), record.user_id.clone());
        let bytes = serde_json::to_vec(record)?;
        self.db.put(
            round_key(&player, record.round.start_time, &record.round.round_id),
            bytes,
        )?;
        Ok(())
    }

    async fn bet(&self, match_id: &str) -> HistoryResult<Option<BetRecord>> {
        self.get_json(&bet_key(match_id))
    }

    async fn settlement(&self, match_id: &str) -> HistoryResult<Option<SettlementRecord>> {
        self.get_json(&settlement_key(match_id))
    }

    async fn settlements_for_player(
        &self,
        player: &PlayerKey,
        limit: usize,
    ) -> HistoryResult<Vec<SettlementRecord>> {
        self.settlements_from_index(&player_index_prefix(player), limit)
    }

    async fn top_wins(&self, limit: usize) -> HistoryResult<Vec<SettlementRecord>> {
        self.settlements_from_index(TOP_WIN_INDEX, limit)
    }

    async fn rounds_for_player(&self, player: &PlayerKey, limit: usize) -> HistoryResult<Vec<RoundRecord>> {
        self.scan_prefix(&round_prefix(player), limit)?
            .into_iter()
            .map(|bytes| {
                serde_json::from_slice(&bytes)
                    .map_err(|e| HistoryError::Corrupted(format!("round record: {}", e)))
            })
            .collect()
    }
}
