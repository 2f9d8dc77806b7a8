use super::types::PlayerKey;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per player identity
///
/// Every operation that reads or writes a player's wager or session holds the
/// player's guard for its whole duration, including ledger calls.
#[derive(Default)]
pub struct PlayerLocks {
    locks: DashMap<PlayerKey, Arc<Mutex<()>>>,
}

impl PlayerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, player: &PlayerKey) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(player.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop locks nobody holds or waits on
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
