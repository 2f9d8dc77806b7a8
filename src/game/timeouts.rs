//! Cancelable per-key background tasks
//!
//! A [`TimerTable`] owns the abort handles of spawned tasks keyed by a string
//! (match id, player key). At most one task per key is live. Cancelling a key
//! that has no task is a no-op.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::debug;

struct TimerSlot {
    generation: u64,
    handle: AbortHandle,
}

#[derive(Default)]
pub struct TimerTable {
    slots: Arc<DashMap<String, TimerSlot>>,
    next_generation: AtomicU64,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, replacing any task armed under `key`
    ///
    /// The slot is released right before `task` starts, so the task may
    /// cancel or re-arm its own key without aborting itself.
    pub fn arm<F>(&self, key: &str, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (ready_tx, ready_rx) = oneshot::channel::<()>();
        let slots = self.slots.clone();
        let owned_key = key.to_string();

        let handle = tokio::spawn(async move {
            if ready_rx.await.is_err() {
                return;
            }
            tokio::time::sleep(delay).await;
            slots.remove_if(&owned_key, |_, slot| slot.generation == generation);
            task.await;
        });

        let slot = TimerSlot {
            generation,
            handle: handle.abort_handle(),
        };
        if let Some(previous) = self.slots.insert(key.to_string(), slot) {
            previous.handle.abort();
            debug!(key, "Timer re-armed");
        }
        let _ = ready_tx.send(());
    }

    /// Start `task` under `key` unless a live task already holds it
    ///
    /// Returns whether the task was started. The slot is released when the
    /// task returns on its own.
    pub fn spawn_if_idle<F>(&self, key: &str, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (ready_tx, ready_rx) = oneshot::channel::<()>();

        match self.slots.entry(key.to_string()) {
            Entry::Occupied(occupied) if !occupied.get().handle.is_finished() => return false,
            entry => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let slots = self.slots.clone();
                let owned_key = key.to_string();

                let handle = tokio::spawn(async move {
                    if ready_rx.await.is_err() {
                        return;
                    }
                    task.await;
                    slots.remove_if(&owned_key, |_, slot| slot.generation == generation);
                });

                let slot = TimerSlot {
                    generation,
                    handle: handle.abort_handle(),
                };
                match entry {
                    Entry::Occupied(mut occupied) => {
                        occupied.insert(slot);
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(slot);
                    }
                }
            }
        }

        let _ = ready_tx.send(());
        true
    }

    /// Abort the task under `key`. Returns whether one was armed.
    pub fn cancel(&self, key: &str) -> bool {
        match self.slots.remove(key) {
            Some((_, slot)) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, key: &str) -> bool {
        self.slots
            .get(key)
            .map(|slot| !slot.handle.is_finished())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Drop for TimerTable {
    fn drop(&mut self) {
        for slot in self.slots.iter() {
            slot.handle.abort();
        }
    }
}

/// Forced-settlement and lobby-lifetime deadlines
pub struct TimeoutSupervisor {
    wagers: TimerTable,
    lobbies: TimerTable,
    wager_timeout: Duration,
    lobby_lifetime: Duration,
}

impl TimeoutSupervisor {
    pub fn new(wager_timeout: Duration, lobby_lifetime: Duration) -> Self {
        Self {
            wagers: TimerTable::new(),
            lobbies: TimerTable::new(),
            wager_timeout,
            lobby_lifetime,
        }
    }

    /// (Re)arm the forced cash-out for a wager
    pub fn arm_wager<F>(&self, match_id: &str, on_expiry: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.wagers.arm(match_id, self.wager_timeout, on_expiry);
    }

    pub fn cancel_wager(&self, match_id: &str) -> bool {
        self.wagers.cancel(match_id)
    }

    pub fn wager_armed(&self, match_id: &str) -> bool {
        self.wagers.is_armed(match_id)
    }

    pub fn arm_lobby<F>(&self, lobby: &str, on_expiry: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.lobbies.arm(lobby, self.lobby_lifetime, on_expiry);
    }

    pub fn cancel_lobby(&self, lobby: &str) -> bool {
        self.lobbies.cancel(lobby)
    }

    pub fn lobby_armed(&self, lobby: &str) -> bool {
        self.lobbies.is_armed(lobby)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once_and_releases_slot() {
        let table = TimerTable::new();
        let fired = counter();
        let f = fired.clone();
        table.arm("m1", Duration::from_secs(5), async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(table.is_armed("m1"));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!table.is_armed("m1"));
        assert!(table.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_debounces() {
        let table = TimerTable::new();
        let fired = counter();
        for _ in 0..3 {
            let f = fired.clone();
            table.arm("m1", Duration::from_secs(5), async move {
                f.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent_and_scoped() {
        let table = TimerTable::new();
        let fired = counter();
        for key in ["a", "b"] {
            let f = fired.clone();
            table.arm(key, Duration::from_secs(1), async move {
                f.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(table.cancel("a"));
        assert!(!table.cancel("a"));
        assert!(!table.cancel("never-armed"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_if_idle_refuses_second_start() {
        let table = TimerTable::new();
        let started = counter();
        for _ in 0..3 {
            let s = started.clone();
            table.spawn_if_idle("lobby", async move {
                s.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(10)).await;
            });
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        // Once the task finishes the key can be started again
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(!table.is_armed("lobby"));
        let s = started.clone();
        assert!(table.spawn_if_idle("lobby", async move {
            s.fetch_add(1, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_can_rearm_its_own_key() {
        let table = Arc::new(TimerTable::new());
        let fired = counter();

        let t = table.clone();
        let f = fired.clone();
        table.arm("m1", Duration::from_secs(1), async move {
            f.fetch_add(1, Ordering::SeqCst);
            let f2 = f.clone();
            t.arm("m1", Duration::from_secs(1), async move {
                f2.fetch_add(1, Ordering::SeqCst);
            });
            // cancelling would only hit the new timer, never this task
            assert!(t.is_armed("m1"));
        });

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervisor_tables_are_independent() {
        let supervisor = TimeoutSupervisor::new(Duration::from_secs(50), Duration::from_secs(300));
        supervisor.arm_wager("m1", async {});
        supervisor.arm_lobby("op:u1", async {});

        assert!(supervisor.cancel_wager("m1"));
        assert!(!supervisor.wager_armed("m1"));
        assert!(supervisor.lobby_armed("op:u1"));
    }
}
