use super::{StateStore, StoreResult};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// In-process [`StateStore`] with per-entry expiry
///
/// Expired entries are invisible to `get` immediately and are physically
/// removed by the sweeper task.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn start_sweeper(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let removed = self.purge_expired();
                if removed > 0 {
                    info!(removed, remaining = self.len(), "State store sweep");
                }
            }
        })
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, entry)| !entry.is_expired(now))
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let store = MemoryStateStore::new();
        store
            .set("k", "v".to_string(), Some(Duration::from_secs(2)))
            .await
            .unwrap();
        store.set("forever", "v".to_string(), None).await.unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.get("forever").await.unwrap().is_some());

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let store = MemoryStateStore::new();
        store.set("k", "v".to_string(), None).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired() {
        let store = Arc::new(MemoryStateStore::new());
        store
            .set("k", "v".to_string(), Some(Duration::from_millis(100)))
            .await
            .unwrap();

        let handle = store.clone().start_sweeper(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(store.is_empty());
        handle.abort();
    }
}
