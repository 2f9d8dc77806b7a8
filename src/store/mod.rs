//! Shared key/value state
//!
//! [`StateStore`] is the raw TTL-capable string store. [`GameState`] wraps it
//! with the typed records and key layout the game uses:
//!
//! - `PL:<connId>` player session
//! - `LB:<operatorId>:<userId>` current and previous round
//! - `BT:<operatorId>:<userId>` active wager

mod memory;

pub use memory::MemoryStateStore;

use crate::game::types::{LobbyState, PlayerKey, PlayerSession, Wager};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("corrupted value under {key}: {source}")]
    Corrupted {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store `value`, replacing any previous one. `ttl` of `None` never expires.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()>;

    /// Returns whether a value was present
    async fn delete(&self, key: &str) -> StoreResult<bool>;
}

pub fn session_key(conn_id: &str) -> String {
    format!("PL:{}", conn_id)
}

pub fn lobby_key(player: &PlayerKey) -> String {
    format!("LB:{}", player)
}

pub fn wager_key(player: &PlayerKey) -> String {
    format!("BT:{}", player)
}

/// Typed access to the game's records
#[derive(Clone)]
pub struct GameState {
    store: Arc<dyn StateStore>,
    session_ttl: Duration,
}

impl GameState {
    pub fn new(store: Arc<dyn StateStore>, session_ttl: Duration) -> Self {
        Self { store, session_ttl }
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.store.get(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StoreError::Corrupted {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    async fn save<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> StoreResult<()> {
        let raw = serde_json::to_string(value)?;
        self.store.set(key, raw, ttl).await
    }

    pub async fn load_session(&self, conn_id: &str) -> StoreResult<Option<PlayerSession>> {
        self.load(&session_key(conn_id)).await
    }

    pub async fn save_session(&self, session: &PlayerSession) -> StoreResult<()> {
        self.save(&session_key(&session.conn_id), session, Some(self.session_ttl))
            .await
    }

    pub async fn delete_session(&self, conn_id: &str) -> StoreResult<bool> {
        self.store.delete(&session_key(conn_id)).await
    }

    pub async fn load_lobby(&self, player: &PlayerKey) -> StoreResult<Option<LobbyState>> {
        self.load(&lobby_key(player)).await
    }

    pub async fn save_lobby(
        &self,
        player: &PlayerKey,
        lobby: &LobbyState,
        retention: Duration,
    ) -> StoreResult<()> {
        self.save(&lobby_key(player), lobby, Some(retention)).await
    }

    pub async fn delete_lobby(&self, player: &PlayerKey) -> StoreResult<bool> {
        self.store.delete(&lobby_key(player)).await
    }

    pub async fn load_wager(&self, player: &PlayerKey) -> StoreResult<Option<Wager>> {
        self.load(&wager_key(player)).await
    }

    pub async fn save_wager(&self, wager: &Wager) -> StoreResult<()> {
        self.save(&wager_key(&wager.player), wager, None).await
    }

    pub async fn delete_wager(&self, player: &PlayerKey) -> StoreResult<bool> {
        self.store.delete(&wager_key(player)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn session() -> PlayerSession {
        PlayerSession {
            conn_id: "c1".to_string(),
            player: PlayerKey::new("op", "u1"),
            name: "player".to_string(),
            avatar: 4,
            balance: Decimal::new(10_000, 2),
            token: "tok".to_string(),
            game_id: "g1".to_string(),
        }
    }

    #[test]
    fn test_key_layout() {
        let player = PlayerKey::new("op", "u1");
        assert_eq!(session_key("abc"), "PL:abc");
        assert_eq!(lobby_key(&player), "LB:op:u1");
        assert_eq!(wager_key(&player), "BT:op:u1");
    }

    #[tokio::test]
    async fn test_session_roundtrip_through_store() {
        let state = GameState::new(Arc::new(MemoryStateStore::new()), Duration::from_secs(60));
        state.save_session(&session()).await.unwrap();

        let loaded = state.load_session("c1").await.unwrap().unwrap();
        assert_eq!(loaded, session());
        assert!(state.delete_session("c1").await.unwrap());
        assert!(state.load_session("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupted_value_is_reported() {
        let store = Arc::new(MemoryStateStore::new());
        store.set("PL:bad", "{not json".to_string(), None).await.unwrap();
        let state = GameState::new(store, Duration::from_secs(60));

        let err = state.load_session("bad").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupted { ref key, .. } if key == "PL:bad"));
    }
}
