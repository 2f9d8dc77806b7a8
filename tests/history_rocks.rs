//! Settlements written by the engine survive a RocksDB reopen

use fruitcut::clock::MonotonicClock;
use fruitcut::config::AppConfig;
use fruitcut::game::{
    EngineDeps, Event, GameEngine, LobbyState, PlayerKey, Round, RoundStatus, WagerStatus,
};
use fruitcut::history::{HistoryStore, RocksHistoryStore};
use fruitcut::metrics::GameMetrics;
use fruitcut::store::MemoryStateStore;
use fruitcut::testing::{profile, MockLedger, RecordingPublisher};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

#[tokio::test(start_paused = true)]
async fn test_settlement_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let player = PlayerKey::new("op", "u1");

    let match_id = {
        let history = Arc::new(RocksHistoryStore::open(dir.path()).unwrap());
        let engine = GameEngine::new(EngineDeps {
            config: AppConfig::default(),
            store: Arc::new(MemoryStateStore::new()),
            history,
            ledger: Arc::new(MockLedger::new()),
            publisher: Arc::new(RecordingPublisher::new()),
            metrics: GameMetrics::new().unwrap(),
            clock: MonotonicClock::starting_at(1_700_000_000_000),
            seed: Some(3),
        });

        let (outbox, _events) = mpsc::unbounded_channel();
        engine
            .connect("c1", &profile("op", "u1", Decimal::new(100, 0)), "t", "g", outbox)
            .await
            .unwrap();
        let view = engine.place("c1", Some(Decimal::new(10, 0))).await.unwrap();

        let now = engine.clock().now_ms();
        let round = Round {
            round_id: "r1".to_string(),
            status: RoundStatus::Ongoing,
            start_time: now,
            end_time: now + 10_000,
            server_time: now,
            events: vec![Event {
                event_id: 1,
                multiplier: Decimal::new(250, 2),
                asset_id: 0,
                delay: 0,
                flight_duration: 1_200,
            }],
        };
        engine
            .state()
            .save_lobby(
                &player,
                &LobbyState {
                    current: round,
                    previous: None,
                },
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        engine.commit("c1", &view.match_id, "r1", Some(1)).await.unwrap();
        engine.end("c1", &view.match_id).await.unwrap();
        engine.disconnect("c1").await;
        view.match_id
    };
    // let aborted round tasks release their store handle
    tokio::time::sleep(Duration::from_millis(100)).await;

    let reopened = RocksHistoryStore::open(dir.path()).unwrap();
    let record = reopened.settlement(&match_id).await.unwrap().unwrap();
    assert_eq!(record.status, WagerStatus::Win);
    assert_eq!(record.win_amount, Decimal::new(2500, 2));
    assert_eq!(record.rounds_data.len(), 1);
    assert!(record.debit_txn_id.is_some());
    assert!(record.credit_txn_id.is_some());

    assert!(reopened.bet(&match_id).await.unwrap().is_some());
    let mine = reopened.settlements_for_player(&player, 10).await.unwrap();
    assert_eq!(mine.len(), 1);
    let top = reopened.top_wins(10).await.unwrap();
    assert_eq!(top[0].match_id, match_id);
}
