//! End-to-end wager lifecycle against in-memory collaborators

use fruitcut::clock::MonotonicClock;
use fruitcut::config::AppConfig;
use fruitcut::game::{
    EngineDeps, Event, GameEngine, LedgerLeg, LobbyState, PlayerKey, Round, RoundStatus,
    WagerStatus,
};
use fruitcut::history::{HistoryStore, MemoryHistoryStore};
use fruitcut::ledger::LedgerError;
use fruitcut::metrics::GameMetrics;
use fruitcut::protocol::{ClientCommand, ServerEvent};
use fruitcut::store::MemoryStateStore;
use fruitcut::testing::{profile, MockLedger, RecordingPublisher};
use fruitcut::GameError;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const CONN: &str = "conn-1";

fn d(value: &str) -> Decimal {
    value.parse().unwrap()
}

struct Harness {
    engine: GameEngine,
    ledger: Arc<MockLedger>,
    history: Arc<MemoryHistoryStore>,
    publisher: Arc<RecordingPublisher>,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    player: PlayerKey,
}

impl Harness {
    async fn new(balance: &str) -> Self {
        let ledger = Arc::new(MockLedger::with_balance(d(balance)));
        let history = Arc::new(MemoryHistoryStore::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let engine = GameEngine::new(EngineDeps {
            config: AppConfig::default(),
            store: Arc::new(MemoryStateStore::new()),
            history: history.clone(),
            ledger: ledger.clone(),
            publisher: publisher.clone(),
            metrics: GameMetrics::new().unwrap(),
            clock: MonotonicClock::starting_at(1_700_000_000_000),
            seed: Some(7),
        });

        let (outbox, events) = mpsc::unbounded_channel();
        engine
            .connect(CONN, &profile("op", "u1", d(balance)), "token-1", "fruitcut", outbox)
            .await
            .unwrap();

        Self {
            engine,
            ledger,
            history,
            publisher,
            events,
            player: PlayerKey::new("op", "u1"),
        }
    }

    /// Replace the live round with one whose fruits carry `multipliers`
    async fn install_round(&self, multipliers: &[&str]) -> String {
        let now = self.engine.clock().now_ms();
        self.install_round_ending(multipliers, RoundStatus::Ongoing, now + 10_000)
            .await
    }

    async fn install_round_ending(
        &self,
        multipliers: &[&str],
        status: RoundStatus,
        end_time: u64,
    ) -> String {
        let now = self.engine.clock().now_ms();
        let round = Round {
            round_id: format!("round-{}", now),
            status,
            start_time: end_time.saturating_sub(10_000),
            end_time,
            server_time: now,
            events: multipliers
                .iter()
                .enumerate()
                .map(|(i, m)| Event {
                    event_id: i as u32 + 1,
                    multiplier: d(m),
                    asset_id: 3,
                    delay: 0,
                    flight_duration: 1_500,
                })
                .collect(),
        };
        let round_id = round.round_id.clone();
        self.engine
            .state()
            .save_lobby(
                &self.player,
                &LobbyState {
                    current: round,
                    previous: None,
                },
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        round_id
    }

    async fn place(&self, amount: &str) -> String {
        self.engine
            .place(CONN, Some(d(amount)))
            .await
            .unwrap()
            .match_id
    }

    fn drain(&mut self) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

#[tokio::test(start_paused = true)]
async fn test_place_checks_bounds_and_balance() {
    let h = Harness::new("50").await;

    assert!(matches!(
        h.engine.place(CONN, None).await,
        Err(GameError::InvalidAmount)
    ));
    assert!(matches!(
        h.engine.place(CONN, Some(d("0.05"))).await,
        Err(GameError::InvalidAmount)
    ));
    assert!(matches!(
        h.engine.place(CONN, Some(d("20000.01"))).await,
        Err(GameError::InvalidAmount)
    ));
    assert!(matches!(
        h.engine.place(CONN, Some(d("60"))).await,
        Err(GameError::InsufficientBalance)
    ));
    assert!(h.engine.state().load_wager(&h.player).await.unwrap().is_none());

    let view = h.engine.place(CONN, Some(d("0.10"))).await.unwrap();
    assert_eq!(view.bet_amount, d("0.10"));
    assert!(h.ledger.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_place_without_session() {
    let h = Harness::new("50").await;
    assert!(matches!(
        h.engine.place("unknown-conn", Some(d("1"))).await,
        Err(GameError::NoSession)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_place_yields_one_wager() {
    let h = Harness::new("100").await;

    let (a, b) = tokio::join!(
        h.engine.place(CONN, Some(d("10"))),
        h.engine.place(CONN, Some(d("10")))
    );
    let results = [a, b];
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(GameError::WagerInProgress)))
        .count();

    assert_eq!(accepted, 1);
    assert_eq!(refused, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_event_does_not_mutate_wager() {
    let h = Harness::new("100").await;
    let match_id = h.place("10").await;
    let round_id = h.install_round(&["2.00"]).await;
    let before = h.engine.state().load_wager(&h.player).await.unwrap();

    for event_id in [Some(99), None] {
        let result = h.engine.commit(CONN, &match_id, &round_id, event_id).await;
        assert!(matches!(result, Err(GameError::InvalidEvent { .. })));
    }

    assert_eq!(h.engine.state().load_wager(&h.player).await.unwrap(), before);
    assert!(h.ledger.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_same_fruit_cannot_be_cut_twice() {
    let h = Harness::new("100").await;
    let match_id = h.place("10").await;
    let round_id = h.install_round(&["2.00", "1.50"]).await;

    h.engine.commit(CONN, &match_id, &round_id, Some(1)).await.unwrap();
    let again = h.engine.commit(CONN, &match_id, &round_id, Some(1)).await;
    assert!(matches!(again, Err(GameError::InvalidEvent { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_zero_multiplier_is_a_loss() {
    let h = Harness::new("1000").await;
    let match_id = h.place("100").await;
    let round_id = h.install_round(&["0.00", "4.00"]).await;

    let view = h
        .engine
        .commit(CONN, &match_id, &round_id, Some(1))
        .await
        .unwrap();

    assert_eq!(view.status, WagerStatus::Loss);
    assert_eq!(view.win_amount, Decimal::ZERO);
    assert_eq!(h.ledger.debits().len(), 1);
    assert!(h.ledger.credits().is_empty());
    assert_eq!(h.ledger.balance(), Some(d("900")));

    let record = h.history.settlement(&match_id).await.unwrap().unwrap();
    assert_eq!(record.status, WagerStatus::Loss);
    assert!(h.engine.state().load_wager(&h.player).await.unwrap().is_none());
    assert!(h.publisher.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_zero_after_gains_still_loses() {
    let h = Harness::new("1000").await;
    let match_id = h.place("10").await;
    let round_id = h.install_round(&["3.00", "0.00"]).await;

    h.engine.commit(CONN, &match_id, &round_id, Some(1)).await.unwrap();
    let view = h
        .engine
        .commit(CONN, &match_id, &round_id, Some(2))
        .await
        .unwrap();

    assert_eq!(view.status, WagerStatus::Loss);
    assert_eq!(view.win_amount, Decimal::ZERO);
    assert!(h.ledger.credits().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_two_cuts_then_cash_out() {
    let mut h = Harness::new("100").await;
    let match_id = h.place("10").await;
    let round_id = h.install_round(&["2.00", "1.50"]).await;

    h.engine.commit(CONN, &match_id, &round_id, Some(1)).await.unwrap();
    let view = h
        .engine
        .commit(CONN, &match_id, &round_id, Some(2))
        .await
        .unwrap();
    assert_eq!(view.win_amount, d("30.00"));

    let settled = h.engine.end(CONN, &match_id).await.unwrap();
    assert_eq!(settled.status, WagerStatus::Win);
    assert_eq!(settled.win_amount, d("30.00"));

    assert_eq!(h.ledger.debits().len(), 1);
    let credits = h.ledger.credits();
    assert_eq!(credits.len(), 1);
    assert_eq!(credits[0].amount, d("30.00"));
    assert_eq!(h.ledger.balance(), Some(d("120")));

    let cashouts = h.publisher.events();
    assert_eq!(cashouts.len(), 1);
    assert_eq!(cashouts[0].win_amount, d("30.00"));

    let events = h.drain();
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerEvent::MatchEnd(v) if v.match_id == match_id)));
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerEvent::Info(info) if info.balance == d("120"))));
    assert!(!h.engine.scheduler().is_running(&h.player));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_commits_debit_once() {
    let h = Harness::new("100").await;
    h.ledger.set_delay(Duration::from_millis(200));
    let match_id = h.place("10").await;
    let round_id = h.install_round(&["2.00", "1.50", "1.20"]).await;

    let (a, b, c) = tokio::join!(
        h.engine.commit(CONN, &match_id, &round_id, Some(1)),
        h.engine.commit(CONN, &match_id, &round_id, Some(2)),
        h.engine.commit(CONN, &match_id, &round_id, Some(3)),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());

    let wager = h.engine.state().load_wager(&h.player).await.unwrap().unwrap();
    assert_eq!(wager.committed_events.len(), 3);
    assert_eq!(h.ledger.debits().len(), 1);

    h.engine.end(CONN, &match_id).await.unwrap();
    assert_eq!(h.ledger.credits().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_commit_after_grace_window_is_refused() {
    let h = Harness::new("100").await;
    let match_id = h.place("10").await;
    let now = h.engine.clock().now_ms();
    let round_id = h
        .install_round_ending(&["2.00"], RoundStatus::Ended, now - 4_000)
        .await;
    let before = h.engine.state().load_wager(&h.player).await.unwrap();

    let result = h.engine.commit(CONN, &match_id, &round_id, Some(1)).await;
    assert!(matches!(result, Err(GameError::RoundClosed { .. })));
    assert_eq!(h.engine.state().load_wager(&h.player).await.unwrap(), before);
    assert!(h.ledger.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_commit_inside_grace_window_is_accepted() {
    let h = Harness::new("100").await;
    let match_id = h.place("10").await;
    let now = h.engine.clock().now_ms();
    let round_id = h
        .install_round_ending(&["2.00"], RoundStatus::Ended, now - 2_000)
        .await;

    let view = h
        .engine
        .commit(CONN, &match_id, &round_id, Some(1))
        .await
        .unwrap();
    assert_eq!(view.win_amount, d("20.00"));
}

#[tokio::test(start_paused = true)]
async fn test_commit_on_round_not_started() {
    let h = Harness::new("100").await;
    let match_id = h.place("10").await;
    let now = h.engine.clock().now_ms();
    let round_id = h
        .install_round_ending(&["2.00"], RoundStatus::NotStarted, now + 11_000)
        .await;

    let result = h.engine.commit(CONN, &match_id, &round_id, Some(1)).await;
    assert!(matches!(result, Err(GameError::RoundClosed { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_end_twice_moves_money_once() {
    let h = Harness::new("100").await;
    let match_id = h.place("10").await;
    let round_id = h.install_round(&["2.00"]).await;
    h.engine.commit(CONN, &match_id, &round_id, Some(1)).await.unwrap();

    h.engine.end(CONN, &match_id).await.unwrap();
    let calls = h.ledger.calls().len();

    let again = h.engine.end(CONN, &match_id).await;
    assert!(matches!(again, Err(GameError::NoActiveWager { .. })));
    assert_eq!(h.ledger.calls().len(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_end_without_cuts_cancels() {
    let h = Harness::new("100").await;
    let match_id = h.place("10").await;

    let view = h.engine.end(CONN, &match_id).await.unwrap();
    assert_eq!(view.status, WagerStatus::Cancelled);
    assert!(h.ledger.calls().is_empty());

    let record = h.history.settlement(&match_id).await.unwrap().unwrap();
    assert_eq!(record.status, WagerStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_refused_debit_cancels_wager() {
    let h = Harness::new("100").await;
    h.ledger
        .fail_next_debit(LedgerError::Rejected("insufficient funds".to_string()));
    let match_id = h.place("10").await;
    let round_id = h.install_round(&["2.00"]).await;

    let result = h.engine.commit(CONN, &match_id, &round_id, Some(1)).await;
    assert!(matches!(result, Err(GameError::DebitFailed { .. })));

    assert!(h.engine.state().load_wager(&h.player).await.unwrap().is_none());
    let record = h.history.settlement(&match_id).await.unwrap().unwrap();
    assert_eq!(record.status, WagerStatus::Cancelled);
    assert!(h.ledger.credits().is_empty());
    assert_eq!(h.ledger.balance(), Some(d("100")));

    // the player can bet again
    h.place("5").await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_credit_is_retried_with_same_key() {
    let h = Harness::new("100").await;
    let match_id = h.place("10").await;
    let round_id = h.install_round(&["2.00"]).await;
    h.engine.commit(CONN, &match_id, &round_id, Some(1)).await.unwrap();

    h.ledger.fail_next_credit(LedgerError::Timeout);
    let first = h.engine.end(CONN, &match_id).await;
    assert!(matches!(first, Err(GameError::CreditFailed { .. })));

    let pending = h.engine.state().load_wager(&h.player).await.unwrap().unwrap();
    assert_eq!(pending.status, WagerStatus::Win);
    assert!(matches!(pending.credit, LedgerLeg::Failed { .. }));
    assert!(h.engine.supervisor().wager_armed(&match_id));

    // a second bet is refused until the win is paid
    assert!(matches!(
        h.engine.place(CONN, Some(d("1"))).await,
        Err(GameError::WagerInProgress)
    ));

    let view = h.engine.end(CONN, &match_id).await.unwrap();
    assert_eq!(view.status, WagerStatus::Win);

    let credits = h.ledger.credits();
    assert_eq!(credits.len(), 2);
    assert_eq!(credits[0].idempotency_key, credits[1].idempotency_key);
    assert!(h.engine.state().load_wager(&h.player).await.unwrap().is_none());
    assert_eq!(h.ledger.balance(), Some(d("110")));
}

#[tokio::test(start_paused = true)]
async fn test_credit_gives_up_after_retry_limit() {
    let h = Harness::new("100").await;
    let match_id = h.place("10").await;
    let round_id = h.install_round(&["2.00"]).await;
    h.engine.commit(CONN, &match_id, &round_id, Some(1)).await.unwrap();

    for _ in 0..3 {
        h.ledger.fail_next_credit(LedgerError::Timeout);
        assert!(h.engine.end(CONN, &match_id).await.is_err());
    }
    assert!(h.engine.end(CONN, &match_id).await.is_err());

    assert_eq!(h.ledger.credits().len(), 3);
    assert!(!h.engine.supervisor().wager_armed(&match_id));
    let kept = h.engine.state().load_wager(&h.player).await.unwrap().unwrap();
    assert_eq!(kept.status, WagerStatus::Win);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_session_logs_out() {
    let mut h = Harness::new("100").await;
    h.ledger.fail_next_debit(LedgerError::InvalidSession);
    let match_id = h.place("10").await;
    let round_id = h.install_round(&["2.00"]).await;
    h.drain();

    h.engine
        .dispatch(
            CONN,
            ClientCommand::Commit {
                match_id: match_id.clone(),
                round_id,
                event_id: Some(1),
            },
        )
        .await;

    let events = h.drain();
    assert!(events.iter().any(|e| matches!(e, ServerEvent::Logout(_))));
    assert!(!events.iter().any(|e| matches!(e, ServerEvent::BetError(_))));
    assert!(h.engine.state().load_session(CONN).await.unwrap().is_none());
    assert!(h.engine.state().load_wager(&h.player).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_validation_error_reaches_socket() {
    let mut h = Harness::new("100").await;
    h.drain();

    h.engine.handle_frame(CONN, "MS:0.01").await;

    let events = h.drain();
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerEvent::BetError(msg) if msg == "Invalid Bet Amount")));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_cashes_out_open_wager() {
    let h = Harness::new("100").await;
    let match_id = h.place("10").await;
    let round_id = h.install_round(&["2.00"]).await;
    h.engine.commit(CONN, &match_id, &round_id, Some(1)).await.unwrap();

    tokio::time::sleep(Duration::from_secs(51)).await;

    assert!(h.engine.state().load_wager(&h.player).await.unwrap().is_none());
    let record = h.history.settlement(&match_id).await.unwrap().unwrap();
    assert_eq!(record.status, WagerStatus::Win);
    assert_eq!(record.win_amount, d("20.00"));
    assert_eq!(h.ledger.credits().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_cancels_wager_without_cuts() {
    let h = Harness::new("100").await;
    let match_id = h.place("10").await;

    tokio::time::sleep(Duration::from_secs(51)).await;

    let record = h.history.settlement(&match_id).await.unwrap().unwrap();
    assert_eq!(record.status, WagerStatus::Cancelled);
    assert!(h.ledger.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_commit_pushes_deadline_back() {
    let h = Harness::new("100").await;
    let match_id = h.place("10").await;

    tokio::time::sleep(Duration::from_secs(40)).await;
    let round_id = h.install_round(&["2.00"]).await;
    h.engine.commit(CONN, &match_id, &round_id, Some(1)).await.unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(h.engine.state().load_wager(&h.player).await.unwrap().is_some());

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(h.engine.state().load_wager(&h.player).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_resumes_wager() {
    let h = Harness::new("100").await;
    let match_id = h.place("10").await;
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    h.engine.disconnect(CONN).await;
    assert!(!h.engine.scheduler().is_running(&h.player));
    assert!(h.engine.state().load_session(CONN).await.unwrap().is_none());
    assert!(h.engine.state().load_wager(&h.player).await.unwrap().is_some());

    let (outbox, mut events) = mpsc::unbounded_channel();
    h.engine
        .connect("conn-2", &profile("op", "u1", d("100")), "token-2", "fruitcut", outbox)
        .await
        .unwrap();

    let mut resumed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(&event, ServerEvent::Bet(view) if view.match_id == match_id) {
            resumed = true;
        }
    }
    assert!(resumed);
    assert!(h.engine.scheduler().is_running(&h.player));

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(h.engine.state().load_lobby(&h.player).await.unwrap().is_some());

    let round_id = h.install_round(&["2.00"]).await;
    let view = h
        .engine
        .commit("conn-2", &match_id, &round_id, Some(1))
        .await
        .unwrap();
    assert_eq!(view.status, WagerStatus::Committed);

    let view = h.engine.end("conn-2", &match_id).await.unwrap();
    assert_eq!(view.status, WagerStatus::Win);
    assert_eq!(view.win_amount, d("20.00"));
    let credits = h.ledger.credits();
    assert_eq!(credits.len(), 1);
    assert_eq!(credits[0].token, "token-2");
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_losing_cut_settles_as_loss() {
    let h = Harness::new("100").await;
    let match_id = h.place("10").await;
    let round_id = h.install_round(&["0.00", "3.00"]).await;
    h.ledger.set_delay(Duration::from_millis(500));

    let engine = h.engine.clone();
    let (m, r) = (match_id.clone(), round_id.clone());
    let cut = tokio::spawn(async move { engine.commit(CONN, &m, &r, Some(1)).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    cut.abort();
    let _ = cut.await;

    let stored = h.engine.state().load_wager(&h.player).await.unwrap().unwrap();
    assert_eq!(stored.status, WagerStatus::Loss);
    assert!(matches!(stored.debit, LedgerLeg::Pending));

    // no more cuts after a zero fruit
    assert!(matches!(
        h.engine.commit(CONN, &match_id, &round_id, Some(2)).await,
        Err(GameError::NoActiveWager { .. })
    ));

    let view = h.engine.end(CONN, &match_id).await.unwrap();
    assert_eq!(view.status, WagerStatus::Loss);
    assert_eq!(view.win_amount, Decimal::ZERO);
    assert!(view.match_end_time.is_some());
    assert!(h.ledger.credits().is_empty());
    assert_eq!(h.ledger.balance(), Some(d("90")));

    let record = h.history.settlement(&match_id).await.unwrap().unwrap();
    assert_eq!(record.status, WagerStatus::Loss);
    assert!(h.engine.state().load_wager(&h.player).await.unwrap().is_none());
}
