//! Per-player round loop
//!
//! Each player identity gets at most one running loop. A loop produces
//! rounds NOT_STARTED -> ONGOING -> ENDED, writes each transition to the
//! player's `LB:` key and pushes it to the player's socket. In repeating mode
//! it continues after a cool-down until stopped; in on-demand mode it exits
//! after one round.

use super::connections::ConnectionRegistry;
use super::generator;
use super::timeouts::{TimeoutSupervisor, TimerTable};
use super::types::{LobbyState, PlayerKey, Round, RoundStatus};
use crate::clock::MonotonicClock;
use crate::config::{RoundConfig, RoundMode};
use crate::history::{HistoryStore, RoundRecord};
use crate::metrics::{GameMetrics, LiveRoundGuard};
use crate::protocol::ServerEvent;
use crate::store::GameState;
use rand::rngs::StdRng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct RoundScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    state: GameState,
    history: Arc<dyn HistoryStore>,
    connections: ConnectionRegistry,
    supervisor: Arc<TimeoutSupervisor>,
    clock: MonotonicClock,
    config: RoundConfig,
    rng: Mutex<StdRng>,
    loops: TimerTable,
    metrics: GameMetrics,
}

impl RoundScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: GameState,
        history: Arc<dyn HistoryStore>,
        connections: ConnectionRegistry,
        supervisor: Arc<TimeoutSupervisor>,
        clock: MonotonicClock,
        config: RoundConfig,
        rng: StdRng,
        metrics: GameMetrics,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                state,
                history,
                connections,
                supervisor,
                clock,
                config,
                rng: Mutex::new(rng),
                loops: TimerTable::new(),
                metrics,
            }),
        }
    }

    /// How long a lobby key outlives its last write
    ///
    /// Long enough for the previous round to stay resolvable through its
    /// commit grace window.
    pub fn retention(&self) -> Duration {
        let c = &self.inner.config;
        Duration::from_millis(
            c.not_started_delay_ms + c.duration_ms + c.cooldown_ms + c.commit_grace_ms + 1_000,
        )
    }

    /// Start the loop for `player` unless one is already running
    ///
    /// A newly started loop also gets its lifetime cap armed. Returns whether
    /// a loop was started.
    pub fn ensure_running(&self, player: &PlayerKey) -> bool {
        let key = player.to_string();

        let this = self.clone();
        let owner = player.clone();
        let started = self
            .inner
            .loops
            .spawn_if_idle(&key, async move { this.run(owner).await });

        if started {
            let this = self.clone();
            let owner = player.clone();
            self.inner.supervisor.arm_lobby(&key, async move {
                info!(player = %owner, "Lobby lifetime reached");
                this.stop(&owner).await;
            });
            info!(player = %player, "Round scheduler started");
        }
        started
    }

    pub fn is_running(&self, player: &PlayerKey) -> bool {
        self.inner.loops.is_armed(&player.to_string())
    }

    /// Cancel the loop and lifetime timer and drop the cached rounds
    ///
    /// Safe to call for a player with nothing running.
    pub async fn stop(&self, player: &PlayerKey) -> bool {
        let key = player.to_string();
        let was_running = self.inner.loops.cancel(&key);
        self.inner.supervisor.cancel_lobby(&key);

        if let Err(e) = self.inner.state.delete_lobby(player).await {
            warn!(player = %player, error = %e, "Failed to evict lobby");
        }
        if was_running {
            info!(player = %player, "Round scheduler stopped");
        }
        was_running
    }

    fn new_round(&self) -> Round {
        let config = &self.inner.config;
        let events = {
            let mut rng = self
                .inner
                .rng
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            generator::generate_events(&mut *rng, config.min_events, config.max_events)
        };

        let now = self.inner.clock.now_ms();
        let start_time = now + config.not_started_delay_ms;
        Round {
            round_id: Uuid::new_v4().to_string(),
            status: RoundStatus::NotStarted,
            start_time,
            end_time: start_time + config.duration_ms,
            server_time: now,
            events,
        }
    }

    async fn run(self, player: PlayerKey) {
        let _live = LiveRoundGuard::new(&self.inner.metrics.live_rounds);
        let config = self.inner.config.clone();

        loop {
            let mut round = self.new_round();
            debug!(player = %player, round_id = %round.round_id, events = round.events.len(), "Round created");
            self.publish(&player, &round).await;

            tokio::time::sleep(config.not_started_delay()).await;
            let now = self.inner.clock.now_ms();
            round.status = RoundStatus::Ongoing;
            round.start_time = now;
            round.end_time = round.end_time.max(now + config.duration_ms);
            round.server_time = now;
            self.publish(&player, &round).await;

            tokio::time::sleep(config.duration()).await;
            let now = self.inner.clock.now_ms();
            round.status = RoundStatus::Ended;
            round.end_time = round.end_time.max(now);
            round.server_time = now;
            self.publish(&player, &round).await;
            self.record(&player, &round).await;

            if config.mode == RoundMode::OnDemand {
                debug!(player = %player, "On-demand round finished");
                break;
            }
            tokio::time::sleep(config.cooldown()).await;
        }
    }

    async fn publish(&self, player: &PlayerKey, round: &Round) {
        let state = &self.inner.state;
        let previous = match state.load_lobby(player).await {
            Ok(Some(lobby)) if lobby.current.round_id != round.round_id => Some(lobby.current),
            Ok(Some(lobby)) => lobby.previous,
            Ok(None) => None,
            Err(e) => {
                warn!(player = %player, error = %e, "Failed to read lobby");
                None
            }
        };

        let lobby = LobbyState {
            current: round.clone(),
            previous,
        };
        if let Err(e) = state.save_lobby(player, &lobby, self.retention()).await {
            warn!(player = %player, round_id = %round.round_id, error = %e, "Failed to persist round");
        }

        self.inner
            .connections
            .send_to_player(player, ServerEvent::Round(round.clone()));
    }

    async fn record(&self, player: &PlayerKey, round: &Round) {
        let record = RoundRecord {
            operator_id: player.operator_id.clone(),
            user_id: player.user_id.clone(),
            round: round.clone(),
        };
        if let Err(e) = self.inner.history.record_round(&record).await {
            warn!(player = %player, round_id = %round.round_id, error = %e, "Failed to record round");
        }
    }
}
