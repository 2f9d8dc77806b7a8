//! The wager lifecycle
//!
//! [`GameEngine`] ties the state store, round scheduler, timeout supervisor
//! and ledger coordinator together behind three player operations: place,
//! commit and end. Every operation on a player runs under that player's lock
//! from its first read to its last write, ledger calls included.

use super::connections::{ConnectionRegistry, Outbox};
use super::locks::PlayerLocks;
use super::scheduler::RoundScheduler;
use super::settlement::LedgerCoordinator;
use super::timeouts::TimeoutSupervisor;
use super::types::{
    BalanceInfo, PlayerKey, PlayerSession, RoundStatus, Wager, WagerStatus, WagerView,
};
use super::wager::CommitOutcome;
use crate::clock::MonotonicClock;
use crate::config::AppConfig;
use crate::directory::UserProfile;
use crate::errors::{ErrorKind, GameError, GameResult};
use crate::history::HistoryStore;
use crate::ledger::Ledger;
use crate::metrics::GameMetrics;
use crate::protocol::{ClientCommand, ServerEvent};
use crate::queue::EventPublisher;
use crate::store::{GameState, StateStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What asked for a wager to end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndTrigger {
    Player,
    Timeout,
}

/// Collaborators the engine is built from
pub struct EngineDeps {
    pub config: AppConfig,
    pub store: Arc<dyn StateStore>,
    pub history: Arc<dyn HistoryStore>,
    pub ledger: Arc<dyn Ledger>,
    pub publisher: Arc<dyn EventPublisher>,
    pub metrics: GameMetrics,
    pub clock: MonotonicClock,
    /// Seed for round generation, random when `None`
    pub seed: Option<u64>,
}

#[derive(Clone)]
pub struct GameEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: AppConfig,
    state: GameState,
    locks: PlayerLocks,
    connections: ConnectionRegistry,
    scheduler: RoundScheduler,
    supervisor: Arc<TimeoutSupervisor>,
    coordinator: LedgerCoordinator,
    history: Arc<dyn HistoryStore>,
    metrics: GameMetrics,
    clock: MonotonicClock,
}

impl GameEngine {
    pub fn new(deps: EngineDeps) -> Self {
        let EngineDeps {
            config,
            store,
            history,
            ledger,
            publisher,
            metrics,
            clock,
            seed,
        } = deps;

        let state = GameState::new(store, Duration::from_secs(config.game.session_ttl_secs));
        let connections = ConnectionRegistry::new();
        let supervisor = Arc::new(TimeoutSupervisor::new(
            config.timeouts.wager_timeout(),
            config.timeouts.lobby_lifetime(),
        ));
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let scheduler = RoundScheduler::new(
            state.clone(),
            history.clone(),
            connections.clone(),
            supervisor.clone(),
            clock.clone(),
            config.round.clone(),
            rng,
            metrics.clone(),
        );
        let coordinator = LedgerCoordinator::new(
            ledger,
            history.clone(),
            publisher,
            state.clone(),
            clock.clone(),
            metrics.clone(),
            config.ledger.max_credit_attempts,
        );

        Self {
            inner: Arc::new(EngineInner {
                config,
                state,
                locks: PlayerLocks::new(),
                connections,
                scheduler,
                supervisor,
                coordinator,
                history,
                metrics,
                clock,
            }),
        }
    }

    pub fn state(&self) -> &GameState {
        &self.inner.state
    }

    pub fn scheduler(&self) -> &RoundScheduler {
        &self.inner.scheduler
    }

    pub fn supervisor(&self) -> &TimeoutSupervisor {
        &self.inner.supervisor
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.inner.connections
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.inner.history
    }

    pub fn metrics(&self) -> &GameMetrics {
        &self.inner.metrics
    }

    pub fn clock(&self) -> &MonotonicClock {
        &self.inner.clock
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Cache the session of a freshly authenticated socket
    ///
    /// Sends the balance, and the player's in-flight wager if there is one.
    pub async fn connect(
        &self,
        conn_id: &str,
        profile: &UserProfile,
        token: &str,
        game_id: &str,
        outbox: Outbox,
    ) -> GameResult<PlayerSession> {
        let player = PlayerKey::new(profile.operator_id.clone(), profile.user_id.clone());
        let session = PlayerSession {
            conn_id: conn_id.to_string(),
            player: player.clone(),
            name: profile.name.clone(),
            avatar: profile.avatar(),
            balance: profile.balance,
            token: token.to_string(),
            game_id: game_id.to_string(),
        };

        let _guard = self.inner.locks.acquire(&player).await;
        self.inner.state.save_session(&session).await?;
        self.inner
            .connections
            .register(conn_id, player.clone(), outbox);
        self.inner
            .metrics
            .connections
            .set(self.inner.connections.len() as i64);
        self.inner
            .connections
            .send_to_conn(conn_id, ServerEvent::Info((&session).into()));

        if let Some(mut wager) = self.inner.state.load_wager(&player).await? {
            info!(player = %player, match_id = %wager.wager_id, status = wager.status.as_str(), "Resuming wager");
            if wager.token != session.token {
                // pending ledger legs go out under the live session
                wager.token = session.token.clone();
                self.inner.state.save_wager(&wager).await?;
            }
            if !wager.status.is_terminal() {
                self.inner.scheduler.ensure_running(&player);
            }
            if !self.inner.supervisor.wager_armed(&wager.wager_id) {
                self.arm_wager_timeout(&wager);
            }
            self.inner
                .connections
                .send_to_conn(conn_id, ServerEvent::Bet(wager.view()));
        }

        info!(conn_id, player = %player, balance = %session.balance, "Player connected");
        Ok(session)
    }

    /// Drop the socket's session and stop its rounds
    ///
    /// An open wager is left to its forced-settlement timer.
    pub async fn disconnect(&self, conn_id: &str) {
        if let Err(e) = self.inner.state.delete_session(conn_id).await {
            warn!(conn_id, error = %e, "Failed to evict session");
        }
        if let Some(player) = self.inner.connections.unregister(conn_id) {
            self.inner.scheduler.stop(&player).await;
            info!(conn_id, player = %player, "Player disconnected");
        }
        self.inner
            .metrics
            .connections
            .set(self.inner.connections.len() as i64);
        self.inner.locks.prune();
    }

    /// Parse and run one inbound frame
    pub async fn handle_frame(&self, conn_id: &str, frame: &str) {
        match ClientCommand::parse(frame) {
            Some(command) => self.dispatch(conn_id, command).await,
            None => debug!(conn_id, frame, "Ignoring unknown frame"),
        }
    }

    /// Run a command, reporting any failure to the socket
    pub async fn dispatch(&self, conn_id: &str, command: ClientCommand) {
        let result = match &command {
            ClientCommand::PlaceBet { amount } => self.place(conn_id, *amount).await,
            ClientCommand::Commit {
                match_id,
                round_id,
                event_id,
            } => self.commit(conn_id, match_id, round_id, *event_id).await,
            ClientCommand::End { match_id } => self.end(conn_id, match_id).await,
        };

        if let Err(err) = result {
            if matches!(command, ClientCommand::Commit { .. }) {
                self.inner
                    .metrics
                    .commits
                    .with_label_values(&["rejected"])
                    .inc();
            }
            self.report(conn_id, command.name(), &err).await;
        }
    }

    async fn report(&self, conn_id: &str, operation: &str, err: &GameError) {
        let kind = err.kind();
        self.inner
            .metrics
            .errors
            .with_label_values(&[kind.as_str()])
            .inc();

        match kind {
            ErrorKind::Validation | ErrorKind::StateConflict => {
                warn!(conn_id, operation, kind = kind.as_str(), error = %err, "Operation rejected")
            }
            _ => error!(conn_id, operation, kind = kind.as_str(), error = %err, "Operation failed"),
        }

        let message = err.client_message().to_string();
        if kind == ErrorKind::SessionExpired {
            if let Err(e) = self.inner.state.delete_session(conn_id).await {
                warn!(conn_id, error = %e, "Failed to evict expired session");
            }
            self.inner
                .connections
                .send_to_conn(conn_id, ServerEvent::Logout(message));
        } else {
            self.inner
                .connections
                .send_to_conn(conn_id, ServerEvent::BetError(message));
        }
    }

    async fn session_player(&self, conn_id: &str) -> GameResult<PlayerKey> {
        self.inner
            .state
            .load_session(conn_id)
            .await?
            .map(|session| session.player)
            .ok_or(GameError::NoSession)
    }

    /// The player's wager with id `match_id`, whatever its status
    async fn find_wager(&self, player: &PlayerKey, match_id: &str) -> GameResult<Wager> {
        self.inner
            .state
            .load_wager(player)
            .await?
            .filter(|wager| wager.wager_id == match_id)
            .ok_or_else(|| GameError::NoActiveWager {
                match_id: match_id.to_string(),
            })
    }

    fn arm_wager_timeout(&self, wager: &Wager) {
        let engine = self.clone();
        let player = wager.player.clone();
        let match_id = wager.wager_id.clone();
        self.inner
            .supervisor
            .arm_wager(&wager.wager_id, async move {
                engine.expire(player, match_id).await;
            });
    }

    fn send_balance(&self, conn_id: Option<&str>, info: Option<BalanceInfo>) {
        if let (Some(conn_id), Some(info)) = (conn_id, info) {
            self.inner
                .connections
                .send_to_conn(conn_id, ServerEvent::Info(info));
        }
    }

    /// Accept a new wager for the socket's player
    pub async fn place(&self, conn_id: &str, amount: Option<Decimal>) -> GameResult<WagerView> {
        let player = self.session_player(conn_id).await?;
        let _guard = self.inner.locks.acquire(&player).await;

        let session = self
            .inner
            .state
            .load_session(conn_id)
            .await?
            .ok_or(GameError::NoSession)?;

        let game = &self.inner.config.game;
        let amount = amount.ok_or(GameError::InvalidAmount)?;
        if amount < game.min_bet || amount > game.max_bet {
            return Err(GameError::InvalidAmount);
        }
        if session.balance < amount {
            return Err(GameError::InsufficientBalance);
        }
        if self.inner.state.load_wager(&player).await?.is_some() {
            return Err(GameError::WagerInProgress);
        }

        self.inner.scheduler.ensure_running(&player);
        let ongoing = self
            .inner
            .state
            .load_lobby(&player)
            .await?
            .map(|lobby| lobby.current.status == RoundStatus::Ongoing)
            .unwrap_or(false);
        let status = if ongoing {
            WagerStatus::Active
        } else {
            WagerStatus::NotStarted
        };

        let wager = Wager::new(
            Uuid::new_v4().to_string(),
            &session,
            amount,
            status,
            self.inner.clock.now_ms(),
        );
        self.inner.state.save_wager(&wager).await?;
        self.arm_wager_timeout(&wager);
        self.inner.metrics.wagers_placed.inc();

        info!(
            player = %player,
            match_id = %wager.wager_id,
            bet_amount = %amount,
            status = status.as_str(),
            "Wager placed"
        );

        let view = wager.view();
        self.inner
            .connections
            .send_to_conn(conn_id, ServerEvent::Bet(view.clone()));
        Ok(view)
    }

    /// Cut one fruit of a round for the player's open wager
    pub async fn commit(
        &self,
        conn_id: &str,
        match_id: &str,
        round_id: &str,
        event_id: Option<u32>,
    ) -> GameResult<WagerView> {
        let player = self.session_player(conn_id).await?;
        let _guard = self.inner.locks.acquire(&player).await;

        let mut wager = self.find_wager(&player, match_id).await?;
        if wager.debit.is_pending() {
            // first cut was interrupted mid-debit
            self.debit_or_abort(Some(conn_id), &mut wager).await?;
        }
        if wager.status.is_terminal() {
            return Err(GameError::NoActiveWager {
                match_id: match_id.to_string(),
            });
        }

        let now = self.inner.clock.now_ms();
        let grace = self.inner.config.round.commit_grace_ms;
        let lobby = self.inner.state.load_lobby(&player).await?;
        let closed = |reason: &'static str| GameError::RoundClosed {
            round_id: round_id.to_string(),
            reason,
        };
        let round = lobby
            .as_ref()
            .and_then(|lobby| lobby.find(round_id))
            .ok_or_else(|| closed("round not found"))?;
        if round.status == RoundStatus::NotStarted {
            return Err(closed("round not started"));
        }
        if now > round.end_time + grace {
            return Err(closed("grace window elapsed"));
        }

        let invalid = || GameError::InvalidEvent {
            round_id: round_id.to_string(),
            event_id,
        };
        let event = event_id
            .and_then(|id| round.event(id))
            .ok_or_else(invalid)?;
        if wager.has_cut(round_id, event.event_id) {
            return Err(invalid());
        }

        let outcome = wager.apply_commit(round_id, event);
        if !wager.debit.is_done() {
            self.debit_or_abort(Some(conn_id), &mut wager).await?;
        }

        match outcome {
            CommitOutcome::Loss => {
                wager.mark_loss(now);
                self.inner
                    .metrics
                    .commits
                    .with_label_values(&["loss"])
                    .inc();
                info!(
                    player = %player,
                    match_id,
                    round_id,
                    event_id = event.event_id,
                    multiplier = %event.multiplier,
                    "Losing cut"
                );
                self.finish(&mut wager).await?;
                let view = wager.view();
                self.inner
                    .connections
                    .send_to_conn(conn_id, ServerEvent::MatchEnd(view.clone()));
                self.inner.scheduler.stop(&player).await;
                Ok(view)
            }
            CommitOutcome::Continue => {
                self.inner.state.save_wager(&wager).await?;
                self.arm_wager_timeout(&wager);
                self.inner
                    .metrics
                    .commits
                    .with_label_values(&["continue"])
                    .inc();
                debug!(
                    player = %player,
                    match_id,
                    round_id,
                    event_id = event.event_id,
                    multiplier = %wager.multiplier,
                    win_amount = %wager.win_amount,
                    "Cut committed"
                );
                let view = wager.view();
                self.inner
                    .connections
                    .send_to_conn(conn_id, ServerEvent::FruitSlice(view.clone()));
                Ok(view)
            }
        }
    }

    /// Take the wager's debit, cancelling the wager if the ledger refuses
    async fn debit_or_abort(&self, conn_id: Option<&str>, wager: &mut Wager) -> GameResult<()> {
        let bet_amount = wager.bet_amount;
        match self.inner.coordinator.ensure_debit(wager).await {
            Ok(Some(receipt)) => {
                let info = self
                    .inner
                    .coordinator
                    .reconcile_balance(conn_id, &receipt, -bet_amount)
                    .await?;
                self.send_balance(conn_id, info);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err @ (GameError::DebitFailed { .. } | GameError::SessionExpired)) => {
                wager.mark_cancelled(self.inner.clock.now_ms());
                warn!(
                    player = %wager.player,
                    match_id = %wager.wager_id,
                    error = %err,
                    "Wager cancelled after refused debit"
                );
                if let Err(e) = self.finish(wager).await {
                    warn!(match_id = %wager.wager_id, error = %e, "Cancelled wager not finalized");
                }
                self.inner.scheduler.stop(&wager.player).await;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Finalize a terminal wager and evict it
    ///
    /// On failure the wager stays in the store with its timer re-armed, so
    /// finalization is retried.
    async fn finish(&self, wager: &mut Wager) -> GameResult<()> {
        if let Err(err) = self.inner.coordinator.finalize(wager).await {
            self.arm_wager_timeout(wager);
            return Err(err);
        }

        self.inner.state.delete_wager(&wager.player).await?;
        self.inner.supervisor.cancel_wager(&wager.wager_id);

        let outcome = match wager.status {
            WagerStatus::Win => "win",
            WagerStatus::Loss => "loss",
            _ => "cancelled",
        };
        self.inner
            .metrics
            .settlements
            .with_label_values(&[outcome])
            .inc();
        info!(
            player = %wager.player,
            match_id = %wager.wager_id,
            status = wager.status.as_str(),
            bet_amount = %wager.bet_amount,
            win_amount = %wager.win_amount,
            cuts = wager.committed_events.len(),
            "Wager settled"
        );
        Ok(())
    }

    /// Explicit cash-out from the socket's player
    pub async fn end(&self, conn_id: &str, match_id: &str) -> GameResult<WagerView> {
        let player = self.session_player(conn_id).await?;
        self.end_for_player(&player, match_id, EndTrigger::Player).await
    }

    /// Forced cash-out when a wager's timer fires
    pub async fn expire(&self, player: PlayerKey, match_id: String) {
        info!(player = %player, match_id = %match_id, "Wager timeout reached");
        match self
            .end_for_player(&player, &match_id, EndTrigger::Timeout)
            .await
        {
            Ok(_) => {}
            // settled by the player while this timer waited for the lock
            Err(GameError::NoActiveWager { .. }) => {
                debug!(player = %player, match_id = %match_id, "Wager already settled");
            }
            Err(err) => match self.inner.connections.conn_for(&player) {
                Some(conn_id) => self.report(&conn_id, "expire", &err).await,
                None => warn!(player = %player, match_id = %match_id, error = %err, "Forced settlement failed"),
            },
        }
    }

    /// Settle the player's wager `match_id`
    ///
    /// Zero cuts cancel it without moving money. Otherwise it is a win and is
    /// credited. A wager already terminal from an earlier failed attempt has
    /// its credit or finalization retried.
    pub async fn end_for_player(
        &self,
        player: &PlayerKey,
        match_id: &str,
        trigger: EndTrigger,
    ) -> GameResult<WagerView> {
        let _guard = self.inner.locks.acquire(player).await;
        let mut wager = self.find_wager(player, match_id).await?;
        if trigger == EndTrigger::Timeout && self.inner.supervisor.wager_armed(match_id) {
            // a cut landed while this timer waited for the lock
            debug!(player = %player, match_id, "Deadline moved, skipping forced settlement");
            return Ok(wager.view());
        }
        let conn_id = self.inner.connections.conn_for(player);

        if wager.debit.is_pending() {
            self.debit_or_abort(conn_id.as_deref(), &mut wager).await?;
        }

        let now = self.inner.clock.now_ms();
        if !wager.status.is_terminal() {
            if wager.is_lost() {
                wager.mark_loss(now);
            } else if wager.has_committed() {
                wager.mark_win(now);
            } else {
                wager.mark_cancelled(now);
            }
        } else if wager.status == WagerStatus::Loss && wager.match_end_time.is_none() {
            // losing cut whose debit was interrupted
            wager.mark_loss(now);
        }

        if wager.status == WagerStatus::Win && !wager.credit.is_done() {
            let win_amount = wager.win_amount;
            match self.inner.coordinator.credit(&mut wager).await {
                Ok(Some(receipt)) => {
                    let info = self
                        .inner
                        .coordinator
                        .reconcile_balance(conn_id.as_deref(), &receipt, win_amount)
                        .await?;
                    self.send_balance(conn_id.as_deref(), info);
                }
                Ok(None) => {}
                Err(err @ (GameError::CreditFailed { .. } | GameError::SessionExpired)) => {
                    if self.inner.coordinator.can_retry_credit(&wager) {
                        self.arm_wager_timeout(&wager);
                    } else {
                        self.inner.supervisor.cancel_wager(&wager.wager_id);
                    }
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        }

        self.finish(&mut wager).await?;
        let view = wager.view();
        if let Some(conn_id) = conn_id.as_deref() {
            self.inner
                .connections
                .send_to_conn(conn_id, ServerEvent::MatchEnd(view.clone()));
        }
        self.inner.scheduler.stop(player).await;
        Ok(view)
    }
}
