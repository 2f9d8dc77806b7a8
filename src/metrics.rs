//! Prometheus metrics for the game server

use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Game counters, registered on a private [`Registry`]
#[derive(Clone)]
pub struct GameMetrics {
    registry: Registry,
    pub wagers_placed: IntCounter,
    /// label `result`: continue, loss, rejected
    pub commits: IntCounterVec,
    /// label `outcome`: win, loss, cancelled
    pub settlements: IntCounterVec,
    /// labels `direction`, `result`
    pub ledger_calls: IntCounterVec,
    /// label `kind`
    pub errors: IntCounterVec,
    pub live_rounds: IntGauge,
    pub connections: IntGauge,
}

impl GameMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("fruitcut".to_string()), None)?;

        let wagers_placed = IntCounter::new("wagers_placed_total", "Wagers accepted")?;
        let commits = IntCounterVec::new(
            Opts::new("commits_total", "Fruit cut attempts by result"),
            &["result"],
        )?;
        let settlements = IntCounterVec::new(
            Opts::new("settlements_total", "Terminal wagers by outcome"),
            &["outcome"],
        )?;
        let ledger_calls = IntCounterVec::new(
            Opts::new("ledger_calls_total", "Ledger calls by direction and result"),
            &["direction", "result"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("errors_total", "Operation errors by kind"),
            &["kind"],
        )?;
        let live_rounds = IntGauge::new("live_rounds", "Running round schedulers")?;
        let connections = IntGauge::new("connections", "Open game sockets")?;

        registry.register(Box::new(wagers_placed.clone()))?;
        registry.register(Box::new(commits.clone()))?;
        registry.register(Box::new(settlements.clone()))?;
        registry.register(Box::new(ledger_calls.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(live_rounds.clone()))?;
        registry.register(Box::new(connections.clone()))?;

        Ok(Self {
            registry,
            wagers_placed,
            commits,
            settlements,
            ledger_calls,
            errors,
            live_rounds,
            connections,
        })
    }

    /// Text exposition format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Keeps `live_rounds` accurate when a scheduler task ends or is aborted
pub struct LiveRoundGuard {
    gauge: IntGauge,
}

impl LiveRoundGuard {
    pub fn new(gauge: &IntGauge) -> Self {
        gauge.inc();
        Self {
            gauge: gauge.clone(),
        }
    }
}

impl Drop for LiveRoundGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}
