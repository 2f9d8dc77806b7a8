//! Fruitcut Server Binary
//!
//! Loads configuration, builds the collaborators and serves the game socket
//! and history API.

use clap::Parser;
use fruitcut::api::{ApiServer, AppState};
use fruitcut::clock::MonotonicClock;
use fruitcut::config::{ConfigLoader, HistoryBackend};
use fruitcut::directory::HttpUserDirectory;
use fruitcut::game::{EngineDeps, GameEngine};
use fruitcut::history::{HistoryStore, MemoryHistoryStore, RocksHistoryStore};
use fruitcut::ledger::HttpLedger;
use fruitcut::metrics::GameMetrics;
use fruitcut::queue::BroadcastPublisher;
use fruitcut::store::MemoryStateStore;
use fruitcut::FruitcutResult;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "fruitcut")]
#[command(about = "Fruit cut round and wager server", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(long)]
    port: Option<u16>,

    /// Fixed seed for round generation
    #[arg(long)]
    seed: Option<u64>,

    /// Write the effective configuration to this path and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> FruitcutResult<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    if let Some(path) = &args.dump_config {
        ConfigLoader::save(&config, path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.as_str().into()),
        )
        .init();

    info!("Starting fruitcut v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(MemoryStateStore::new());
    store
        .clone()
        .start_sweeper(Duration::from_secs(config.storage.sweep_interval_secs));

    let history: Arc<dyn HistoryStore> = match config.storage.backend {
        HistoryBackend::Rocksdb => {
            info!("Opening history store at {}", config.storage.data_directory.display());
            Arc::new(RocksHistoryStore::open(&config.storage.data_directory)?)
        }
        HistoryBackend::Memory => {
            warn!("Using in-memory history, records are lost on restart");
            Arc::new(MemoryHistoryStore::new())
        }
    };

    let ledger = Arc::new(HttpLedger::new(
        config.ledger.base_url.clone(),
        Duration::from_millis(config.ledger.request_timeout_ms),
    )?);
    let directory = Arc::new(HttpUserDirectory::new(
        config.directory.base_url.clone(),
        Duration::from_millis(config.directory.request_timeout_ms),
    )?);

    let publisher = Arc::new(BroadcastPublisher::new(1024));
    spawn_cashout_log(&publisher);

    let engine = GameEngine::new(EngineDeps {
        config: config.clone(),
        store,
        history,
        ledger,
        publisher,
        metrics: GameMetrics::new()?,
        clock: MonotonicClock::new(),
        seed: args.seed,
    });

    info!(
        min_bet = %config.game.min_bet,
        max_bet = %config.game.max_bet,
        round_mode = ?config.round.mode,
        wager_timeout_secs = config.timeouts.wager_timeout_secs,
        "Game engine ready"
    );

    ApiServer::new(config.server.clone(), AppState::new(engine, directory))
        .run()
        .await
}

/// Log every published cashout for downstream reconciliation
fn spawn_cashout_log(publisher: &BroadcastPublisher) {
    let mut rx = publisher.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => info!(
                    match_id = %event.match_id,
                    operator_id = %event.operator_id,
                    user_id = %event.user_id,
                    bet_amount = %event.bet_amount,
                    win_amount = %event.win_amount,
                    "Cashout"
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Cashout log lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}
