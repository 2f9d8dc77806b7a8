//! Configuration for the fruitcut server
//!
//! Values come from three layers: built-in defaults, an optional TOML file,
//! and `FRUITCUT_*` environment variables. The merged result is validated
//! before the server starts.

use crate::errors::ConfigurationError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Complete server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub game: GameConfig,
    pub round: RoundConfig,
    pub timeouts: TimeoutConfig,
    pub ledger: LedgerConfig,
    pub directory: DirectoryConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

/// Wager limits and session lifetime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    pub min_bet: Decimal,
    pub max_bet: Decimal,
    /// TTL of the `PL:<connId>` session key
    pub session_ttl_secs: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_bet: Decimal::new(10, 2),
            max_bet: Decimal::new(20_000, 0),
            session_ttl_secs: 3600,
        }
    }
}

/// Whether the scheduler loops after a round ends
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundMode {
    Repeating,
    OnDemand,
}

impl FromStr for RoundMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "repeating" => Ok(RoundMode::Repeating),
            "on_demand" | "on-demand" | "ondemand" => Ok(RoundMode::OnDemand),
            other => Err(format!("unknown round mode '{}'", other)),
        }
    }
}

/// Round cadence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoundConfig {
    pub min_events: usize,
    pub max_events: usize,
    /// Time spent in NOT_STARTED before the round opens
    pub not_started_delay_ms: u64,
    /// Nominal ONGOING duration
    pub duration_ms: u64,
    /// Pause between an ENDED round and the next one in repeating mode
    pub cooldown_ms: u64,
    pub mode: RoundMode,
    /// How long after a round's end time a commit is still accepted
    pub commit_grace_ms: u64,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            min_events: 2,
            max_events: 4,
            not_started_delay_ms: 1_000,
            duration_ms: 10_000,
            cooldown_ms: 1_000,
            mode: RoundMode::Repeating,
            commit_grace_ms: 3_000,
        }
    }
}

impl RoundConfig {
    pub fn not_started_delay(&self) -> Duration {
        Duration::from_millis(self.not_started_delay_ms)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Forced cash-out deadline, re-armed on every commit
    pub wager_timeout_secs: u64,
    /// Hard cap on how long a player's round scheduler may run
    pub lobby_lifetime_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            wager_timeout_secs: 50,
            lobby_lifetime_secs: 300,
        }
    }
}

impl TimeoutConfig {
    pub fn wager_timeout(&self) -> Duration {
        Duration::from_secs(self.wager_timeout_secs)
    }

    pub fn lobby_lifetime(&self) -> Duration {
        Duration::from_secs(self.lobby_lifetime_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LedgerConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub max_credit_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9000".to_string(),
            request_timeout_ms: 5_000,
            max_credit_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DirectoryConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9000".to_string(),
            request_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryBackend {
    Memory,
    Rocksdb,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: HistoryBackend,
    pub data_directory: PathBuf,
    /// Expired state-store entries are swept at this interval
    pub sweep_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::Rocksdb,
            data_directory: PathBuf::from("./fruitcut_data"),
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is not set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "fruitcut=info,tower_http=info".to_string(),
        }
    }
}

impl AppConfig {
    /// Short cadence used by tests and local play
    pub fn fast() -> Self {
        let mut config = Self::default();
        config.round.not_started_delay_ms = 100;
        config.round.duration_ms = 2_000;
        config.round.cooldown_ms = 100;
        config.storage.backend = HistoryBackend::Memory;
        config
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let fail = |msg: &str| Err(ConfigurationError::ValidationFailed(msg.to_string()));

        if self.server.port == 0 {
            return fail("server.port must be greater than 0");
        }
        if self.game.min_bet <= Decimal::ZERO {
            return fail("game.min_bet must be positive");
        }
        if self.game.max_bet < self.game.min_bet {
            return fail("game.max_bet must not be lower than game.min_bet");
        }
        if self.round.min_events == 0 {
            return fail("round.min_events must be at least 1");
        }
        if self.round.max_events < self.round.min_events {
            return fail("round.max_events must not be lower than round.min_events");
        }
        if self.round.duration_ms == 0 {
            return fail("round.duration_ms must be greater than 0");
        }
        if self.timeouts.wager_timeout_secs == 0 {
            return fail("timeouts.wager_timeout_secs must be greater than 0");
        }
        if self.timeouts.lobby_lifetime_secs == 0 {
            return fail("timeouts.lobby_lifetime_secs must be greater than 0");
        }
        if self.ledger.max_credit_attempts == 0 {
            return fail("ledger.max_credit_attempts must be at least 1");
        }
        if self.storage.sweep_interval_secs == 0 {
            return fail("storage.sweep_interval_secs must be greater than 0");
        }
        Ok(())
    }
}

/// Loads [`AppConfig`] from an optional TOML file plus environment overrides
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn load(&self) -> Result<AppConfig, ConfigurationError> {
        let mut config = match &self.config_path {
            Some(path) => Self::load_from_file(path)?,
            None => AppConfig::default(),
        };

        Self::apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(path: &Path) -> Result<AppConfig, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path.display(), e))
        })?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)))
    }

    fn apply_env_overrides(config: &mut AppConfig) -> Result<(), ConfigurationError> {
        if let Ok(host) = env::var("FRUITCUT_HOST") {
            config.server.host = host;
        }
        override_parsed("FRUITCUT_PORT", &mut config.server.port)?;
        if let Ok(origins) = env::var("FRUITCUT_ALLOWED_ORIGINS") {
            config.server.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        override_parsed("FRUITCUT_MIN_BET", &mut config.game.min_bet)?;
        override_parsed("FRUITCUT_MAX_BET", &mut config.game.max_bet)?;
        override_parsed("FRUITCUT_ROUND_MODE", &mut config.round.mode)?;
        override_parsed("FRUITCUT_WAGER_TIMEOUT_SECS", &mut config.timeouts.wager_timeout_secs)?;
        override_parsed(
            "FRUITCUT_LOBBY_LIFETIME_SECS",
            &mut config.timeouts.lobby_lifetime_secs,
        )?;

        if let Ok(url) = env::var("FRUITCUT_LEDGER_URL") {
            config.ledger.base_url = url;
        }
        if let Ok(url) = env::var("FRUITCUT_DIRECTORY_URL") {
            config.directory.base_url = url;
        }
        if let Ok(dir) = env::var("FRUITCUT_DATA_DIR") {
            config.storage.data_directory = PathBuf::from(dir);
        }
        if let Ok(backend) = env::var("FRUITCUT_HISTORY_BACKEND") {
            config.storage.backend = match backend.as_str() {
                "memory" => HistoryBackend::Memory,
                "rocksdb" => HistoryBackend::Rocksdb,
                _ => {
                    return Err(ConfigurationError::InvalidValue {
                        field: "FRUITCUT_HISTORY_BACKEND".to_string(),
                        value: backend,
                        reason: "expected 'memory' or 'rocksdb'".to_string(),
                    })
                }
            };
        }
        if let Ok(filter) = env::var("FRUITCUT_LOG") {
            config.logging.filter = filter;
        }

        Ok(())
    }

    /// Write a configuration back out as TOML
    pub fn save<P: AsRef<Path>>(config: &AppConfig, path: P) -> Result<(), ConfigurationError> {
        let content = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write file: {}", e)))
    }
}

fn override_parsed<T>(var: &str, target: &mut T) -> Result<(), ConfigurationError>
where
    T: FromStr,
{
    if let Ok(raw) = env::var(var) {
        *target = raw.parse().map_err(|_| ConfigurationError::InvalidValue {
            field: var.to_string(),
            value: raw.clone(),
            reason: format!("cannot parse as {}", std::any::type_name::<T>()),
        })?;
    }
    Ok(())
}
