//! Configuration management with validation and defaults
//!
//! Centralized configuration for the engine, the draw scheduler, storage,
//! caching, the HTTP surface and logging.

use crate::common::types::{Amount, RoomId};
use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Complete engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BingoConfig {
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default = "default_rooms")]
    pub rooms: Vec<RoomSeed>,
}

impl Default for BingoConfig {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            scheduler: SchedulerConfig::default(),
            storage: StorageConfig::default(),
            cache: CacheConfig::default(),
            api: ApiConfig::default(),
            monitoring: MonitoringConfig::default(),
            rooms: default_rooms(),
        }
    }
}

/// What happens to the pot when the pool runs dry without a verified claim
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedPoolPolicy {
    /// Stakes stay with the house; no ledger credit is issued.
    #[default]
    Forfeit,
    /// Every player gets their stake back.
    Refund,
}

impl std::str::FromStr for ExhaustedPoolPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forfeit" => Ok(ExhaustedPoolPolicy::Forfeit),
            "refund" => Ok(ExhaustedPoolPolicy::Refund),
            other => Err(format!("unknown policy '{}'", other)),
        }
    }
}

/// Rules of a single game
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameConfig {
    /// Balls are numbered 1..=pool_size; one fifth of them per column.
    pub pool_size: u8,
    pub palette_count: u32,
    pub cards_per_player: usize,
    pub min_players: usize,
    /// Form a game as soon as a room's lobby reaches `min_players`.
    pub auto_start: bool,
    pub exhausted_pool_policy: ExhaustedPoolPolicy,
    /// Fixed seed for draws and card issuance (tests and replays only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            pool_size: 75,
            palette_count: 100,
            cards_per_player: 1,
            min_players: 2,
            auto_start: true,
            exhausted_pool_policy: ExhaustedPoolPolicy::Forfeit,
            draw_seed: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub draw_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            draw_interval_ms: 3_000,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    RocksDb,
    Memory,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CompressionType {
    None,
    Snappy,
    Lz4,
    Zstd,
}

/// Storage configuration with optimization settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: String,
    pub write_buffer_size_mb: usize,
    pub compression_type: CompressionType,
    /// Whether to clear the database on startup (testing only!)
    pub clear_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::RocksDb,
            data_directory: "./DB/bingo_data".to_string(),
            write_buffer_size_mb: 64,
            compression_type: CompressionType::Lz4,
            clear_on_start: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    pub game_ttl_secs: u64,
    pub room_ttl_secs: u64,
    pub capacity: usize,
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            game_ttl_secs: 7_200,
            room_ttl_secs: 600,
            capacity: 10_000,
            cleanup_interval_secs: 60,
        }
    }
}

/// API server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: LogLevel,
    pub json_logs: bool,
    pub environment: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            environment: "development".to_string(),
        }
    }
}

/// A room created at startup when the store holds none
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSeed {
    pub id: RoomId,
    pub name: String,
    pub stake_amount: Amount,
    pub max_players: usize,
}

fn default_rooms() -> Vec<RoomSeed> {
    vec![
        RoomSeed {
            id: "bronze".to_string(),
            name: "Bronze".to_string(),
            stake_amount: 10,
            max_players: 20,
        },
        RoomSeed {
            id: "silver".to_string(),
            name: "Silver".to_string(),
            stake_amount: 50,
            max_players: 20,
        },
        RoomSeed {
            id: "gold".to_string(),
            name: "Gold".to_string(),
            stake_amount: 100,
            max_players: 10,
        },
    ]
}

impl BingoConfig {
    /// Verbose logging and a separate data directory
    pub fn development() -> Self {
        Self {
            storage: StorageConfig {
                data_directory: "./DB/bingo_dev".to_string(),
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Debug,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create configuration for production deployment with persistence
    pub fn production() -> Self {
        Self {
            storage: StorageConfig {
                write_buffer_size_mb: 128,
                clear_on_start: false, // Production: preserve balances and games
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Info,
                json_logs: true,
                environment: "production".to_string(),
            },
            ..Default::default()
        }
    }

    /// In-memory store, fixed seed and no background draws
    pub fn testing() -> Self {
        Self {
            game: GameConfig {
                draw_seed: Some(7),
                ..Default::default()
            },
            scheduler: SchedulerConfig {
                enabled: false,
                ..Default::default()
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                clear_on_start: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn is_production(&self) -> bool {
        self.monitoring.environment.eq_ignore_ascii_case("production")
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let game = &self.game;
        if game.pool_size < 25 || game.pool_size % 5 != 0 {
            return Err(invalid(
                "game.pool_size",
                game.pool_size,
                "must be a multiple of 5 and at least 25",
            ));
        }
        if game.palette_count == 0 {
            return Err(invalid("game.palette_count", game.palette_count, "must be > 0"));
        }
        if game.cards_per_player == 0 {
            return Err(invalid("game.cards_per_player", game.cards_per_player, "must be > 0"));
        }
        if game.min_players < 2 {
            return Err(invalid("game.min_players", game.min_players, "a game needs at least two players"));
        }

        if self.scheduler.enabled && self.scheduler.draw_interval_ms == 0 {
            return Err(invalid(
                "scheduler.draw_interval_ms",
                self.scheduler.draw_interval_ms,
                "must be > 0 when the scheduler is enabled",
            ));
        }

        if self.storage.backend == StorageBackend::RocksDb && self.storage.data_directory.is_empty() {
            return Err(ConfigurationError::MissingRequired("storage.data_directory".to_string()));
        }

        if self.cache.capacity == 0 {
            return Err(invalid("cache.capacity", self.cache.capacity, "must be > 0"));
        }

        if self.api.port == 0 {
            return Err(invalid("api.port", self.api.port, "port cannot be zero"));
        }

        let mut seen = HashSet::new();
        for room in &self.rooms {
            if !seen.insert(room.id.as_str()) {
                return Err(invalid("rooms.id", &room.id, "room ids must be unique"));
            }
            if room.stake_amount <= 0 {
                return Err(invalid("rooms.stake_amount", room.stake_amount, "stake must be > 0"));
            }
            if room.stake_amount.checked_mul(room.max_players as Amount).is_none() {
                return Err(invalid("rooms.stake_amount", room.stake_amount, "pot of a full room overflows"));
            }
            if room.max_players < game.min_players {
                return Err(ConfigurationError::ValidationFailed(format!(
                    "room {} holds {} players but games need {}",
                    room.id, room.max_players, game.min_players
                )));
            }
        }

        let seats: usize = self.rooms.iter().map(|r| r.max_players).max().unwrap_or(0);
        if seats * game.cards_per_player > game.palette_count as usize {
            return Err(ConfigurationError::ValidationFailed(format!(
                "a full room needs {} cards but the catalog holds {}",
                seats * game.cards_per_player,
                game.palette_count
            )));
        }

        Ok(())
    }

    pub fn draw_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler.draw_interval_ms)
    }

    pub fn game_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.game_ttl_secs)
    }

    pub fn room_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.room_ttl_secs)
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BingoConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.game.pool_size, 75);
        assert_eq!(config.rooms.len(), 3);
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(BingoConfig::development().validate().is_ok());
        assert!(BingoConfig::production().validate().is_ok());
        assert!(BingoConfig::testing().validate().is_ok());
        assert!(BingoConfig::production().is_production());
        assert!(!BingoConfig::testing().is_production());
    }

    #[test]
    fn test_pool_size_must_split_into_columns() {
        let mut config = BingoConfig::default();
        config.game.pool_size = 74;
        assert!(config.validate().is_err());

        config.game.pool_size = 20;
        assert!(config.validate().is_err());

        config.game.pool_size = 90;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_single_player_games_are_rejected() {
        let mut config = BingoConfig::default();
        config.game.min_players = 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_room_seeds_are_checked() {
        let mut config = BingoConfig::development();
        config.rooms[0].stake_amount = 0;
        assert!(config.validate().is_err());

        let mut config = BingoConfig::development();
        config.rooms[1].id = config.rooms[0].id.clone();
        assert!(config.validate().is_err());

        let mut config = BingoConfig::development();
        config.game.palette_count = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_policy_and_level_parsing() {
        assert_eq!("Refund".parse::<ExhaustedPoolPolicy>(), Ok(ExhaustedPoolPolicy::Refund));
        assert!("house".parse::<ExhaustedPoolPolicy>().is_err());
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
    }

    #[test]
    fn test_duration_conversions() {
        let config = BingoConfig::default();
        assert_eq!(config.draw_interval(), Duration::from_millis(3_000));
        assert_eq!(config.game_cache_ttl(), Duration::from_secs(7_200));
        assert_eq!(config.room_cache_ttl(), Duration::from_secs(600));
    }
}
