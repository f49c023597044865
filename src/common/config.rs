//! Configuration loading
//!
//! Reads a TOML file (or starts from defaults), applies environment variable
//! overrides and validates the result.

use crate::config::{BingoConfig, ExhaustedPoolPolicy, LogLevel, RoomSeed, StorageBackend};
use crate::errors::{BingoResult, ConfigurationError};
use std::env;
use std::path::Path;
use std::str::FromStr;

/// Configuration loader with environment variable support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and process environment
    pub fn load(&self) -> BingoResult<BingoConfig> {
        self.load_with(|key| env::var(key).ok())
    }

    /// Load configuration, resolving overrides through `lookup` instead of the
    /// process environment.
    pub fn load_with<F>(&self, lookup: F) -> BingoResult<BingoConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => BingoConfig::default(),
        };

        apply_env_overrides(&mut config, lookup)?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> BingoResult<BingoConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    /// Save configuration to file
    pub fn save(&self, config: &BingoConfig, path: &str) -> BingoResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

fn parse<T: FromStr>(key: &str, value: String, reason: &str) -> Result<T, ConfigurationError> {
    value.parse().map_err(|_| ConfigurationError::InvalidValue {
        field: key.to_string(),
        value,
        reason: reason.to_string(),
    })
}

/// Apply environment variable overrides.
///
/// `BINGO_*` variables map onto config fields. `PORT`/`SERVER_PORT`,
/// `APP_ENV`, `LOG_LEVEL` and `FRONTEND_URL` are honoured too since hosting
/// platforms set them.
pub fn apply_env_overrides<F>(config: &mut BingoConfig, lookup: F) -> Result<(), ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
{
    // API overrides, most specific last
    if let Some(host) = lookup("BINGO_API_HOST") {
        config.api.host = host;
    }
    for key in ["PORT", "SERVER_PORT", "BINGO_API_PORT"] {
        if let Some(port) = lookup(key) {
            config.api.port = parse(key, port, "Invalid port number")?;
        }
    }
    if let Some(origin) = lookup("FRONTEND_URL") {
        config.api.allowed_origins = vec![origin];
    }

    // Storage overrides
    if let Some(dir) = lookup("BINGO_DATA_DIR") {
        config.storage.data_directory = dir;
    }
    if let Some(backend) = lookup("BINGO_STORAGE_BACKEND") {
        config.storage.backend = match backend.to_ascii_lowercase().as_str() {
            "rocksdb" | "rocks_db" => StorageBackend::RocksDb,
            "memory" => StorageBackend::Memory,
            _ => {
                return Err(ConfigurationError::InvalidValue {
                    field: "BINGO_STORAGE_BACKEND".to_string(),
                    value: backend,
                    reason: "Expected rocksdb or memory".to_string(),
                })
            }
        };
    }

    // Game and scheduler overrides
    if let Some(min) = lookup("BINGO_MIN_PLAYERS") {
        config.game.min_players = parse("BINGO_MIN_PLAYERS", min, "Invalid player count")?;
    }
    if let Some(policy) = lookup("BINGO_EXHAUSTED_POOL_POLICY") {
        config.game.exhausted_pool_policy =
            parse::<ExhaustedPoolPolicy>("BINGO_EXHAUSTED_POOL_POLICY", policy, "Expected forfeit or refund")?;
    }
    if let Some(interval) = lookup("BINGO_DRAW_INTERVAL_MS") {
        config.scheduler.draw_interval_ms = parse("BINGO_DRAW_INTERVAL_MS", interval, "Invalid interval")?;
    }
    if let Some(enabled) = lookup("BINGO_SCHEDULER_ENABLED") {
        config.scheduler.enabled = parse("BINGO_SCHEDULER_ENABLED", enabled, "Invalid boolean value")?;
    }

    // Cache overrides
    if let Some(ttl) = lookup("BINGO_GAME_CACHE_TTL_SECS") {
        config.cache.game_ttl_secs = parse("BINGO_GAME_CACHE_TTL_SECS", ttl, "Invalid TTL")?;
    }
    if let Some(ttl) = lookup("BINGO_ROOM_CACHE_TTL_SECS") {
        config.cache.room_ttl_secs = parse("BINGO_ROOM_CACHE_TTL_SECS", ttl, "Invalid TTL")?;
    }

    // Logging overrides
    if let Some(app_env) = lookup("APP_ENV") {
        config.monitoring.json_logs = app_env.eq_ignore_ascii_case("production");
        config.monitoring.environment = app_env;
    }
    if let Some(level) = lookup("LOG_LEVEL") {
        config.monitoring.log_level = parse::<LogLevel>("LOG_LEVEL", level, "Unknown log level")?;
    }

    Ok(())
}

/// Builder pattern for creating configurations
pub struct ConfigBuilder {
    config: BingoConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: BingoConfig::default(),
        }
    }

    pub fn from_config(config: BingoConfig) -> Self {
        Self { config }
    }

    pub fn rooms(mut self, rooms: Vec<RoomSeed>) -> Self {
        self.config.rooms = rooms;
        self
    }

    pub fn min_players(mut self, min_players: usize) -> Self {
        self.config.game.min_players = min_players;
        self
    }

    pub fn exhausted_pool_policy(mut self, policy: ExhaustedPoolPolicy) -> Self {
        self.config.game.exhausted_pool_policy = policy;
        self
    }

    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.config.game.auto_start = auto_start;
        self
    }

    pub fn draw_seed(mut self, seed: u64) -> Self {
        self.config.game.draw_seed = Some(seed);
        self
    }

    pub fn memory_storage(mut self) -> Self {
        self.config.storage.backend = StorageBackend::Memory;
        self
    }

    pub fn data_directory(mut self, dir: impl Into<String>) -> Self {
        self.config.storage.backend = StorageBackend::RocksDb;
        self.config.storage.data_directory = dir.into();
        self
    }

    pub fn scheduler(mut self, enabled: bool, draw_interval_ms: u64) -> Self {
        self.config.scheduler.enabled = enabled;
        self.config.scheduler.draw_interval_ms = draw_interval_ms;
        self
    }

    pub fn build(self) -> BingoConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config(path: &str) -> BingoResult<()> {
    ConfigLoader::new().save(&BingoConfig::default(), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BingoError;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = ConfigLoader::new().load_with(env_of(&[])).unwrap();
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.game.exhausted_pool_policy, ExhaustedPoolPolicy::Forfeit);
    }

    #[test]
    fn test_env_overrides() {
        let config = ConfigLoader::new()
            .load_with(env_of(&[
                ("PORT", "5000"),
                ("APP_ENV", "production"),
                ("LOG_LEVEL", "debug"),
                ("BINGO_EXHAUSTED_POOL_POLICY", "refund"),
                ("BINGO_STORAGE_BACKEND", "memory"),
                ("FRONTEND_URL", "https://play.example.org"),
            ]))
            .unwrap();

        assert_eq!(config.api.port, 5000);
        assert!(config.monitoring.json_logs);
        assert!(config.is_production());
        assert_eq!(config.monitoring.log_level, LogLevel::Debug);
        assert_eq!(config.game.exhausted_pool_policy, ExhaustedPoolPolicy::Refund);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.api.allowed_origins, vec!["https://play.example.org".to_string()]);
    }

    #[test]
    fn test_specific_port_wins_over_platform_port() {
        let config = ConfigLoader::new()
            .load_with(env_of(&[("PORT", "5000"), ("BINGO_API_PORT", "7000")]))
            .unwrap();
        assert_eq!(config.api.port, 7000);
    }

    #[test]
    fn test_invalid_override_is_reported() {
        let err = ConfigLoader::new()
            .load_with(env_of(&[("BINGO_MIN_PLAYERS", "two")]))
            .unwrap_err();
        match err {
            BingoError::Configuration(ConfigurationError::InvalidValue { field, value, .. }) => {
                assert_eq!(field, "BINGO_MIN_PLAYERS");
                assert_eq!(value, "two");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_override_result_is_validated() {
        let result = ConfigLoader::new().load_with(env_of(&[("BINGO_MIN_PLAYERS", "1")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .min_players(3)
            .exhausted_pool_policy(ExhaustedPoolPolicy::Refund)
            .memory_storage()
            .draw_seed(11)
            .build();

        assert_eq!(config.game.min_players, 3);
        assert_eq!(config.game.draw_seed, Some(11));
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_config() -> BingoResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let original = ConfigBuilder::new()
            .exhausted_pool_policy(ExhaustedPoolPolicy::Refund)
            .draw_seed(3)
            .build();
        ConfigLoader::new().save(&original, path)?;

        let loaded = ConfigLoader::new().with_path(path).load_with(env_of(&[]))?;
        assert_eq!(loaded.api.port, original.api.port);
        assert_eq!(loaded.game.exhausted_pool_policy, ExhaustedPoolPolicy::Refund);
        assert_eq!(loaded.game.draw_seed, Some(3));
        assert_eq!(loaded.rooms, original.rooms);

        Ok(())
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() -> BingoResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(
            temp_file.path(),
            "[game]\npool_size = 75\npalette_count = 200\ncards_per_player = 2\nmin_players = 2\nauto_start = false\nexhausted_pool_policy = \"refund\"\n",
        )
        .unwrap();

        let loaded = ConfigLoader::new()
            .with_path(temp_file.path())
            .load_with(env_of(&[]))?;
        assert_eq!(loaded.game.cards_per_player, 2);
        assert!(!loaded.game.auto_start);
        assert_eq!(loaded.api.port, 8080);
        assert_eq!(loaded.rooms.len(), 3);
        Ok(())
    }
}
