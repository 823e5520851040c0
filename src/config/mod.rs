//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calculate::AggregationOptions;
use crate::export::OutputLayout;
use crate::models::{PartitionBy, RankId};
use crate::storage::WindowFilter;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Which store matches are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Jsonl,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,

    /// SQLite database file, or the data lake directory for `jsonl`
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,

    /// Rows fetched per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/brawl_stats.sqlite")
}

fn default_batch_size() -> usize {
    100_000
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
            batch_size: default_batch_size(),
        }
    }
}

/// Statistics window and estimator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Days of match history included
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Lowest rank tier included
    #[serde(default = "default_min_rank")]
    pub min_rank: u32,

    #[serde(default = "default_confidence")]
    pub confidence: f64,

    /// Offset of the clock match group ids are dated in
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,

    #[serde(default)]
    pub partition_by: PartitionBy,

    #[serde(default)]
    pub win_rate_min_games: u64,

    #[serde(default)]
    pub pair_min_games: u64,

    #[serde(default)]
    pub trio_min_games: u64,

    #[serde(default = "default_three_vs_three_min_games")]
    pub three_vs_three_min_games: u64,
}

fn default_retention_days() -> u32 {
    30
}

fn default_min_rank() -> u32 {
    4
}

fn default_confidence() -> f64 {
    0.95
}

fn default_utc_offset_hours() -> i32 {
    9
}

fn default_three_vs_three_min_games() -> u64 {
    4
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            min_rank: default_min_rank(),
            confidence: default_confidence(),
            utc_offset_hours: default_utc_offset_hours(),
            partition_by: PartitionBy::default(),
            win_rate_min_games: 0,
            pair_min_games: 0,
            trio_min_games: 0,
            three_vs_three_min_games: default_three_vs_three_min_games(),
        }
    }
}

impl StatsConfig {
    pub fn min_rank(&self) -> RankId {
        RankId(self.min_rank)
    }

    /// The match group window ending at `now`: ids dated on or after
    /// `now - retention_days` in the configured offset.
    pub fn window(&self, now: DateTime<Utc>) -> Result<WindowFilter, ConfigError> {
        let offset = FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "UTC offset out of range: {}",
                self.utc_offset_hours
            ))
        })?;
        let local = now.with_timezone(&offset);
        let since = local - Duration::days(i64::from(self.retention_days));
        Ok(WindowFilter::new(
            since.format("%Y%m%d").to_string(),
            self.min_rank(),
        ))
    }

    pub fn options(&self, min_games: u64) -> AggregationOptions {
        AggregationOptions::new(self.confidence, min_games)
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_root")]
    pub root: PathBuf,

    #[serde(default = "default_win_rate_filename")]
    pub win_rate_filename: String,

    #[serde(default = "default_star_rate_filename")]
    pub star_rate_filename: String,

    #[serde(default = "default_rank_match_count_filename")]
    pub rank_match_count_filename: String,

    #[serde(default = "default_pair_dir_name")]
    pub pair_dir_name: String,

    #[serde(default = "default_trio_dir_name")]
    pub trio_dir_name: String,

    #[serde(default = "default_three_vs_three_dir_name")]
    pub three_vs_three_dir_name: String,
}

fn default_output_root() -> PathBuf {
    PathBuf::from("./data/output")
}

fn default_win_rate_filename() -> String {
    "win_rates.json".to_string()
}

fn default_star_rate_filename() -> String {
    "star_rates.json".to_string()
}

fn default_rank_match_count_filename() -> String {
    "rank_match_counts.json".to_string()
}

fn default_pair_dir_name() -> String {
    "pair_stats".to_string()
}

fn default_trio_dir_name() -> String {
    "trio_stats".to_string()
}

fn default_three_vs_three_dir_name() -> String {
    "three_vs_three_stats".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_output_root(),
            win_rate_filename: default_win_rate_filename(),
            star_rate_filename: default_star_rate_filename(),
            rank_match_count_filename: default_rank_match_count_filename(),
            pair_dir_name: default_pair_dir_name(),
            trio_dir_name: default_trio_dir_name(),
            three_vs_three_dir_name: default_three_vs_three_dir_name(),
        }
    }
}

impl OutputConfig {
    pub fn layout(&self) -> OutputLayout {
        OutputLayout {
            win_rates: PathBuf::from(&self.win_rate_filename),
            star_rates: PathBuf::from(&self.star_rate_filename),
            rank_match_counts: PathBuf::from(&self.rank_match_count_filename),
            pair_dir: PathBuf::from(&self.pair_dir_name),
            trio_dir: PathBuf::from(&self.trio_dir_name),
            three_vs_three_dir: PathBuf::from(&self.three_vs_three_dir_name),
        }
    }

    fn names(&self) -> [(&'static str, &str); 6] {
        [
            ("win_rate_filename", &self.win_rate_filename),
            ("star_rate_filename", &self.star_rate_filename),
            ("rank_match_count_filename", &self.rank_match_count_filename),
            ("pair_dir_name", &self.pair_dir_name),
            ("trio_dir_name", &self.trio_dir_name),
            ("three_vs_three_dir_name", &self.three_vs_three_dir_name),
        ]
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "*".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            storage: StorageSettings::default(),
            stats: StatsConfig::default(),
            output: OutputConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::ValidationError(format!("{} is not a valid number: {:?}", key, value))
    })
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`AppConfig::from_file`], but a missing file yields the defaults.
    /// The flag is `true` when the file was found.
    pub fn load_or_default(path: &Path) -> Result<(Self, bool), ConfigError> {
        if path.exists() {
            Ok((Self::from_file(path)?, true))
        } else {
            Ok((Self::default(), false))
        }
    }

    /// Apply `DATA_RETENTION_DAYS`, `MIN_RANK_ID` and `CONFIDENCE_LEVEL`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("DATA_RETENTION_DAYS") {
            self.stats.retention_days = parse_env("DATA_RETENTION_DAYS", &value)?;
        }
        if let Some(value) = lookup("MIN_RANK_ID") {
            self.stats.min_rank = parse_env("MIN_RANK_ID", &value)?;
        }
        if let Some(value) = lookup("CONFIDENCE_LEVEL") {
            self.stats.confidence = parse_env("CONFIDENCE_LEVEL", &value)?;
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.stats.confidence > 0.0 && self.stats.confidence < 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "Confidence must lie strictly between 0 and 1, got {}",
                self.stats.confidence
            )));
        }

        if !(-23..=23).contains(&self.stats.utc_offset_hours) {
            return Err(ConfigError::ValidationError(format!(
                "UTC offset must be within -23..=23 hours, got {}",
                self.stats.utc_offset_hours
            )));
        }

        if self.storage.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "Storage batch size must be greater than 0".to_string(),
            ));
        }

        for (field, name) in self.output.names() {
            let path = Path::new(name);
            let plain = path.components().count() == 1
                && matches!(
                    path.components().next(),
                    Some(std::path::Component::Normal(_))
                );
            if !plain {
                return Err(ConfigError::ValidationError(format!(
                    "output.{} must be a plain file or directory name, got {:?}",
                    field, name
                )));
            }
        }

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "Server port must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.batch_size, 100_000);
        assert_eq!(config.stats.retention_days, 30);
        assert_eq!(config.stats.min_rank, 4);
        assert_eq!(config.stats.three_vs_three_min_games, 4);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_config_validation_ok() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_bad_confidence() {
        let mut config = AppConfig::default();
        config.stats.confidence = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_output_names() {
        let mut config = AppConfig::default();
        config.output.trio_dir_name = "../trios".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[storage]
backend = "jsonl"
path = "/srv/lake"

[stats]
partition_by = "map-and-rank"
min_rank = 6
"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Jsonl);
        assert_eq!(config.storage.path, PathBuf::from("/srv/lake"));
        assert_eq!(config.storage.batch_size, 100_000);
        assert_eq!(config.stats.partition_by, PartitionBy::MapAndRank);
        assert_eq!(config.stats.min_rank, 6);
        assert_eq!(config.stats.confidence, 0.95);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let (config, found) = AppConfig::load_or_default(&temp_dir.path().join("nope.toml")).unwrap();
        assert!(!found);
        assert_eq!(config.stats.retention_days, 30);

        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[stats]\nretention_days = 7\n").unwrap();
        let (config, found) = AppConfig::load_or_default(&path).unwrap();
        assert!(found);
        assert_eq!(config.stats.retention_days, 7);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DATA_RETENTION_DAYS", "7"),
            ("MIN_RANK_ID", "10"),
            ("CONFIDENCE_LEVEL", "0.9"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.stats.retention_days, 7);
        assert_eq!(config.stats.min_rank, 10);
        assert_eq!(config.stats.confidence, 0.9);
    }

    #[test]
    fn test_env_override_must_be_numeric() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(|k| (k == "MIN_RANK_ID").then(|| "diamond".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_window_uses_offset_day() {
        let stats = StatsConfig::default();
        // 2025-08-31 20:00 UTC is already 2025-09-01 in UTC+9
        let now = Utc.with_ymd_and_hms(2025, 8, 31, 20, 0, 0).unwrap();
        let window = stats.window(now).unwrap();
        assert_eq!(window.since, "20250802");
        assert_eq!(window.min_rank, RankId(4));

        let utc = StatsConfig {
            utc_offset_hours: 0,
            ..StatsConfig::default()
        };
        assert_eq!(utc.window(now).unwrap().since, "20250801");
    }

    #[test]
    fn test_layout_from_output_config() {
        let mut output = OutputConfig::default();
        output.trio_dir_name = "trios".to_string();
        let layout = output.layout();
        assert_eq!(layout.trio_dir, PathBuf::from("trios"));
        assert_eq!(layout.win_rates, PathBuf::from("win_rates.json"));
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();

        // Should be parseable
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.storage.path, parsed.storage.path);
        assert_eq!(config.stats.partition_by, parsed.stats.partition_by);
    }
}
