//! Configuration management for tuxlog

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::logging::Level;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory that receives log files and their backups
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Rotation threshold in whole megabytes (default: 5)
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,

    /// Compressed backups to retain per log directory (default: 10)
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,

    /// Minimum severity written to the sinks (default: info)
    #[serde(default = "default_min_level")]
    pub min_level: Level,
}

fn default_log_dir() -> PathBuf {
    logs_dir()
}

fn default_max_size_mb() -> u64 {
    5
}

fn default_max_backups() -> usize {
    10
}

fn default_min_level() -> Level {
    Level::Info
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            max_size_mb: default_max_size_mb(),
            max_backups: default_max_backups(),
            min_level: default_min_level(),
        }
    }
}

impl Config {
    /// Load configuration from file, or return default if not found
    pub fn load() -> Result<Self> {
        let path = config_file_path();
        if path.exists() {
            let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }
}

/// Get the base configuration directory (~/.tuxtechlab)
/// Falls back to ./.tuxtechlab if home directory cannot be determined
pub fn config_dir() -> PathBuf {
    try_config_dir().unwrap_or_else(|| PathBuf::from(".tuxtechlab"))
}

/// Try to get the base configuration directory, returning None if home dir is unavailable
pub fn try_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".tuxtechlab"))
}

/// Get the path to the config file
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the path to the default logs directory
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_size_mb, 5);
        assert_eq!(config.max_backups, 10);
        assert_eq!(config.min_level, Level::Info);
        assert!(config.log_dir.ends_with("logs"));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.max_size_mb, parsed.max_size_mb);
        assert_eq!(config.min_level, parsed.min_level);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml::from_str("max_backups = 3").unwrap();
        assert_eq!(parsed.max_backups, 3);
        assert_eq!(parsed.max_size_mb, 5);
        assert_eq!(parsed.min_level, Level::Info);
    }

    #[test]
    fn test_level_round_trips_lowercase() {
        let parsed: Config = toml::from_str("min_level = \"warning\"").unwrap();
        assert_eq!(parsed.min_level, Level::Warning);
    }

    #[test]
    fn test_config_dir_does_not_panic() {
        let dir = config_dir();
        assert!(dir.ends_with(".tuxtechlab"));
    }
}
