//! Configuration for keyjitter.

use crate::engine::{is_valid_bin_rate, DEFAULT_BIN_RATE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bin rate used when the command line does not specify one
    pub default_bin_rate: u32,

    /// Whether exported reports are pretty-printed
    pub pretty_export: bool,

    /// Default log filter when RUST_LOG is not set
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_bin_rate: DEFAULT_BIN_RATE,
            pretty_export: true,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("keyjitter")
            .join("config.json")
    }

    /// The configured bin rate, falling back to the built-in default if
    /// the stored value is not a valid rate.
    pub fn effective_bin_rate(&self) -> u32 {
        if is_valid_bin_rate(self.default_bin_rate) {
            self.default_bin_rate
        } else {
            warn!(
                bin_rate = self.default_bin_rate,
                "configured bin rate is invalid, using default"
            );
            DEFAULT_BIN_RATE
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_bin_rate, DEFAULT_BIN_RATE);
        assert!(config.pretty_export);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_effective_bin_rate_falls_back() {
        let mut config = Config::default();
        config.default_bin_rate = 1_000;
        assert_eq!(config.effective_bin_rate(), 1_000);

        config.default_bin_rate = 1_001;
        assert_eq!(config.effective_bin_rate(), DEFAULT_BIN_RATE);
    }

    #[test]
    fn test_config_roundtrip_through_json() {
        let config = Config {
            default_bin_rate: 2_000,
            pretty_export: false,
            log_filter: "debug".to_string(),
        };
        let json = serde_json::to_string(&config).expect("serialize");
        let parsed: Config = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed.default_bin_rate, 2_000);
        assert!(!parsed.pretty_export);
        assert_eq!(parsed.log_filter, "debug");
    }
}
