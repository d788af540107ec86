//! Engine configuration file.
//!
//! One TOML table per component. Missing tables and keys fall back to the
//! component defaults:
//!
//! ```toml
//! database = "/var/lib/rps/rps.db"
//!
//! [factor]
//! periods = [5, 10, 20, 50, 120, 250]
//! save_recent_days = 5
//!
//! [pool]
//! fund_ratio_threshold = 5.0
//!
//! [signal]
//! min_history = 250
//!
//! [log]
//! level = "info"
//! format = "compact"
//! ```

use crate::logging::LogConfig;
use crate::pool::PoolConfig;
use rps_factors::FactorConfig;
use rps_signals::SignalConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or writing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML or has wrong value types
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be rendered
    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),

    /// A value is out of range
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue {
        /// Offending key
        key: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite database path; the binary picks a per-user default when unset
    pub database: Option<PathBuf>,
    /// Factor engine
    pub factor: FactorConfig,
    /// Pool maintainer
    pub pool: PoolConfig,
    /// Signal evaluator
    pub signal: SignalConfig,
    /// Logging
    pub log: LogConfig,
}

impl EngineConfig {
    /// Load and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check values the components cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.factor.sorted_periods().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "factor.periods",
                reason: "at least one positive period is required".to_string(),
            });
        }
        if self.factor.save_recent_days == 0 {
            return Err(ConfigError::InvalidValue {
                key: "factor.save_recent_days",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.pool.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "pool.name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.pool.fund_quarters == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pool.fund_quarters",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.signal.history_bars < self.signal.min_history {
            return Err(ConfigError::InvalidValue {
                key: "signal.history_bars",
                reason: format!(
                    "{} bars cannot satisfy min_history = {}",
                    self.signal.history_bars, self.signal.min_history
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;

    #[test]
    fn test_empty_file_is_default() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.factor.periods, vec![5, 10, 20, 50, 120, 250]);
        assert_eq!(config.pool.name, "core");
        assert_eq!(config.signal.min_history, 250);
    }

    #[test]
    fn test_partial_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            database = "/tmp/rps.db"

            [factor]
            periods = [20, 50]
            init_days = 730

            [pool]
            foreign_value_threshold = 5e7

            [log]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.database, Some(PathBuf::from("/tmp/rps.db")));
        assert_eq!(config.factor.periods, vec![20, 50]);
        assert_eq!(config.factor.init_days, Some(730));
        assert_eq!(config.factor.save_recent_days, 5);
        assert_eq!(config.pool.foreign_value_threshold, 5e7);
        assert_eq!(config.pool.fund_quarters, 3);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_invalid_values() {
        let err = EngineConfig::from_toml_str("[factor]\nperiods = [0]").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "factor.periods", .. }));

        let err = EngineConfig::from_toml_str("[signal]\nhistory_bars = 100").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "signal.history_bars", .. }));

        let err = EngineConfig::from_toml_str("[pool]\nname = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_render_round_trip() {
        let mut config = EngineConfig::default();
        config.signal.pool = "watch".to_string();
        let text = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }
}
