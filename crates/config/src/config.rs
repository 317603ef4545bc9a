//! Main configuration module
//!
//! One TOML file holds the consensus parameters, the genesis and the
//! logging settings of a node.

use crate::error::{ConfigError, ConfigResult};
use crate::genesis::GenesisConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Main configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Consensus parameters
    #[serde(default)]
    pub consensus: ConsensusConfig,

    /// Genesis of the network
    #[serde(default)]
    pub genesis: GenesisConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// The configuration is validated before it is returned.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use poset_config::Config;
    /// use std::path::Path;
    ///
    /// let config = Config::load(Path::new("poset.toml"))?;
    /// ```
    pub fn load(path: &Path) -> ConfigResult<Self> {
        info!(path = %path.display(), "loading configuration");

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content)?;

        debug!("configuration parsed, validating");
        config.validate()?;

        info!(
            validators = config.genesis.validators.len(),
            epoch = config.genesis.epoch,
            max_parents = config.consensus.max_parents,
            "configuration loaded"
        );

        Ok(config)
    }

    /// Load configuration from a TOML string.
    ///
    /// Useful for testing or when configuration is provided as a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as TOML.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.consensus.validate()?;
        self.genesis.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

// =============================================================================
// Consensus Configuration
// =============================================================================

/// Consensus engine parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Maximum number of parents of an event, self-parent included
    #[serde(default = "default_max_parents")]
    pub max_parents: usize,

    /// Gas power windows
    #[serde(default)]
    pub gas_power: GasPowerConfig,
}

fn default_max_parents() -> usize {
    3
}

impl ConsensusConfig {
    /// Validate the consensus parameters.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_parents < 2 {
            return Err(ConfigError::InvalidMaxParents(self.max_parents));
        }
        self.gas_power.short.validate("short")?;
        self.gas_power.long.validate("long")?;
        Ok(())
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            max_parents: default_max_parents(),
            gas_power: GasPowerConfig::default(),
        }
    }
}

// =============================================================================
// Gas Power Configuration
// =============================================================================

/// Both gas power windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPowerConfig {
    /// Short-term window: absorbs bursts
    #[serde(default = "GasPowerRules::default_short")]
    pub short: GasPowerRules,

    /// Long-term window: bounds the sustained rate
    #[serde(default = "GasPowerRules::default_long")]
    pub long: GasPowerRules,
}

impl Default for GasPowerConfig {
    fn default() -> Self {
        Self {
            short: GasPowerRules::default_short(),
            long: GasPowerRules::default_long(),
        }
    }
}

/// Allocation rules of one gas power window.
///
/// The network-wide allocation is split between validators in proportion
/// to their weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPowerRules {
    /// Gas allocated per hour to the whole validator set
    pub alloc_per_hour: u64,

    /// Longest period, in seconds, a validator may accumulate gas for
    pub max_alloc_period_secs: u64,

    /// Period, in seconds, of allocation granted at the start of an epoch
    pub startup_alloc_period_secs: u64,

    /// Lower bound of the startup allocation
    pub min_startup_gas: u64,
}

impl GasPowerRules {
    /// Default short-term window.
    pub fn default_short() -> Self {
        Self {
            alloc_per_hour: 10_000_000_000, // 10G gas/h
            max_alloc_period_secs: 5 * 60,  // 5 minutes
            startup_alloc_period_secs: 5,
            min_startup_gas: 1_000_000,
        }
    }

    /// Default long-term window.
    pub fn default_long() -> Self {
        Self {
            alloc_per_hour: 5_000_000_000, // 5G gas/h
            max_alloc_period_secs: 60 * 60, // 1 hour
            startup_alloc_period_secs: 60,
            min_startup_gas: 1_000_000,
        }
    }

    /// Validate the window.
    pub fn validate(&self, window: &'static str) -> ConfigResult<()> {
        if self.alloc_per_hour == 0 {
            return Err(ConfigError::InvalidGasPowerRules {
                window,
                reason: "alloc_per_hour must be positive",
            });
        }
        if self.max_alloc_period_secs == 0 {
            return Err(ConfigError::InvalidGasPowerRules {
                window,
                reason: "max_alloc_period_secs must be positive",
            });
        }
        if self.startup_alloc_period_secs > self.max_alloc_period_secs {
            return Err(ConfigError::InvalidGasPowerRules {
                window,
                reason: "startup_alloc_period_secs exceeds max_alloc_period_secs",
            });
        }
        Ok(())
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, compact, json)
    pub format: String,
}

impl LoggingConfig {
    /// Validate level and format names.
    pub fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.level.clone()));
        }

        let valid_formats = ["text", "compact", "json"];
        if !valid_formats.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogFormat(self.format.clone()));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
[consensus]
max_parents = 5

[consensus.gas_power.short]
alloc_per_hour = 3600
max_alloc_period_secs = 10
startup_alloc_period_secs = 1
min_startup_gas = 7

[genesis]
epoch = 1
time = 1000
state_hash = "0x0000000000000000000000000000000000000000000000000000000000000001"
validators = [
    { id = 1, weight = 10 },
    { id = 2, weight = 20 },
]

[logging]
level = "debug"
format = "json"
"#;

    #[test]
    fn test_parse_example() {
        let config = Config::from_str(EXAMPLE).unwrap();
        assert_eq!(config.consensus.max_parents, 5);
        assert_eq!(config.consensus.gas_power.short.alloc_per_hour, 3600);
        assert_eq!(config.consensus.gas_power.long, GasPowerRules::default_long());
        assert_eq!(config.genesis.validators.len(), 2);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_defaults_need_genesis_validators() {
        assert!(matches!(
            Config::default().validate(),
            Err(ConfigError::NoValidators)
        ));
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_parents = EXAMPLE.replace("max_parents = 5", "max_parents = 1");
        assert!(matches!(
            Config::from_str(&bad_parents),
            Err(ConfigError::InvalidMaxParents(1))
        ));

        let bad_level = EXAMPLE.replace("level = \"debug\"", "level = \"loud\"");
        assert!(matches!(
            Config::from_str(&bad_level),
            Err(ConfigError::InvalidLogLevel(_))
        ));

        let bad_gas = EXAMPLE.replace("alloc_per_hour = 3600", "alloc_per_hour = 0");
        assert!(matches!(
            Config::from_str(&bad_gas),
            Err(ConfigError::InvalidGasPowerRules { window: "short", .. })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poset.toml");
        let config = Config::from_str(EXAMPLE).unwrap();
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }
}
