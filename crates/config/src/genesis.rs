//! Genesis configuration
//!
//! The genesis fixes the first epoch of a network: its number, its start
//! time, the initial application state hash and the validator set.

use crate::error::{ConfigError, ConfigResult};
use poset_types::{Epoch, Timestamp, Validator, ValidatorId, ValidatorSet, Weight, H256};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Genesis configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// First epoch number
    #[serde(default = "default_epoch")]
    pub epoch: Epoch,

    /// Genesis time, unix nanoseconds
    #[serde(default)]
    pub time: Timestamp,

    /// Initial application state hash
    #[serde(default)]
    pub state_hash: H256,

    /// Initial validators
    #[serde(default)]
    pub validators: Vec<GenesisValidator>,
}

fn default_epoch() -> Epoch {
    1
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            epoch: default_epoch(),
            time: 0,
            state_hash: H256::ZERO,
            validators: Vec::new(),
        }
    }
}

impl GenesisConfig {
    /// Genesis with `n` validators of weight 1, IDs `1..=n`.
    pub fn with_equal_validators(n: u32) -> Self {
        Self {
            validators: (1..=n).map(|id| GenesisValidator { id, weight: 1 }).collect(),
            ..Default::default()
        }
    }

    /// Load genesis configuration from a JSON file.
    ///
    /// This is an alternative to embedding genesis in the TOML config,
    /// useful for sharing genesis state across multiple nodes.
    pub fn load_json(path: &Path) -> ConfigResult<Self> {
        info!(path = %path.display(), "loading genesis from JSON file");

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let genesis: GenesisConfig = serde_json::from_str(&content)?;
        genesis.validate()?;
        Ok(genesis)
    }

    /// Save genesis configuration to a JSON file.
    pub fn save_json(&self, path: &Path) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Validate the genesis configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        debug!("validating genesis configuration");

        if self.epoch == 0 {
            return Err(ConfigError::InvalidEpoch);
        }
        if self.validators.is_empty() {
            return Err(ConfigError::NoValidators);
        }

        let mut seen = HashSet::new();
        for validator in &self.validators {
            if validator.weight == 0 {
                return Err(ConfigError::ZeroWeight(validator.id));
            }
            if !seen.insert(validator.id) {
                return Err(ConfigError::DuplicateValidator(validator.id));
            }
        }

        Ok(())
    }

    /// The genesis validator set.
    pub fn validator_set(&self) -> ConfigResult<ValidatorSet> {
        self.validate()?;
        ValidatorSet::new(
            self.validators
                .iter()
                .map(|v| Validator::new(v.id, v.weight))
                .collect(),
        )
        .map_err(|_| ConfigError::NoValidators)
    }
}

/// A genesis validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    /// Validator ID
    pub id: ValidatorId,
    /// Voting weight
    pub weight: Weight,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_validators() {
        let genesis = GenesisConfig::with_equal_validators(5);
        let set = genesis.validator_set().unwrap();
        assert_eq!(set.len(), 5);
        assert_eq!(set.quorum(), 4);
    }

    #[test]
    fn test_validate_rejects_duplicates_and_zero_weight() {
        let mut genesis = GenesisConfig::with_equal_validators(2);
        genesis.validators.push(GenesisValidator { id: 1, weight: 3 });
        assert!(matches!(
            genesis.validate(),
            Err(ConfigError::DuplicateValidator(1))
        ));

        let mut genesis = GenesisConfig::with_equal_validators(2);
        genesis.validators[0].weight = 0;
        assert!(matches!(genesis.validate(), Err(ConfigError::ZeroWeight(1))));

        let mut genesis = GenesisConfig::with_equal_validators(2);
        genesis.epoch = 0;
        assert!(matches!(genesis.validate(), Err(ConfigError::InvalidEpoch)));
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis.json");
        let mut genesis = GenesisConfig::with_equal_validators(3);
        genesis.time = 42;
        genesis.state_hash = H256::keccak256(b"state");

        genesis.save_json(&path).unwrap();
        assert_eq!(GenesisConfig::load_json(&path).unwrap(), genesis);
    }
}
