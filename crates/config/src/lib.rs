//! # Poset Configuration
//!
//! Configuration parsing and genesis handling for the Poset consensus engine.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use poset_config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Path::new("poset.toml"))?;
//! let validators = config.genesis.validator_set()?;
//! println!("quorum weight: {}", validators.quorum());
//! ```
//!
//! ## Configuration Sections
//!
//! - `[consensus]` - DAG limits (`max_parents`)
//! - `[consensus.gas_power.short]`, `[consensus.gas_power.long]` - gas power windows
//! - `[genesis]` - first epoch, genesis time, state hash and `validators = [{ id, weight }]`
//! - `[logging]` - log level and format

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod config;
mod error;
mod genesis;

pub use config::*;
pub use error::*;
pub use genesis::*;
