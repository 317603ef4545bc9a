//! # Poset Types
//!
//! Core type definitions shared by the Poset consensus engine.
//!
//! - [`H256`] - 32-byte Keccak256 hashes
//! - [`EventId`], [`EventHeader`], [`Event`] - DAG events
//! - [`Block`] - the output of a decided frame
//! - [`ValidatorSet`] and [`WeightCounter`] - weighted validator sets
//! - [`GasPowerLeft`] - two-window gas power counters
//!
//! ## Example
//!
//! ```rust
//! use poset_types::{EventHeader, Event, ValidatorSet};
//!
//! let validators = ValidatorSet::equal(5).unwrap();
//! assert_eq!(validators.quorum(), 4);
//!
//! let mut header = EventHeader::new(1, 1, 1, vec![]);
//! header.lamport = 1;
//! let event = Event::new(header, vec![]);
//! assert_eq!(event.id().lamport(), 1);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod block;
pub mod event;
pub mod event_id;
pub mod gas;
pub mod hash;
pub mod idx;
pub mod validators;

// Re-export main types at crate root
pub use block::Block;
pub use event::{transactions_hash, Event, EventHeader};
pub use event_id::EventId;
pub use gas::{GasPowerLeft, GAS_POWER_WINDOWS, LONG_TERM_GAS, SHORT_TERM_GAS};
pub use hash::H256;
pub use idx::{
    BlockNumber, Epoch, Frame, Lamport, Seq, Timestamp, ValidatorId, Weight, FIRST_FRAME, HOUR,
    SECOND,
};
pub use validators::{Validator, ValidatorSet, WeightCounter};

/// Result type alias for Poset types operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when working with Poset types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Invalid length for a fixed-size type
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid hash format
    #[error("invalid hash format: {0}")]
    InvalidHash(String),

    /// Invalid validator set
    #[error("invalid validator set: {0}")]
    InvalidValidatorSet(String),
}
