//! Consensus error types.
//!
//! Errors fall into two classes. Validation errors reject a single event
//! and leave the engine untouched. Fatal errors mean the engine can no
//! longer make sound progress; it halts and refuses further work.

use poset_kvdb::StorageError;
use poset_types::{Epoch, EventId, Frame, GasPowerLeft, Timestamp, ValidatorId};
use thiserror::Error;

/// Errors produced by the consensus engine.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Event belongs to a future epoch
    #[error("event {id} has epoch {epoch}, current epoch is {expected}")]
    WrongEpoch {
        /// Event ID
        id: EventId,
        /// Claimed epoch
        epoch: Epoch,
        /// Current epoch
        expected: Epoch,
    },

    /// Event creator is not in the current validator set
    #[error("event {id} created by unknown validator {creator}")]
    UnknownCreator {
        /// Event ID
        id: EventId,
        /// Claimed creator
        creator: ValidatorId,
    },

    /// Structurally broken event
    #[error("malformed event {id}: {reason}")]
    MalformedEvent {
        /// Event ID
        id: EventId,
        /// What is wrong
        reason: &'static str,
    },

    /// A parent was not processed before its child
    #[error("event {id} references unprocessed parent {parent}")]
    MissingParent {
        /// Event ID
        id: EventId,
        /// The unknown parent
        parent: EventId,
    },

    /// First event of a creator carries a wrong previous-epoch hash
    #[error("event {id} has wrong previous epoch hash")]
    WrongEpochHash {
        /// Event ID
        id: EventId,
    },

    /// Non-first event of a creator carries a previous-epoch hash
    #[error("event {id} must have zero previous epoch hash")]
    NonZeroEpochHash {
        /// Event ID
        id: EventId,
    },

    /// Event links to events of validators its self-parent saw forking
    #[error("event {id} links to cheaters observed by its self-parent")]
    CheatersObserved {
        /// Event ID
        id: EventId,
    },

    /// Claimed frame differs from the computed one
    #[error("event {id} claims frame {claimed}, computed {expected}")]
    WrongFrame {
        /// Event ID
        id: EventId,
        /// Claimed frame
        claimed: Frame,
        /// Computed frame
        expected: Frame,
    },

    /// Claimed root flag differs from the computed one
    #[error("event {id} claims is_root={claimed}, computed {expected}")]
    WrongIsRoot {
        /// Event ID
        id: EventId,
        /// Claimed flag
        claimed: bool,
        /// Computed flag
        expected: bool,
    },

    /// Claimed median time differs from the computed one
    #[error("event {id} claims median time {claimed}, computed {expected}")]
    WrongMedianTime {
        /// Event ID
        id: EventId,
        /// Claimed time
        claimed: Timestamp,
        /// Computed time
        expected: Timestamp,
    },

    /// Claimed gas power left differs from the computed one
    #[error("event {id} claims gas power left {claimed}, computed {expected}")]
    WrongGasPowerLeft {
        /// Event ID
        id: EventId,
        /// Claimed value
        claimed: GasPowerLeft,
        /// Computed value
        expected: GasPowerLeft,
    },

    /// Event uses more gas power than its creator has
    #[error("event {id} uses {used} gas power, available {available}")]
    InsufficientGasPower {
        /// Event ID
        id: EventId,
        /// Declared usage
        used: u64,
        /// Available gas power
        available: GasPowerLeft,
    },

    /// Consensus time queried for an event that is not confirmed
    #[error("event {0} is not confirmed in the current epoch")]
    EventNotConfirmed(EventId),

    /// Event or header missing from the event source
    #[error("event {0} not found")]
    EventNotFound(EventId),

    /// No genesis in storage
    #[error("genesis not found")]
    GenesisNotFound,

    /// Stored genesis differs from the supplied one
    #[error("genesis mismatch: stored {stored}, supplied {supplied}")]
    GenesisMismatch {
        /// Hash of the stored genesis
        stored: poset_types::H256,
        /// Hash of the supplied genesis
        supplied: poset_types::H256,
    },

    /// Election cannot converge: more than 1/3 of weight is Byzantine
    #[error("election of frame {frame} cannot converge: {reason}")]
    ElectionNonConvergence {
        /// Frame being decided
        frame: Frame,
        /// What went wrong
        reason: String,
    },

    /// Storage failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Stored record cannot be decoded or encoded
    #[error("codec error: {0}")]
    Codec(String),

    /// The engine halted on an earlier fatal error
    #[error("consensus halted after a fatal error")]
    Halted,
}

impl ConsensusError {
    /// Whether the error stops the engine.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConsensusError::EventNotFound(_)
                | ConsensusError::GenesisNotFound
                | ConsensusError::GenesisMismatch { .. }
                | ConsensusError::ElectionNonConvergence { .. }
                | ConsensusError::Storage(_)
                | ConsensusError::Codec(_)
                | ConsensusError::Halted
        )
    }

    /// Whether the error means the sender of the event misbehaved.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            ConsensusError::WrongFrame { .. }
                | ConsensusError::WrongIsRoot { .. }
                | ConsensusError::WrongMedianTime { .. }
                | ConsensusError::WrongGasPowerLeft { .. }
        )
    }
}

impl From<bincode::Error> for ConsensusError {
    fn from(err: bincode::Error) -> Self {
        ConsensusError::Codec(err.to_string())
    }
}

impl From<rlp::DecoderError> for ConsensusError {
    fn from(err: rlp::DecoderError) -> Self {
        ConsensusError::Codec(err.to_string())
    }
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let id = EventId::ZERO;
        assert!(!ConsensusError::CheatersObserved { id }.is_fatal());
        assert!(ConsensusError::WrongFrame {
            id,
            claimed: 2,
            expected: 1
        }
        .is_protocol_violation());
        assert!(ConsensusError::EventNotFound(id).is_fatal());
        assert!(ConsensusError::ElectionNonConvergence {
            frame: 3,
            reason: "all roots decided no".into()
        }
        .is_fatal());
        assert!(!ConsensusError::WrongEpochHash { id }.is_protocol_violation());
    }
}
