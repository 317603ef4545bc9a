//! Blocks produced by frame decisions.

use crate::event_id::EventId;
use crate::idx::{BlockNumber, Frame, Timestamp, ValidatorId};
use serde::{Deserialize, Serialize};

/// A block: the ordered events confirmed by one Atropos.
///
/// Blocks are derived and handed to the application; the engine does not
/// persist them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block number, consecutive from genesis
    pub number: BlockNumber,
    /// Consensus time of the block
    pub timestamp: Timestamp,
    /// Frame whose decision produced the block
    pub frame: Frame,
    /// The deciding root
    pub atropos: EventId,
    /// Confirmed events in `(lamport, id)` order
    pub events: Vec<EventId>,
    /// Creators seen forking by the Atropos
    pub cheaters: Vec<ValidatorId>,
}

impl Block {
    /// Whether the block carries no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
