//! Collaborator interfaces.
//!
//! The engine reads events through an [`EventSource`] and reports its
//! output through [`ConsensusCallbacks`]. Neither is implemented here
//! beyond the in-memory [`MemoryEventSource`].

use parking_lot::RwLock;
use poset_types::{Block, Epoch, Event, EventHeader, EventId, Seq, ValidatorSet, H256};
use std::collections::HashMap;

/// Read-only lookup into the store of validated events.
pub trait EventSource: Send + Sync {
    /// Whether the event is known.
    fn has_event(&self, id: &EventId) -> bool;

    /// The full event.
    fn get_event(&self, id: &EventId) -> Option<Event>;

    /// The header of an event of `epoch`.
    fn get_event_header(&self, epoch: Epoch, id: &EventId) -> Option<EventHeader>;
}

/// What the application returns for an applied block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockResult {
    /// Application state hash after the block
    pub app_hash: H256,
    /// Seal the epoch after this block
    pub seal_epoch: bool,
}

/// Hooks through which the engine hands its decisions to the application.
pub trait ConsensusCallbacks {
    /// Applies a decided block.
    fn apply_block(&mut self, block: &Block) -> BlockResult;

    /// Validator set of `new_epoch`, called once when `old_epoch` is sealed.
    fn select_validators(&mut self, old_epoch: Epoch, new_epoch: Epoch) -> ValidatorSet;

    /// Admission policy for block inclusion.
    ///
    /// `seq_depth` is how far the event lies behind its creator's highest
    /// event confirmed by the same Atropos.
    fn is_event_allowed_into_block(&self, _header: &EventHeader, _seq_depth: Seq) -> bool {
        true
    }

    /// Called once for every newly confirmed event, cheaters included.
    fn on_event_confirmed(&mut self, _header: &EventHeader, _seq_depth: Seq) {}
}

/// An [`EventSource`] kept in memory.
#[derive(Debug, Default)]
pub struct MemoryEventSource {
    events: RwLock<HashMap<EventId, Event>>,
}

impl MemoryEventSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an event.
    pub fn add(&self, event: Event) {
        self.events.write().insert(event.id(), event);
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether the source is empty.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl EventSource for MemoryEventSource {
    fn has_event(&self, id: &EventId) -> bool {
        self.events.read().contains_key(id)
    }

    fn get_event(&self, id: &EventId) -> Option<Event> {
        self.events.read().get(id).cloned()
    }

    fn get_event_header(&self, epoch: Epoch, id: &EventId) -> Option<EventHeader> {
        self.events
            .read()
            .get(id)
            .filter(|e| e.header().epoch == epoch)
            .map(|e| e.header().clone())
    }
}
