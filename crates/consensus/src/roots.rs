//! Roots of the current epoch, indexed by frame.

use crate::error::{ConsensusError, ConsensusResult};
use crate::store::StoreTable;
use poset_kvdb::KvStore;
use poset_types::{EventId, Frame, ValidatorId};

const KEY_SIZE: usize = 4 + 4 + 32;

/// Position of a root: its frame and creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot {
    /// Frame of the root
    pub frame: Frame,
    /// Creator of the root
    pub validator: ValidatorId,
}

/// A root and its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootAndSlot {
    /// Root event
    pub id: EventId,
    /// Its slot
    pub slot: Slot,
}

/// Root index over an epoch table.
///
/// Keys are `frame | creator | id`, so the roots of a frame come back
/// ordered by creator and then by ID.
#[derive(Clone)]
pub struct RootStore {
    table: StoreTable,
}

impl RootStore {
    /// Wraps the roots table of an epoch.
    pub fn new(table: StoreTable) -> Self {
        Self { table }
    }

    /// Registers a root.
    pub fn add(&self, root: &RootAndSlot) -> ConsensusResult<()> {
        let mut key = Vec::with_capacity(KEY_SIZE);
        key.extend_from_slice(&root.slot.frame.to_be_bytes());
        key.extend_from_slice(&root.slot.validator.to_be_bytes());
        key.extend_from_slice(root.id.as_bytes());
        self.table.put(&key, &[])?;
        Ok(())
    }

    /// All roots of `frame`.
    pub fn frame_roots(&self, frame: Frame) -> ConsensusResult<Vec<RootAndSlot>> {
        self.table
            .iter_prefix(&frame.to_be_bytes())?
            .into_iter()
            .map(|(key, _)| decode_key(&key))
            .collect()
    }
}

fn decode_key(key: &[u8]) -> ConsensusResult<RootAndSlot> {
    if key.len() != KEY_SIZE {
        return Err(ConsensusError::Codec(format!(
            "root key has {} bytes, expected {}",
            key.len(),
            KEY_SIZE
        )));
    }
    let mut frame = [0u8; 4];
    frame.copy_from_slice(&key[..4]);
    let mut validator = [0u8; 4];
    validator.copy_from_slice(&key[4..8]);
    let id = EventId::from_slice(&key[8..]).map_err(|e| ConsensusError::Codec(e.to_string()))?;
    Ok(RootAndSlot {
        id,
        slot: Slot {
            frame: Frame::from_be_bytes(frame),
            validator: ValidatorId::from_be_bytes(validator),
        },
    })
}
