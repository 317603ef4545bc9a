//! DAG events.
//!
//! An [`EventHeader`] carries everything consensus looks at. The
//! consensus-derived fields (`frame`, `is_root`, `median_time`,
//! `prev_epoch_hash`, `gas_power_left`) are filled by the engine's
//! `prepare` for locally created events and re-checked for received ones.

use crate::event_id::EventId;
use crate::gas::GasPowerLeft;
use crate::idx::{Epoch, Frame, Lamport, Seq, Timestamp, ValidatorId};
use crate::H256;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Consensus-relevant part of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    /// Epoch the event belongs to
    pub epoch: Epoch,
    /// Per-creator sequence number, 1-based
    pub seq: Seq,
    /// Frame assigned by consensus
    pub frame: Frame,
    /// Whether the event is a root of its frame
    pub is_root: bool,
    /// Creator of the event
    pub creator: ValidatorId,
    /// Parent IDs; the self-parent, if any, comes first
    pub parents: Vec<EventId>,
    /// Lamport timestamp, `1 + max(parent lamport)`
    pub lamport: Lamport,
    /// Wall-clock time claimed by the creator
    pub creation_time: Timestamp,
    /// Weighted median of observed creation times
    pub median_time: Timestamp,
    /// Hash of the previous epoch summary on a creator's first event, zero otherwise
    pub prev_epoch_hash: H256,
    /// Gas power left after this event
    pub gas_power_left: GasPowerLeft,
    /// Gas power consumed by this event's payload
    pub gas_power_used: u64,
    /// Hash of the payload
    pub tx_hash: H256,
    /// Opaque extra data
    pub extra: Vec<u8>,
}

impl EventHeader {
    /// Creates a header with every consensus-derived field zeroed.
    pub fn new(epoch: Epoch, creator: ValidatorId, seq: Seq, parents: Vec<EventId>) -> Self {
        Self {
            epoch,
            seq,
            frame: 0,
            is_root: false,
            creator,
            parents,
            lamport: 0,
            creation_time: 0,
            median_time: 0,
            prev_epoch_hash: H256::ZERO,
            gas_power_left: GasPowerLeft::default(),
            gas_power_used: 0,
            tx_hash: H256::ZERO,
            extra: Vec::new(),
        }
    }

    /// The self-parent, present on every event but a creator's first.
    pub fn self_parent(&self) -> Option<&EventId> {
        if self.seq > 1 {
            self.parents.first()
        } else {
            None
        }
    }

    /// Whether `id` is this event's self-parent.
    pub fn is_self_parent(&self, id: &EventId) -> bool {
        self.self_parent() == Some(id)
    }

    /// Computes the event ID from every header field.
    pub fn calc_id(&self) -> EventId {
        let mut hasher = Keccak256::new();
        hasher.update(self.epoch.to_be_bytes());
        hasher.update(self.seq.to_be_bytes());
        hasher.update(self.frame.to_be_bytes());
        hasher.update([self.is_root as u8]);
        hasher.update(self.creator.to_be_bytes());
        hasher.update((self.parents.len() as u32).to_be_bytes());
        for parent in &self.parents {
            hasher.update(parent.as_bytes());
        }
        hasher.update(self.lamport.to_be_bytes());
        hasher.update(self.creation_time.to_be_bytes());
        hasher.update(self.median_time.to_be_bytes());
        hasher.update(self.prev_epoch_hash.as_bytes());
        for gas in &self.gas_power_left.gas {
            hasher.update(gas.to_be_bytes());
        }
        hasher.update(self.gas_power_used.to_be_bytes());
        hasher.update(self.tx_hash.as_bytes());
        hasher.update((self.extra.len() as u32).to_be_bytes());
        hasher.update(&self.extra);
        EventId::new(self.epoch, self.lamport, &H256::new(hasher.finalize().into()))
    }
}

/// A finalized event: header, payload and the ID derived from both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    header: EventHeader,
    transactions: Vec<Bytes>,
    id: EventId,
}

impl Event {
    /// Seals a header and its payload into an event.
    ///
    /// `tx_hash` is recomputed from the payload before the ID is derived.
    pub fn new(mut header: EventHeader, transactions: Vec<Bytes>) -> Self {
        header.tx_hash = transactions_hash(&transactions);
        let id = header.calc_id();
        Self {
            header,
            transactions,
            id,
        }
    }

    /// The event ID.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// The event header.
    pub fn header(&self) -> &EventHeader {
        &self.header
    }

    /// The payload.
    pub fn transactions(&self) -> &[Bytes] {
        &self.transactions
    }
}

/// Keccak256 over the length-prefixed payload items, zero for an empty payload.
pub fn transactions_hash(transactions: &[Bytes]) -> H256 {
    if transactions.is_empty() {
        return H256::ZERO;
    }
    let mut hasher = Keccak256::new();
    for tx in transactions {
        hasher.update((tx.len() as u32).to_be_bytes());
        hasher.update(tx);
    }
    H256::new(hasher.finalize().into())
}
