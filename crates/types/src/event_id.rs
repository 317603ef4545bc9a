//! Event identifiers.
//!
//! An [`EventId`] packs the epoch and Lamport timestamp in front of a
//! truncated header digest, so that byte-wise comparison of IDs orders
//! events by epoch first and Lamport time second.

use crate::idx::{Epoch, Lamport};
use crate::{Error, Result, H256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of an event ID in bytes
pub const EVENT_ID_SIZE: usize = 32;

const EPOCH_BYTES: usize = 4;
const LAMPORT_BYTES: usize = 4;
const DIGEST_OFFSET: usize = EPOCH_BYTES + LAMPORT_BYTES;

/// Unique identifier of a DAG event.
///
/// Layout: `epoch (4, BE) | lamport (4, BE) | digest[0..24]`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct EventId([u8; EVENT_ID_SIZE]);

impl EventId {
    /// The zero ID. Never assigned to a real event.
    pub const ZERO: Self = Self([0u8; EVENT_ID_SIZE]);

    /// Builds an ID from its epoch, Lamport time and header digest.
    pub fn new(epoch: Epoch, lamport: Lamport, digest: &H256) -> Self {
        let mut bytes = [0u8; EVENT_ID_SIZE];
        bytes[..EPOCH_BYTES].copy_from_slice(&epoch.to_be_bytes());
        bytes[EPOCH_BYTES..DIGEST_OFFSET].copy_from_slice(&lamport.to_be_bytes());
        bytes[DIGEST_OFFSET..].copy_from_slice(&digest.as_bytes()[..EVENT_ID_SIZE - DIGEST_OFFSET]);
        Self(bytes)
    }

    /// Creates an ID from raw bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != EVENT_ID_SIZE {
            return Err(Error::InvalidLength {
                expected: EVENT_ID_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; EVENT_ID_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Epoch the event belongs to.
    pub fn epoch(&self) -> Epoch {
        let mut buf = [0u8; EPOCH_BYTES];
        buf.copy_from_slice(&self.0[..EPOCH_BYTES]);
        Epoch::from_be_bytes(buf)
    }

    /// Lamport time of the event.
    pub fn lamport(&self) -> Lamport {
        let mut buf = [0u8; LAMPORT_BYTES];
        buf.copy_from_slice(&self.0[EPOCH_BYTES..DIGEST_OFFSET]);
        Lamport::from_be_bytes(buf)
    }

    /// Returns the ID as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The ID as a hash value.
    pub fn to_h256(&self) -> H256 {
        H256::new(self.0)
    }

    /// Short human-readable form: `epoch:lamport:digest-prefix`.
    pub fn short(&self) -> String {
        format!(
            "{}:{}:{}",
            self.epoch(),
            self.lamport(),
            hex::encode(&self.0[DIGEST_OFFSET..DIGEST_OFFSET + 4])
        )
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.short())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

impl AsRef<[u8]> for EventId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl rlp::Encodable for EventId {
    fn rlp_append(&self, s: &mut rlp::RlpStream) {
        s.encoder().encode_value(&self.0);
    }
}

impl rlp::Decodable for EventId {
    fn decode(rlp: &rlp::Rlp<'_>) -> std::result::Result<Self, rlp::DecoderError> {
        rlp.decoder().decode_value(|bytes| {
            Self::from_slice(bytes).map_err(|_| rlp::DecoderError::RlpInvalidLength)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_and_lamport_are_recoverable() {
        let id = EventId::new(7, 42, &H256::keccak256(b"event"));
        assert_eq!(id.epoch(), 7);
        assert_eq!(id.lamport(), 42);
        assert_eq!(&id.as_bytes()[8..], &H256::keccak256(b"event").as_bytes()[..24]);
    }

    #[test]
    fn test_ordering_follows_epoch_then_lamport() {
        let digest_hi = H256::from([0xff; 32]);
        let digest_lo = H256::from([0x00; 32]);

        assert!(EventId::new(1, 5, &digest_hi) < EventId::new(1, 6, &digest_lo));
        assert!(EventId::new(1, 9, &digest_hi) < EventId::new(2, 1, &digest_lo));
        assert!(EventId::new(1, 5, &digest_lo) < EventId::new(1, 5, &digest_hi));
    }

    #[test]
    fn test_short_display() {
        let id = EventId::new(3, 17, &H256::from([0xab; 32]));
        assert_eq!(id.to_string(), "3:17:abababab");
    }
}
