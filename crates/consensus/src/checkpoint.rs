//! Persistent consensus records.
//!
//! [`Checkpoint`] changes with every decided frame, [`EpochState`] with
//! every sealed epoch and [`GenesisState`] never. All three are RLP
//! encoded.

use poset_types::{
    BlockNumber, Epoch, EventId, Frame, GasPowerLeft, Lamport, Seq, Timestamp, ValidatorId,
    ValidatorSet, H256,
};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

/// Progress of the current epoch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Checkpoint {
    /// Last decided frame of the current epoch, 0 if none
    pub last_decided_frame: Frame,
    /// Number of the last emitted block
    pub last_block: BlockNumber,
    /// Atropos of the last emitted block
    pub last_atropos: EventId,
    /// Application state hash after the last block
    pub app_hash: H256,
    /// Consensus time of the last block
    pub last_consensus_time: Timestamp,
    /// Last confirmed event of every honest creator, sorted by creator
    pub last_headers: Vec<LastHeader>,
}

impl Checkpoint {
    /// Records `header` if it is newer than the known one for its creator.
    pub fn observe_header(&mut self, header: LastHeader) {
        match self
            .last_headers
            .binary_search_by_key(&header.creator, |h| h.creator)
        {
            Ok(pos) => {
                let known = &self.last_headers[pos];
                if (known.epoch, known.seq) < (header.epoch, header.seq) {
                    self.last_headers[pos] = header;
                }
            }
            Err(pos) => self.last_headers.insert(pos, header),
        }
    }
}

/// The part of a confirmed event header that outlives its epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastHeader {
    /// Creator of the event
    pub creator: ValidatorId,
    /// Epoch of the event
    pub epoch: Epoch,
    /// Event ID
    pub id: EventId,
    /// Sequence number
    pub seq: Seq,
    /// Lamport time
    pub lamport: Lamport,
    /// Median time
    pub median_time: Timestamp,
    /// Gas power left after the event
    pub gas_power_left: GasPowerLeft,
}

/// Summary of a sealed epoch, referenced by the first event of every
/// creator in the next one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EpochSummary {
    /// Sealed epoch
    pub epoch: Epoch,
    /// Consensus time of its last block
    pub time: Timestamp,
    /// Atropos of its last block
    pub last_atropos: EventId,
    /// Application state hash at the seal
    pub state_hash: H256,
    /// Last confirmed event of every honest creator
    pub last_headers: Vec<LastHeader>,
}

impl EpochSummary {
    /// Hash carried in `prev_epoch_hash` of first events.
    pub fn hash(&self) -> H256 {
        H256::keccak256(&rlp::encode(self))
    }

    /// Last confirmed header of `creator`.
    pub fn last_header(&self, creator: ValidatorId) -> Option<&LastHeader> {
        self.last_headers
            .binary_search_by_key(&creator, |h| h.creator)
            .ok()
            .map(|pos| &self.last_headers[pos])
    }
}

/// State fixed for the lifetime of an epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochState {
    /// Current epoch
    pub epoch: Epoch,
    /// Summary of the previous epoch
    pub prev_epoch: EpochSummary,
    /// Validators of the current epoch
    pub validators: ValidatorSet,
}

/// Initial state of a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisState {
    /// First epoch
    pub epoch: Epoch,
    /// Genesis time
    pub time: Timestamp,
    /// Application state hash at genesis
    pub state_hash: H256,
    /// Validators of the first epoch
    pub validators: ValidatorSet,
}

impl GenesisState {
    /// Identity of the genesis.
    pub fn hash(&self) -> H256 {
        H256::keccak256(&rlp::encode(self))
    }

    /// The epoch state the network starts from.
    pub fn epoch_state(&self) -> EpochState {
        EpochState {
            epoch: self.epoch,
            prev_epoch: EpochSummary {
                epoch: self.epoch.saturating_sub(1),
                time: self.time,
                last_atropos: EventId::ZERO,
                state_hash: self.state_hash,
                last_headers: Vec::new(),
            },
            validators: self.validators.clone(),
        }
    }

    /// The checkpoint the network starts from.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            app_hash: self.state_hash,
            last_consensus_time: self.time,
            ..Checkpoint::default()
        }
    }
}

impl Encodable for LastHeader {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(7);
        s.append(&self.creator);
        s.append(&self.epoch);
        s.append(&self.id);
        s.append(&self.seq);
        s.append(&self.lamport);
        s.append(&self.median_time);
        s.append(&self.gas_power_left);
    }
}

impl Decodable for LastHeader {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 7 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            creator: rlp.val_at(0)?,
            epoch: rlp.val_at(1)?,
            id: rlp.val_at(2)?,
            seq: rlp.val_at(3)?,
            lamport: rlp.val_at(4)?,
            median_time: rlp.val_at(5)?,
            gas_power_left: rlp.val_at(6)?,
        })
    }
}

impl Encodable for Checkpoint {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(6);
        s.append(&self.last_decided_frame);
        s.append(&self.last_block);
        s.append(&self.last_atropos);
        s.append(&self.app_hash);
        s.append(&self.last_consensus_time);
        s.append_list(&self.last_headers);
    }
}

impl Decodable for Checkpoint {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 6 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            last_decided_frame: rlp.val_at(0)?,
            last_block: rlp.val_at(1)?,
            last_atropos: rlp.val_at(2)?,
            app_hash: rlp.val_at(3)?,
            last_consensus_time: rlp.val_at(4)?,
            last_headers: rlp.list_at(5)?,
        })
    }
}

impl Encodable for EpochSummary {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(5);
        s.append(&self.epoch);
        s.append(&self.time);
        s.append(&self.last_atropos);
        s.append(&self.state_hash);
        s.append_list(&self.last_headers);
    }
}

impl Decodable for EpochSummary {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 5 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            epoch: rlp.val_at(0)?,
            time: rlp.val_at(1)?,
            last_atropos: rlp.val_at(2)?,
            state_hash: rlp.val_at(3)?,
            last_headers: rlp.list_at(4)?,
        })
    }
}

impl Encodable for EpochState {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.epoch);
        s.append(&self.prev_epoch);
        s.append(&self.validators);
    }
}

impl Decodable for EpochState {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 3 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            epoch: rlp.val_at(0)?,
            prev_epoch: rlp.val_at(1)?,
            validators: rlp.val_at(2)?,
        })
    }
}

impl Encodable for GenesisState {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4);
        s.append(&self.epoch);
        s.append(&self.time);
        s.append(&self.state_hash);
        s.append(&self.validators);
    }
}

impl Decodable for GenesisState {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 4 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            epoch: rlp.val_at(0)?,
            time: rlp.val_at(1)?,
            state_hash: rlp.val_at(2)?,
            validators: rlp.val_at(3)?,
        })
    }
}
