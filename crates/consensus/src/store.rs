//! Consensus storage layout.
//!
//! Everything the engine persists goes through one [`Flushable`] overlay
//! over the backing [`KvStore`]. The engine commits the overlay once per
//! processed event, so a crash never leaves half an event on disk.
//!
//! Key layout:
//!
//! ```text
//! m/checkpoint            Checkpoint (rlp)
//! m/epoch_state           EpochState (rlp)
//! m/genesis               genesis hash
//! e/<epoch>/r/...         roots:           frame | creator | id -> ()
//! e/<epoch>/h/<id>        highest-before:  branch + vector (bincode)
//! e/<epoch>/l/<id>        lowest-after:    vector (bincode)
//! e/<epoch>/b/            branches info (bincode)
//! e/<epoch>/c/<id>        confirmed-on frame
//! e/<epoch>/f/<frame>     FrameInfo (bincode)
//! ```
//!
//! Per-epoch tables live under their epoch prefix and are dropped as a
//! whole when the epoch is sealed.

use crate::checkpoint::{Checkpoint, EpochState};
use crate::error::ConsensusResult;
use poset_kvdb::{Flushable, KvStore, MemoryDb, Table};
use poset_types::{Epoch, H256};
use rlp::{Decodable, Encodable};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The write overlay every table writes through.
pub type Overlay = Arc<Flushable<Arc<dyn KvStore>>>;

/// A table inside the overlay.
pub type StoreTable = Table<Overlay>;

const MAIN_PREFIX: &[u8] = b"m/";
const EPOCH_PREFIX: &[u8] = b"e/";

const CHECKPOINT_KEY: &[u8] = b"checkpoint";
const EPOCH_STATE_KEY: &[u8] = b"epoch_state";
const GENESIS_KEY: &[u8] = b"genesis";

/// Consensus storage.
#[derive(Clone)]
pub struct PosetStore {
    db: Arc<dyn KvStore>,
    overlay: Overlay,
    main: StoreTable,
}

/// Tables of one epoch.
#[derive(Clone)]
pub struct EpochTables {
    /// Roots by frame and creator
    pub roots: StoreTable,
    /// Highest-before vectors by event
    pub highest_before: StoreTable,
    /// Lowest-after vectors by event
    pub lowest_after: StoreTable,
    /// Branch bookkeeping of the vector clock
    pub branches: StoreTable,
    /// Frame that confirmed each event
    pub confirmed: StoreTable,
    /// Consensus time parameters by decided frame
    pub frame_info: StoreTable,
}

impl PosetStore {
    /// Creates a store over `db`.
    pub fn new(db: Arc<dyn KvStore>) -> Self {
        let overlay: Overlay = Arc::new(Flushable::new(db.clone()));
        let main = Table::new(overlay.clone(), MAIN_PREFIX);
        Self { db, overlay, main }
    }

    /// Creates a store over a fresh [`MemoryDb`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryDb::new()))
    }

    /// The backing store.
    pub fn db(&self) -> &Arc<dyn KvStore> {
        &self.db
    }

    /// Loads the checkpoint.
    pub fn get_checkpoint(&self) -> ConsensusResult<Option<Checkpoint>> {
        get_rlp(&self.main, CHECKPOINT_KEY)
    }

    /// Stores the checkpoint.
    pub fn set_checkpoint(&self, checkpoint: &Checkpoint) -> ConsensusResult<()> {
        put_rlp(&self.main, CHECKPOINT_KEY, checkpoint)
    }

    /// Loads the epoch state.
    pub fn get_epoch_state(&self) -> ConsensusResult<Option<EpochState>> {
        get_rlp(&self.main, EPOCH_STATE_KEY)
    }

    /// Stores the epoch state.
    pub fn set_epoch_state(&self, state: &EpochState) -> ConsensusResult<()> {
        put_rlp(&self.main, EPOCH_STATE_KEY, state)
    }

    /// Loads the hash of the applied genesis.
    pub fn get_genesis_hash(&self) -> ConsensusResult<Option<H256>> {
        get_rlp(&self.main, GENESIS_KEY)
    }

    /// Stores the hash of the applied genesis.
    pub fn set_genesis_hash(&self, hash: &H256) -> ConsensusResult<()> {
        put_rlp(&self.main, GENESIS_KEY, hash)
    }

    /// Tables of `epoch`.
    pub fn epoch_tables(&self, epoch: Epoch) -> EpochTables {
        let prefix = epoch_prefix(epoch);
        EpochTables {
            roots: self.sub_table(&prefix, b"r/"),
            highest_before: self.sub_table(&prefix, b"h/"),
            lowest_after: self.sub_table(&prefix, b"l/"),
            branches: self.sub_table(&prefix, b"b/"),
            confirmed: self.sub_table(&prefix, b"c/"),
            frame_info: self.sub_table(&prefix, b"f/"),
        }
    }

    fn sub_table(&self, prefix: &[u8], name: &[u8]) -> StoreTable {
        let mut full = Vec::with_capacity(prefix.len() + name.len());
        full.extend_from_slice(prefix);
        full.extend_from_slice(name);
        Table::new(self.overlay.clone(), full)
    }

    /// Deletes every table of `epoch`. Returns the number of deleted entries.
    pub fn drop_epoch(&self, epoch: Epoch) -> ConsensusResult<usize> {
        let deleted = self.overlay.delete_prefix(&epoch_prefix(epoch))?;
        debug!(epoch, deleted, "dropped epoch tables");
        Ok(deleted)
    }

    /// Number of entries stored for `epoch`, flushed or not.
    pub fn epoch_entries(&self, epoch: Epoch) -> ConsensusResult<usize> {
        Ok(self.overlay.iter_prefix(&epoch_prefix(epoch))?.len())
    }

    /// Commits every pending write in one batch.
    pub fn flush(&self) -> ConsensusResult<()> {
        self.overlay.flush()?;
        Ok(())
    }

    /// Discards every pending write.
    pub fn drop_not_flushed(&self) {
        self.overlay.drop_not_flushed();
    }

    /// Number of pending writes.
    pub fn not_flushed_count(&self) -> usize {
        self.overlay.not_flushed_count()
    }
}

impl fmt::Debug for PosetStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PosetStore")
            .field("not_flushed", &self.not_flushed_count())
            .finish()
    }
}

fn epoch_prefix(epoch: Epoch) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(EPOCH_PREFIX.len() + 5);
    prefix.extend_from_slice(EPOCH_PREFIX);
    prefix.extend_from_slice(&epoch.to_be_bytes());
    prefix.push(b'/');
    prefix
}

fn get_rlp<T: Decodable>(table: &StoreTable, key: &[u8]) -> ConsensusResult<Option<T>> {
    match table.get(key)? {
        Some(bytes) => Ok(Some(rlp::decode(&bytes)?)),
        None => Ok(None),
    }
}

fn put_rlp<T: Encodable>(table: &StoreTable, key: &[u8], value: &T) -> ConsensusResult<()> {
    table.put(key, &rlp::encode(value))?;
    Ok(())
}
