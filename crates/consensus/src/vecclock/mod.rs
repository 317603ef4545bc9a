//! Vector clock of one epoch.
//!
//! For every event the clock keeps two vectors, indexed by branch:
//!
//! - highest-before: the highest event of every branch the event observes,
//!   together with its creation time
//! - lowest-after: the first event of every branch that observes the event
//!
//! Together they answer "does `a` forkless-cause `b`" in one pass over
//! the branches, without walking the DAG.
//!
//! A validator starts the epoch with a single branch. An event that does
//! not extend its self-parent's branch opens a new one, and any event that
//! observes two overlapping branches of a creator marks the creator as
//! forked in its highest-before vector.
//!
//! Writes are staged in memory by [`VectorClock::add`] until
//! [`VectorClock::flush`] moves them into the epoch tables, or
//! [`VectorClock::drop_not_flushed`] forgets them. Flushed vectors are read
//! back through a bounded LRU cache in front of the tables.

mod vectors;

pub use vectors::{BranchSeq, BranchesInfo, HighestBefore, LowestAfter};

use crate::callbacks::EventSource;
use crate::error::{ConsensusError, ConsensusResult};
use crate::store::{EpochTables, StoreTable};
use poset_kvdb::KvStore;
use lru::LruCache;
use parking_lot::Mutex;
use poset_types::{Epoch, EventHeader, EventId, Timestamp, ValidatorId, ValidatorSet, Weight};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{trace, warn};

const BRANCHES_KEY: &[u8] = b"info";

/// Default number of events whose flushed vectors stay cached.
pub const DEFAULT_VECTOR_CACHE_SIZE: usize = 4096;

/// Highest-before vector of an event together with the event's branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct BeforeRecord {
    branch: u32,
    highest: HighestBefore,
}

#[derive(Debug, Default)]
struct Staging {
    highest_before: HashMap<EventId, BeforeRecord>,
    lowest_after: HashMap<EventId, LowestAfter>,
    branches: Option<BranchesInfo>,
}

/// Recently used flushed vectors.
struct VectorCache {
    highest_before: LruCache<EventId, BeforeRecord>,
    lowest_after: LruCache<EventId, LowestAfter>,
}

impl VectorCache {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            highest_before: LruCache::new(capacity),
            lowest_after: LruCache::new(capacity),
        }
    }
}

/// Vector clock over the events of one epoch.
pub struct VectorClock {
    epoch: Epoch,
    validators: Arc<ValidatorSet>,
    source: Arc<dyn EventSource>,
    highest_before_table: StoreTable,
    lowest_after_table: StoreTable,
    branches_table: StoreTable,
    branches: BranchesInfo,
    cache: Mutex<VectorCache>,
    staged: Staging,
}

impl VectorClock {
    /// Opens the clock of `epoch` over its tables.
    pub fn new(
        epoch: Epoch,
        validators: Arc<ValidatorSet>,
        source: Arc<dyn EventSource>,
        tables: &EpochTables,
    ) -> ConsensusResult<Self> {
        let capacity = NonZeroUsize::new(DEFAULT_VECTOR_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self::with_cache_capacity(epoch, validators, source, tables, capacity)
    }

    /// Opens the clock keeping at most `capacity` events' vectors cached.
    pub fn with_cache_capacity(
        epoch: Epoch,
        validators: Arc<ValidatorSet>,
        source: Arc<dyn EventSource>,
        tables: &EpochTables,
        capacity: NonZeroUsize,
    ) -> ConsensusResult<Self> {
        let branches = match tables.branches.get(BRANCHES_KEY)? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => BranchesInfo::new(validators.len()),
        };
        Ok(Self {
            epoch,
            validators,
            source,
            highest_before_table: tables.highest_before.clone(),
            lowest_after_table: tables.lowest_after.clone(),
            branches_table: tables.branches.clone(),
            branches,
            cache: Mutex::new(VectorCache::new(capacity)),
            staged: Staging::default(),
        })
    }

    /// The epoch of the clock.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Branch bookkeeping, staged changes included.
    pub fn branches(&self) -> &BranchesInfo {
        self.staged.branches.as_ref().unwrap_or(&self.branches)
    }

    /// Whether the event was added, staged or flushed.
    pub fn contains(&self, id: &EventId) -> ConsensusResult<bool> {
        Ok(self.before_record(id)?.is_some())
    }

    /// Indexes a new event. Every parent must already be indexed.
    pub fn add(&mut self, id: EventId, e: &EventHeader) -> ConsensusResult<()> {
        let creator_idx =
            self.validators
                .get_idx(e.creator)
                .ok_or(ConsensusError::UnknownCreator {
                    id,
                    creator: e.creator,
                })?;

        let mut branches = self.branches().clone();
        let branch = self.fill_branch(&mut branches, id, e, creator_idx)?;

        let mut highest = HighestBefore::new(branches.len());
        highest.set(branch, BranchSeq::single(e.seq), e.creation_time);
        for parent in &e.parents {
            let record = self
                .before_record(parent)?
                .ok_or(ConsensusError::MissingParent {
                    id,
                    parent: *parent,
                })?;
            highest.collect_from(&record.highest, branches.len());
        }
        if branches.at_least_one_fork() {
            detect_forks(&mut highest, &branches);
        }

        let mut own = LowestAfter::new(branches.len());
        own.visit(branch, e.seq);
        self.staged.lowest_after.insert(id, own);
        self.staged.highest_before.insert(
            id,
            BeforeRecord {
                branch: branch as u32,
                highest,
            },
        );
        self.staged.branches = Some(branches);

        self.fill_lowest_after(e, branch)?;
        trace!(event = %id.short(), branch, "indexed event");
        Ok(())
    }

    /// Moves staged vectors into the epoch tables.
    pub fn flush(&mut self) -> ConsensusResult<()> {
        let staged = std::mem::take(&mut self.staged);
        let cache = self.cache.get_mut();
        for (id, record) in staged.highest_before {
            self.highest_before_table
                .put(id.as_bytes(), &bincode::serialize(&record)?)?;
            cache.highest_before.put(id, record);
        }
        for (id, vector) in staged.lowest_after {
            self.lowest_after_table
                .put(id.as_bytes(), &bincode::serialize(&vector)?)?;
            cache.lowest_after.put(id, vector);
        }
        if let Some(branches) = staged.branches {
            self.branches_table
                .put(BRANCHES_KEY, &bincode::serialize(&branches)?)?;
            self.branches = branches;
        }
        Ok(())
    }

    /// Forgets staged vectors.
    pub fn drop_not_flushed(&mut self) {
        self.staged = Staging::default();
    }

    /// Highest-before vector of an indexed event, indexed by branch.
    pub fn highest_before(&self, id: &EventId) -> ConsensusResult<HighestBefore> {
        Ok(self.expect_before_record(id)?.highest)
    }

    /// Lowest-after vector of an indexed event, indexed by branch.
    pub fn lowest_after(&self, id: &EventId) -> ConsensusResult<LowestAfter> {
        if let Some(vector) = self.staged.lowest_after.get(id) {
            return Ok(vector.clone());
        }
        if let Some(vector) = self.cache.lock().lowest_after.get(id) {
            return Ok(vector.clone());
        }
        let vector: LowestAfter = match self.lowest_after_table.get(id.as_bytes())? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => return Err(ConsensusError::EventNotFound(*id)),
        };
        self.cache.lock().lowest_after.put(*id, vector.clone());
        Ok(vector)
    }

    /// Number of events with a cached highest-before vector.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().highest_before.len()
    }

    /// Branch of an indexed event.
    pub fn event_branch(&self, id: &EventId) -> ConsensusResult<usize> {
        Ok(self.expect_before_record(id)?.branch as usize)
    }

    /// Whether `a` forkless-causes `b`.
    ///
    /// True iff `b` observes no fork of `a`'s creator and validators
    /// holding at least a quorum of weight have an event that observes `a`
    /// and is observed by `b`.
    pub fn forkless_cause(&self, a: &EventId, b: &EventId) -> ConsensusResult<bool> {
        let a_branch = self.event_branch(a)?;
        let b_highest = self.highest_before(b)?;
        let branches = self.branches();
        if b_highest.get(a_branch).is_fork_detected() {
            return Ok(false);
        }

        let a_lowest = self.lowest_after(a)?;
        let mut yes = self.validators.new_counter();
        for (branch, &creator_idx) in branches.creator_idx.iter().enumerate() {
            let after = a_lowest.get(branch);
            let before = b_highest.get(branch);
            if after != 0 && !before.is_fork_detected() && after <= before.seq {
                yes.count_by_idx(creator_idx);
                if yes.has_quorum() {
                    return Ok(true);
                }
            }
        }
        Ok(yes.has_quorum())
    }

    /// Highest-before vector of an event folded to one entry per validator.
    ///
    /// A validator seen forking gets the fork sentinel, otherwise its
    /// highest observed branch.
    pub fn merged_highest_before(&self, id: &EventId) -> ConsensusResult<HighestBefore> {
        let scattered = self.highest_before(id)?;
        let branches = self.branches();
        if !branches.at_least_one_fork() {
            return Ok(scattered);
        }
        let mut merged = HighestBefore::new(self.validators.len());
        for (creator_idx, creator_branches) in branches.by_creator.iter().enumerate() {
            let mut best = (BranchSeq::default(), 0);
            for &branch in creator_branches {
                let seq = scattered.get(branch);
                if seq.is_fork_detected() {
                    best = (seq, 0);
                    break;
                }
                if seq.seq > best.0.seq {
                    best = (seq, scattered.get_time(branch));
                }
            }
            merged.set(creator_idx, best.0, best.1);
        }
        Ok(merged)
    }

    /// Weighted median of the creation times the event observes.
    ///
    /// Validators seen forking weigh nothing, and validators not observed
    /// at all count with `default_time`.
    pub fn median_time(&self, id: &EventId, default_time: Timestamp) -> ConsensusResult<Timestamp> {
        let merged = self.merged_highest_before(id)?;

        let mut honest_total: Weight = 0;
        let mut highests: Vec<(Timestamp, Weight)> = Vec::with_capacity(self.validators.len());
        for (idx, validator) in self.validators.iter().enumerate() {
            let seq = merged.get(idx);
            let entry = if seq.is_fork_detected() {
                (merged.get_time(idx), 0)
            } else if seq.seq == 0 {
                (default_time, validator.weight)
            } else {
                (merged.get_time(idx), validator.weight)
            };
            honest_total += entry.1;
            highests.push(entry);
        }
        highests.sort_by_key(|&(time, _)| time);

        let half = honest_total / 2;
        let mut current: Weight = 0;
        for (time, weight) in highests {
            current += weight;
            if current >= half {
                return Ok(time);
            }
        }
        warn!(event = %id.short(), "median time found no honest weight");
        Ok(default_time)
    }

    /// Filters out events whose creators `self_parent` sees forking.
    pub fn no_cheaters(
        &self,
        self_parent: Option<&EventId>,
        options: &[EventId],
    ) -> ConsensusResult<Vec<EventId>> {
        let Some(self_parent) = self_parent else {
            return Ok(options.to_vec());
        };
        let branches = self.branches();
        if !branches.at_least_one_fork() {
            return Ok(options.to_vec());
        }
        let highest = self.highest_before(self_parent)?;
        let mut honest = Vec::with_capacity(options.len());
        for id in options {
            let creator_idx = branches.creator_idx[self.event_branch(id)?];
            if !highest.get(creator_idx).is_fork_detected() {
                honest.push(*id);
            }
        }
        Ok(honest)
    }

    /// Validators the event sees forking, in validator order.
    pub fn cheaters(&self, id: &EventId) -> ConsensusResult<Vec<ValidatorId>> {
        if !self.branches().at_least_one_fork() {
            return Ok(Vec::new());
        }
        let merged = self.merged_highest_before(id)?;
        Ok(self
            .validators
            .iter()
            .enumerate()
            .filter(|(idx, _)| merged.get(*idx).is_fork_detected())
            .map(|(_, v)| v.id)
            .collect())
    }

    fn before_record(&self, id: &EventId) -> ConsensusResult<Option<BeforeRecord>> {
        if let Some(record) = self.staged.highest_before.get(id) {
            return Ok(Some(record.clone()));
        }
        if let Some(record) = self.cache.lock().highest_before.get(id) {
            return Ok(Some(record.clone()));
        }
        let record: BeforeRecord = match self.highest_before_table.get(id.as_bytes())? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => return Ok(None),
        };
        self.cache.lock().highest_before.put(*id, record.clone());
        Ok(Some(record))
    }

    fn expect_before_record(&self, id: &EventId) -> ConsensusResult<BeforeRecord> {
        self.before_record(id)?
            .ok_or(ConsensusError::EventNotFound(*id))
    }

    /// Picks the branch of a new event, opening one on a fork.
    fn fill_branch(
        &self,
        branches: &mut BranchesInfo,
        id: EventId,
        e: &EventHeader,
        creator_idx: usize,
    ) -> ConsensusResult<usize> {
        match e.self_parent() {
            None => {
                if branches.last_seq[creator_idx] == 0 {
                    branches.last_seq[creator_idx] = e.seq;
                    return Ok(creator_idx);
                }
            }
            Some(self_parent) => {
                let record = self
                    .before_record(self_parent)?
                    .ok_or(ConsensusError::MissingParent {
                        id,
                        parent: *self_parent,
                    })?;
                let branch = record.branch as usize;
                if branches.last_seq[branch] + 1 == e.seq {
                    branches.last_seq[branch] = e.seq;
                    return Ok(branch);
                }
            }
        }
        let branch = branches.add_branch(creator_idx, e.seq);
        warn!(
            event = %id.short(),
            creator = e.creator,
            branch,
            "fork detected, opened new branch"
        );
        Ok(branch)
    }

    /// Marks every ancestor the new event is the first observer of on its branch.
    fn fill_lowest_after(&mut self, e: &EventHeader, branch: usize) -> ConsensusResult<()> {
        let mut stack: Vec<EventId> = e.parents.clone();
        while let Some(walk) = stack.pop() {
            let mut vector = self.lowest_after(&walk)?;
            if !vector.visit(branch, e.seq) {
                continue;
            }
            self.staged.lowest_after.insert(walk, vector);
            let header = self
                .source
                .get_event_header(self.epoch, &walk)
                .ok_or(ConsensusError::EventNotFound(walk))?;
            stack.extend(header.parents);
        }
        Ok(())
    }
}

/// Marks every branch of creators the vector sees forking.
fn detect_forks(highest: &mut HighestBefore, branches: &BranchesInfo) {
    for creator_branches in &branches.by_creator {
        if creator_branches.len() <= 1 {
            continue;
        }
        if creator_branches
            .iter()
            .any(|&branch| highest.get(branch).is_fork_detected())
        {
            for &branch in creator_branches {
                highest.set_fork_detected(branch);
            }
        }
    }

    for creator_branches in &branches.by_creator {
        if creator_branches.len() <= 1 || highest.get(creator_branches[0]).is_fork_detected() {
            continue;
        }
        let forked = creator_branches.iter().any(|&a| {
            creator_branches.iter().any(|&b| {
                let (x, y) = (highest.get(a), highest.get(b));
                a != b
                    && !x.is_empty()
                    && !y.is_empty()
                    && x.min_seq <= y.seq
                    && y.min_seq <= x.seq
            })
        });
        if forked {
            for &branch in creator_branches {
                highest.set_fork_detected(branch);
            }
        }
    }
}
