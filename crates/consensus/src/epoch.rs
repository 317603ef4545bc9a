//! Per-epoch consensus context.
//!
//! The vector clock, the root index, the election and the confirmation
//! index share one lifetime: they are built together when an epoch starts
//! and dropped together when it is sealed.

use crate::callbacks::EventSource;
use crate::election::{Election, ElectionDag, ElectionDecision};
use crate::error::{ConsensusError, ConsensusResult};
use crate::ordering::ConfirmationIndex;
use crate::roots::{RootAndSlot, RootStore};
use crate::store::PosetStore;
use crate::vecclock::VectorClock;
use poset_types::{Epoch, EventHeader, EventId, Frame, ValidatorSet, FIRST_FRAME};
use std::sync::Arc;
use tracing::debug;

/// Everything the engine keeps for the current epoch.
pub struct EpochContext {
    epoch: Epoch,
    validators: Arc<ValidatorSet>,
    source: Arc<dyn EventSource>,
    vecclock: VectorClock,
    roots: RootStore,
    election: Election,
    confirmations: ConfirmationIndex,
}

/// Read-only DAG view handed to the election.
struct DagView<'a> {
    vecclock: &'a VectorClock,
    roots: &'a RootStore,
}

impl ElectionDag for DagView<'_> {
    fn forkless_cause(&self, a: &EventId, b: &EventId) -> ConsensusResult<bool> {
        self.vecclock.forkless_cause(a, b)
    }

    fn frame_roots(&self, frame: Frame) -> ConsensusResult<Vec<RootAndSlot>> {
        self.roots.frame_roots(frame)
    }
}

impl EpochContext {
    /// Opens the context of `epoch`, resuming after `last_decided_frame`.
    pub fn open(
        store: &PosetStore,
        epoch: Epoch,
        validators: ValidatorSet,
        source: Arc<dyn EventSource>,
        last_decided_frame: Frame,
    ) -> ConsensusResult<Self> {
        let validators = Arc::new(validators);
        let tables = store.epoch_tables(epoch);
        let vecclock = VectorClock::new(epoch, validators.clone(), source.clone(), &tables)?;
        debug!(epoch, last_decided_frame, "opened epoch context");
        Ok(Self {
            epoch,
            election: Election::new(validators.clone(), last_decided_frame + 1),
            validators,
            source,
            vecclock,
            roots: RootStore::new(tables.roots),
            confirmations: ConfirmationIndex::new(tables.confirmed, tables.frame_info),
        })
    }

    /// The epoch.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Validators of the epoch.
    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    /// The vector clock.
    pub fn vecclock(&self) -> &VectorClock {
        &self.vecclock
    }

    /// The vector clock, mutably.
    pub fn vecclock_mut(&mut self) -> &mut VectorClock {
        &mut self.vecclock
    }

    /// The root index.
    pub fn roots(&self) -> &RootStore {
        &self.roots
    }

    /// The confirmation index.
    pub fn confirmations(&self) -> &ConfirmationIndex {
        &self.confirmations
    }

    /// The election.
    pub fn election(&self) -> &Election {
        &self.election
    }

    /// Header of an event of this epoch.
    pub fn header(&self, id: &EventId) -> ConsensusResult<EventHeader> {
        self.source
            .get_event_header(self.epoch, id)
            .ok_or(ConsensusError::EventNotFound(*id))
    }

    /// Frame and root flag of an event already added to the vector clock.
    ///
    /// An event without a self-parent is a root of the first frame. Any
    /// other event climbs one frame above its self-parent, as a root, iff a
    /// quorum of the self-parent frame's roots forkless-causes it.
    pub fn calc_frame(&self, id: &EventId, e: &EventHeader) -> ConsensusResult<(Frame, bool)> {
        let Some(self_parent) = e.self_parent() else {
            return Ok((FIRST_FRAME, true));
        };
        let self_parent_frame = self.header(self_parent)?.frame;
        if self.forkless_caused_by_quorum_on(id, self_parent_frame)? {
            Ok((self_parent_frame + 1, true))
        } else {
            Ok((self_parent_frame, false))
        }
    }

    /// Whether a quorum of the roots of `frame` forkless-causes the event.
    pub fn forkless_caused_by_quorum_on(&self, id: &EventId, frame: Frame) -> ConsensusResult<bool> {
        let mut counter = self.validators.new_counter();
        for root in self.roots.frame_roots(frame)? {
            if self.vecclock.forkless_cause(&root.id, id)? {
                counter.count(root.slot.validator);
                if counter.has_quorum() {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Registers a root and feeds it to the election.
    pub fn add_root(&mut self, root: &RootAndSlot) -> ConsensusResult<Option<ElectionDecision>> {
        self.roots.add(root)?;
        let view = DagView {
            vecclock: &self.vecclock,
            roots: &self.roots,
        };
        self.election.process_root(root, &view)
    }

    /// Moves the election to `frame_to_decide` and replays the roots above it.
    pub fn restart_election(
        &mut self,
        frame_to_decide: Frame,
    ) -> ConsensusResult<Option<ElectionDecision>> {
        self.election.reset(self.validators.clone(), frame_to_decide);
        self.process_known_roots()
    }

    /// Replays the stored roots into the election.
    pub fn process_known_roots(&mut self) -> ConsensusResult<Option<ElectionDecision>> {
        let view = DagView {
            vecclock: &self.vecclock,
            roots: &self.roots,
        };
        self.election.process_known_roots(&view)
    }
}
