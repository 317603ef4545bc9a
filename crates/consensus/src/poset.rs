//! The consensus engine.
//!
//! [`Poset`] admits events one at a time in topological order. Each event
//! is indexed by the vector clock, checked against the values the engine
//! derives for it, and, if it is a root, fed to the Atropos election. A
//! decided frame confirms a batch of events, which is ordered and handed
//! to the application as a [`Block`].
//!
//! All writes caused by one event reach storage in a single flush, after
//! the event is fully processed. A rejected event leaves no trace.

use crate::callbacks::{ConsensusCallbacks, EventSource};
use crate::checkpoint::{Checkpoint, EpochState, EpochSummary, GenesisState, LastHeader};
use crate::election::ElectionDecision;
use crate::epoch::EpochContext;
use crate::error::{ConsensusError, ConsensusResult};
use crate::gas_power::{GasPowerCalculator, GasPowerOrigin};
use crate::ordering::{sort_events, FrameInfo};
use crate::roots::{RootAndSlot, Slot};
use crate::store::PosetStore;
use crate::vecclock::VectorClock;
use poset_config::ConsensusConfig;
use poset_types::{
    Block, BlockNumber, Epoch, Event, EventHeader, EventId, Frame, GasPowerLeft, Timestamp,
    ValidatorSet, H256,
};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Writes the genesis state into an empty store.
///
/// Applying the same genesis again is a no-op. Returns whether anything
/// was written.
pub fn apply_genesis(store: &PosetStore, genesis: &GenesisState) -> ConsensusResult<bool> {
    let supplied = genesis.hash();
    if let Some(stored) = store.get_genesis_hash()? {
        if stored != supplied {
            return Err(ConsensusError::GenesisMismatch { stored, supplied });
        }
        debug!(genesis = %supplied, "genesis already applied");
        return Ok(false);
    }

    store.set_epoch_state(&genesis.epoch_state())?;
    store.set_checkpoint(&genesis.checkpoint())?;
    store.set_genesis_hash(&supplied)?;
    store.flush()?;
    info!(
        genesis = %supplied,
        epoch = genesis.epoch,
        validators = genesis.validators.len(),
        "applied genesis"
    );
    Ok(true)
}

/// Lachesis consensus engine.
pub struct Poset<C> {
    config: ConsensusConfig,
    store: PosetStore,
    source: Arc<dyn EventSource>,
    callbacks: C,
    checkpoint: Checkpoint,
    epoch_state: EpochState,
    prev_epoch_hash: H256,
    ctx: EpochContext,
    halted: bool,
}

impl<C: ConsensusCallbacks> Poset<C> {
    /// Restores the engine from storage.
    ///
    /// Roots stored above the last decided frame are replayed into the
    /// election, so a restart resumes exactly where the engine stopped.
    pub fn bootstrap(
        config: ConsensusConfig,
        store: PosetStore,
        source: Arc<dyn EventSource>,
        callbacks: C,
    ) -> ConsensusResult<Self> {
        let checkpoint = store
            .get_checkpoint()?
            .ok_or(ConsensusError::GenesisNotFound)?;
        let epoch_state = store
            .get_epoch_state()?
            .ok_or(ConsensusError::GenesisNotFound)?;
        let ctx = EpochContext::open(
            &store,
            epoch_state.epoch,
            epoch_state.validators.clone(),
            source.clone(),
            checkpoint.last_decided_frame,
        )?;

        let mut poset = Self {
            config,
            store,
            source,
            callbacks,
            prev_epoch_hash: epoch_state.prev_epoch.hash(),
            checkpoint,
            epoch_state,
            ctx,
            halted: false,
        };
        info!(
            epoch = poset.epoch(),
            last_decided_frame = poset.checkpoint.last_decided_frame,
            last_block = poset.checkpoint.last_block,
            "bootstrapped consensus"
        );

        let result = poset
            .ctx
            .process_known_roots()
            .and_then(|decision| poset.run_decisions(decision));
        poset.commit(result)?;
        Ok(poset)
    }

    /// Processes an event whose parents were all processed before.
    ///
    /// Events of past epochs and events already processed are accepted
    /// as no-ops. Validation errors reject the event and leave the engine
    /// untouched; fatal errors halt it.
    pub fn process_event(&mut self, event: &Event) -> ConsensusResult<()> {
        self.ensure_running()?;
        let result = self.process_event_inner(event);
        self.commit(result)
    }

    /// Fills the consensus-derived fields of a locally created event.
    ///
    /// The draft must carry epoch, creator, seq, parents (self-parent
    /// first), creation time and gas power used. Returns `None`, after
    /// logging why, if the draft cannot become a valid event.
    pub fn prepare(&mut self, draft: EventHeader) -> Option<EventHeader> {
        match self.try_prepare(draft) {
            Ok(header) => Some(header),
            Err(err) => {
                if err.is_fatal() {
                    self.halt(&err);
                } else {
                    warn!(%err, "event prepare failed");
                }
                None
            }
        }
    }

    /// Like [`Poset::prepare`], reporting why a draft is rejected.
    pub fn try_prepare(&mut self, draft: EventHeader) -> ConsensusResult<EventHeader> {
        self.ensure_running()?;
        let mut e = draft;
        e.lamport = e.parents.iter().map(|p| p.lamport()).max().unwrap_or(0) + 1;
        e.prev_epoch_hash = if e.seq <= 1 {
            self.prev_epoch_hash
        } else {
            H256::ZERO
        };
        let id = e.calc_id();
        if e.epoch != self.epoch() {
            return Err(ConsensusError::WrongEpoch {
                id,
                epoch: e.epoch,
                expected: self.epoch(),
            });
        }
        self.check_parents(&id, &e)?;

        let derived = self.derive_fields(id, &e);
        self.ctx.vecclock_mut().drop_not_flushed();
        let (frame, is_root, median_time, available) = derived?;

        e.frame = frame;
        e.is_root = is_root;
        e.median_time = median_time;
        e.gas_power_left =
            available
                .checked_sub(e.gas_power_used)
                .ok_or(ConsensusError::InsufficientGasPower {
                    id,
                    used: e.gas_power_used,
                    available,
                })?;
        Ok(e)
    }

    /// The current epoch.
    pub fn epoch(&self) -> Epoch {
        self.epoch_state.epoch
    }

    /// Validators of the current epoch.
    pub fn validators(&self) -> &ValidatorSet {
        &self.epoch_state.validators
    }

    /// The current epoch state.
    pub fn epoch_state(&self) -> &EpochState {
        &self.epoch_state
    }

    /// Progress of the current epoch.
    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// Number of the last emitted block.
    pub fn last_block(&self) -> BlockNumber {
        self.checkpoint.last_block
    }

    /// Atropos of the last emitted block.
    pub fn last_atropos(&self) -> EventId {
        self.checkpoint.last_atropos
    }

    /// Last decided frame of the current epoch, 0 if none.
    pub fn last_decided_frame(&self) -> Frame {
        self.checkpoint.last_decided_frame
    }

    /// Consensus time of an event confirmed in the current epoch.
    pub fn consensus_time(&self, id: &EventId) -> ConsensusResult<Timestamp> {
        if id.epoch() != self.epoch() {
            return Err(ConsensusError::EventNotConfirmed(*id));
        }
        self.ctx.confirmations().consensus_time(id)
    }

    /// Roots of `frame` in the current epoch.
    pub fn frame_roots(&self, frame: Frame) -> ConsensusResult<Vec<RootAndSlot>> {
        self.ctx.roots().frame_roots(frame)
    }

    /// Vector clock of the current epoch.
    pub fn vecclock(&self) -> &VectorClock {
        self.ctx.vecclock()
    }

    /// Drops parent candidates whose creators `self_parent` sees forking.
    pub fn no_cheaters(
        &self,
        self_parent: Option<&EventId>,
        options: &[EventId],
    ) -> ConsensusResult<Vec<EventId>> {
        self.ctx.vecclock().no_cheaters(self_parent, options)
    }

    /// Consensus parameters.
    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// The storage.
    pub fn store(&self) -> &PosetStore {
        &self.store
    }

    /// The application callbacks.
    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    /// The application callbacks, mutably.
    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }

    /// Whether a fatal error halted the engine.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    fn process_event_inner(&mut self, event: &Event) -> ConsensusResult<()> {
        let id = event.id();
        let e = event.header();
        if e.epoch < self.epoch() {
            trace!(event = %id.short(), "event of a past epoch ignored");
            return Ok(());
        }
        if e.epoch > self.epoch() {
            return Err(ConsensusError::WrongEpoch {
                id,
                epoch: e.epoch,
                expected: self.epoch(),
            });
        }
        if self.ctx.vecclock().contains(&id)? {
            trace!(event = %id.short(), "event already processed");
            return Ok(());
        }

        self.check_parents(&id, e)?;
        self.check_epoch_hash(&id, e)?;
        if let Some(self_parent) = e.self_parent() {
            let honest = self.ctx.vecclock().no_cheaters(Some(self_parent), &e.parents)?;
            if honest.len() != e.parents.len() {
                return Err(ConsensusError::CheatersObserved { id });
            }
        }

        let (frame, is_root, median_time, available) = self.derive_fields(id, e)?;
        if e.frame != frame {
            return Err(ConsensusError::WrongFrame {
                id,
                claimed: e.frame,
                expected: frame,
            });
        }
        if e.is_root != is_root {
            return Err(ConsensusError::WrongIsRoot {
                id,
                claimed: e.is_root,
                expected: is_root,
            });
        }
        if e.median_time != median_time {
            return Err(ConsensusError::WrongMedianTime {
                id,
                claimed: e.median_time,
                expected: median_time,
            });
        }
        let left =
            available
                .checked_sub(e.gas_power_used)
                .ok_or(ConsensusError::InsufficientGasPower {
                    id,
                    used: e.gas_power_used,
                    available,
                })?;
        if e.gas_power_left != left {
            return Err(ConsensusError::WrongGasPowerLeft {
                id,
                claimed: e.gas_power_left,
                expected: left,
            });
        }

        self.ctx.vecclock_mut().flush()?;
        debug!(
            event = %id.short(),
            creator = e.creator,
            seq = e.seq,
            frame,
            is_root,
            "processed event"
        );

        if is_root {
            let root = RootAndSlot {
                id,
                slot: Slot {
                    frame,
                    validator: e.creator,
                },
            };
            let decision = self.ctx.add_root(&root)?;
            self.run_decisions(decision)?;
        }
        Ok(())
    }

    /// Indexes the event and computes frame, root flag, median time and
    /// the gas power available before the event's own usage. The vector
    /// clock is left staged.
    fn derive_fields(
        &mut self,
        id: EventId,
        e: &EventHeader,
    ) -> ConsensusResult<(Frame, bool, Timestamp, GasPowerLeft)> {
        self.ctx.vecclock_mut().add(id, e)?;
        let (frame, is_root) = self.ctx.calc_frame(&id, e)?;
        let median_time = self
            .ctx
            .vecclock()
            .median_time(&id, self.epoch_state.prev_epoch.time)?;

        let origin = match e.self_parent() {
            Some(self_parent) => {
                let parent = self.ctx.header(self_parent)?;
                GasPowerOrigin::SelfParent {
                    left: parent.gas_power_left,
                    median_time: parent.median_time,
                }
            }
            None => GasPowerOrigin::first_event(&self.epoch_state.prev_epoch, e.creator),
        };
        let available = GasPowerCalculator::new(&self.config.gas_power, self.ctx.validators())
            .available(e.creator, median_time, origin);
        Ok((frame, is_root, median_time, available))
    }

    /// Structural checks against the already processed parents.
    fn check_parents(&self, id: &EventId, e: &EventHeader) -> ConsensusResult<()> {
        if !self.ctx.validators().contains(e.creator) {
            return Err(ConsensusError::UnknownCreator {
                id: *id,
                creator: e.creator,
            });
        }
        if e.seq == 0 {
            return Err(ConsensusError::MalformedEvent {
                id: *id,
                reason: "zero seq",
            });
        }
        for parent in &e.parents {
            if parent.epoch() != e.epoch || !self.ctx.vecclock().contains(parent)? {
                return Err(ConsensusError::MissingParent {
                    id: *id,
                    parent: *parent,
                });
            }
        }
        let max_parent_lamport = e.parents.iter().map(|p| p.lamport()).max().unwrap_or(0);
        if e.lamport != max_parent_lamport + 1 {
            return Err(ConsensusError::MalformedEvent {
                id: *id,
                reason: "lamport is not 1 + max parent lamport",
            });
        }
        if e.seq > 1 {
            let Some(self_parent) = e.self_parent() else {
                return Err(ConsensusError::MalformedEvent {
                    id: *id,
                    reason: "missing self-parent",
                });
            };
            let parent = self.ctx.header(self_parent)?;
            if parent.creator != e.creator || parent.seq + 1 != e.seq {
                return Err(ConsensusError::MalformedEvent {
                    id: *id,
                    reason: "self-parent is not the creator's previous event",
                });
            }
        }
        Ok(())
    }

    fn check_epoch_hash(&self, id: &EventId, e: &EventHeader) -> ConsensusResult<()> {
        if e.seq <= 1 {
            if e.prev_epoch_hash != self.prev_epoch_hash {
                return Err(ConsensusError::WrongEpochHash { id: *id });
            }
        } else if !e.prev_epoch_hash.is_zero() {
            return Err(ConsensusError::NonZeroEpochHash { id: *id });
        }
        Ok(())
    }

    /// Handles decided frames until the election needs more roots or the
    /// epoch is sealed.
    fn run_decisions(&mut self, mut decision: Option<ElectionDecision>) -> ConsensusResult<()> {
        while let Some(decided) = decision {
            if self.on_frame_decided(decided)? {
                return Ok(());
            }
            decision = self.ctx.restart_election(decided.frame + 1)?;
        }
        Ok(())
    }

    /// Confirms, orders and emits the block of a decided frame.
    ///
    /// Returns whether the application sealed the epoch.
    fn on_frame_decided(&mut self, decided: ElectionDecision) -> ConsensusResult<bool> {
        let ElectionDecision { frame, atropos } = decided;
        let epoch = self.epoch();

        let mut confirmed =
            self.ctx
                .confirmations()
                .confirm_events(epoch, frame, &atropos, self.source.as_ref())?;
        sort_events(&mut confirmed);
        let cheaters = self.ctx.vecclock().cheaters(&atropos)?;

        let atropos_header = self.ctx.header(&atropos)?;
        let lowest = confirmed
            .first()
            .map(|e| e.header.lamport)
            .unwrap_or(atropos_header.lamport);
        let info = FrameInfo::calc(
            lowest,
            atropos_header.lamport,
            atropos_header.median_time,
            self.checkpoint.last_consensus_time,
        );
        self.ctx.confirmations().set_frame_info(frame, &info)?;

        let mut events = Vec::with_capacity(confirmed.len());
        for event in &confirmed {
            self.callbacks
                .on_event_confirmed(&event.header, event.seq_depth);
            if cheaters.contains(&event.header.creator) {
                continue;
            }
            self.checkpoint.observe_header(LastHeader {
                creator: event.header.creator,
                epoch,
                id: event.id,
                seq: event.header.seq,
                lamport: event.header.lamport,
                median_time: event.header.median_time,
                gas_power_left: event.header.gas_power_left,
            });
            if self
                .callbacks
                .is_event_allowed_into_block(&event.header, event.seq_depth)
            {
                events.push(event.id);
            }
        }

        let block = Block {
            number: self.checkpoint.last_block + 1,
            timestamp: info.last_consensus_time,
            frame,
            atropos,
            events,
            cheaters,
        };
        let result = self.callbacks.apply_block(&block);
        info!(
            epoch,
            frame,
            block = block.number,
            atropos = %atropos.short(),
            confirmed = confirmed.len(),
            events = block.events.len(),
            cheaters = block.cheaters.len(),
            "new block"
        );

        self.checkpoint.last_decided_frame = frame;
        self.checkpoint.last_block = block.number;
        self.checkpoint.last_atropos = atropos;
        self.checkpoint.app_hash = result.app_hash;
        self.checkpoint.last_consensus_time = info.last_consensus_time;
        if result.seal_epoch {
            self.seal_epoch()?;
        }
        self.store.set_checkpoint(&self.checkpoint)?;
        Ok(result.seal_epoch)
    }

    /// Closes the current epoch and opens the next one.
    fn seal_epoch(&mut self) -> ConsensusResult<()> {
        let old_epoch = self.epoch();
        let new_epoch = old_epoch + 1;
        let summary = EpochSummary {
            epoch: old_epoch,
            time: self.checkpoint.last_consensus_time,
            last_atropos: self.checkpoint.last_atropos,
            state_hash: self.checkpoint.app_hash,
            last_headers: self.checkpoint.last_headers.clone(),
        };
        let validators = self.callbacks.select_validators(old_epoch, new_epoch);

        self.prev_epoch_hash = summary.hash();
        self.epoch_state = EpochState {
            epoch: new_epoch,
            prev_epoch: summary,
            validators,
        };
        self.checkpoint.last_decided_frame = 0;
        self.store.set_epoch_state(&self.epoch_state)?;
        self.store.drop_epoch(old_epoch)?;
        self.ctx = EpochContext::open(
            &self.store,
            new_epoch,
            self.epoch_state.validators.clone(),
            self.source.clone(),
            0,
        )?;
        info!(
            sealed = old_epoch,
            epoch = new_epoch,
            validators = self.epoch_state.validators.len(),
            "sealed epoch"
        );
        Ok(())
    }

    /// Flushes on success, rolls back on error and halts on fatal errors.
    fn commit<T>(&mut self, result: ConsensusResult<T>) -> ConsensusResult<T> {
        match result {
            Ok(value) => match self.store.flush() {
                Ok(()) => Ok(value),
                Err(err) => {
                    self.halt(&err);
                    Err(err)
                }
            },
            Err(err) => {
                self.ctx.vecclock_mut().drop_not_flushed();
                self.store.drop_not_flushed();
                if err.is_fatal() {
                    self.halt(&err);
                } else {
                    warn!(%err, "event rejected");
                }
                Err(err)
            }
        }
    }

    fn halt(&mut self, err: &ConsensusError) {
        error!(%err, epoch = self.epoch(), "consensus halted");
        self.halted = true;
    }

    fn ensure_running(&self) -> ConsensusResult<()> {
        if self.halted {
            Err(ConsensusError::Halted)
        } else {
            Ok(())
        }
    }
}
