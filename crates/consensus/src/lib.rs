//! # Poset Consensus
//!
//! Lachesis aBFT consensus over a DAG of events.
//!
//! Validators emit events that reference earlier events as parents. The
//! engine assigns every event a frame, elects one root per frame as the
//! Atropos, and turns the events each Atropos confirms into a block with a
//! deterministic order and consensus time. Every honest node that sees the
//! same DAG emits the same blocks, whatever order the events arrived in.
//!
//! ## Event Flow
//!
//! ```text
//! process_event(e)
//!        │
//!        ▼
//! ┌──────────────────┐
//! │  CHECK           │  epoch, creator, parents processed,
//! │                  │  previous-epoch hash, no observed cheaters
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  VECTOR CLOCK    │  highest-before / lowest-after vectors,
//! │                  │  fork detection, median time
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  FRAME           │  self-parent frame + 1 iff a quorum of its
//! │                  │  roots forkless-causes e; compare claims
//! └────────┬─────────┘
//!          ▼ (roots only)
//! ┌──────────────────┐
//! │  ELECTION        │  roots vote on the frame to decide;
//! │                  │  quorum-backed votes are final
//! └────────┬─────────┘
//!          ▼ (frame decided)
//! ┌──────────────────┐
//! │  BLOCK           │  confirm events under the Atropos,
//! │                  │  order by (lamport, id), apply_block
//! └────────┬─────────┘
//!          ▼ (application asks to seal)
//! ┌──────────────────┐
//! │  EPOCH SEAL      │  summary, new validator set,
//! │                  │  fresh per-epoch state
//! └──────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use poset_consensus::{
//!     apply_genesis, BlockResult, ConsensusCallbacks, GenesisState, MemoryEventSource, Poset,
//!     PosetStore,
//! };
//! use poset_config::ConsensusConfig;
//! use poset_types::{Block, Epoch, Event, EventHeader, ValidatorSet, H256};
//! use std::sync::Arc;
//!
//! struct App;
//!
//! impl ConsensusCallbacks for App {
//!     fn apply_block(&mut self, _block: &Block) -> BlockResult {
//!         BlockResult::default()
//!     }
//!
//!     fn select_validators(&mut self, _old: Epoch, _new: Epoch) -> ValidatorSet {
//!         ValidatorSet::equal(1).unwrap()
//!     }
//! }
//!
//! let store = PosetStore::in_memory();
//! let genesis = GenesisState {
//!     epoch: 1,
//!     time: 0,
//!     state_hash: H256::ZERO,
//!     validators: ValidatorSet::equal(1).unwrap(),
//! };
//! apply_genesis(&store, &genesis).unwrap();
//!
//! let source = Arc::new(MemoryEventSource::new());
//! let mut poset = Poset::bootstrap(ConsensusConfig::default(), store, source.clone(), App).unwrap();
//!
//! let header = poset.prepare(EventHeader::new(1, 1, 1, vec![])).unwrap();
//! let event = Event::new(header, vec![]);
//! source.add(event.clone());
//! poset.process_event(&event).unwrap();
//! assert_eq!(poset.frame_roots(1).unwrap().len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod callbacks;
pub mod checkpoint;
pub mod election;
pub mod epoch;
pub mod error;
pub mod gas_power;
pub mod ordering;
pub mod parents;
pub mod poset;
pub mod roots;
pub mod store;
pub mod tdag;
pub mod vecclock;

// Re-export main types at crate root
pub use callbacks::{BlockResult, ConsensusCallbacks, EventSource, MemoryEventSource};
pub use checkpoint::{Checkpoint, EpochState, EpochSummary, GenesisState, LastHeader};
pub use election::{Election, ElectionDag, ElectionDecision};
pub use epoch::EpochContext;
pub use error::{ConsensusError, ConsensusResult};
pub use gas_power::{GasPowerCalculator, GasPowerOrigin, WindowParams};
pub use ordering::{ConfirmationIndex, ConfirmedEvent, FrameInfo};
pub use parents::{choose_parents, CausalityStrategy, RandomStrategy, SearchStrategy};
pub use poset::{apply_genesis, Poset};
pub use roots::{RootAndSlot, RootStore, Slot};
pub use store::{EpochTables, PosetStore};
pub use tdag::{gen_rand_events, random_topological_order, EventBuilder, GenConfig, PosetBuilder};
pub use vecclock::{BranchSeq, BranchesInfo, HighestBefore, LowestAfter, VectorClock};
