//! Shared fixtures for the consensus integration tests.

#![allow(dead_code)]

use poset_config::ConsensusConfig;
use poset_consensus::{
    apply_genesis, gen_rand_events, BlockResult, ConsensusCallbacks, GenConfig, GenesisState,
    MemoryEventSource, Poset, PosetBuilder, PosetStore,
};
use poset_types::{Block, Epoch, Event, EventHeader, Frame, Seq, ValidatorSet, H256, SECOND};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Genesis time of every test network.
pub const GENESIS_TIME: u64 = 1_000 * SECOND;

/// Application double recording everything the engine emits.
#[derive(Debug, Clone)]
pub struct TestApp {
    pub blocks: Vec<Block>,
    pub confirmed: usize,
    pub seal_at_frame: Option<Frame>,
    pub max_seq_depth: Option<Seq>,
    pub next_validators: ValidatorSet,
    pub sealed: Vec<(Epoch, Epoch)>,
}

impl TestApp {
    pub fn new(validators: ValidatorSet) -> Self {
        Self {
            blocks: Vec::new(),
            confirmed: 0,
            seal_at_frame: None,
            max_seq_depth: None,
            next_validators: validators,
            sealed: Vec::new(),
        }
    }

    pub fn sealing_at(validators: ValidatorSet, frame: Frame) -> Self {
        Self {
            seal_at_frame: Some(frame),
            ..Self::new(validators)
        }
    }
}

impl ConsensusCallbacks for TestApp {
    fn apply_block(&mut self, block: &Block) -> BlockResult {
        self.blocks.push(block.clone());
        BlockResult {
            app_hash: H256::keccak256(&block.number.to_be_bytes()),
            seal_epoch: self.seal_at_frame == Some(block.frame),
        }
    }

    fn select_validators(&mut self, old_epoch: Epoch, new_epoch: Epoch) -> ValidatorSet {
        self.sealed.push((old_epoch, new_epoch));
        self.next_validators.clone()
    }

    fn is_event_allowed_into_block(&self, _header: &EventHeader, seq_depth: Seq) -> bool {
        self.max_seq_depth.map_or(true, |max| seq_depth <= max)
    }

    fn on_event_confirmed(&mut self, _header: &EventHeader, _seq_depth: Seq) {
        self.confirmed += 1;
    }
}

pub fn genesis(validators: ValidatorSet) -> GenesisState {
    GenesisState {
        epoch: 1,
        time: GENESIS_TIME,
        state_hash: H256::keccak256(b"genesis"),
        validators,
    }
}

/// Routes engine logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A bootstrapped engine over a fresh in-memory store.
pub fn new_poset(
    genesis: &GenesisState,
    source: Arc<MemoryEventSource>,
    app: TestApp,
) -> Poset<TestApp> {
    init_tracing();
    let store = PosetStore::in_memory();
    apply_genesis(&store, genesis).unwrap();
    Poset::bootstrap(ConsensusConfig::default(), store, source, app).unwrap()
}

/// Generates a DAG through a reference engine.
pub fn build_dag(
    genesis: &GenesisState,
    config: &GenConfig,
    seed: u64,
    app: TestApp,
) -> (Poset<TestApp>, Arc<MemoryEventSource>, Vec<Event>) {
    let source = Arc::new(MemoryEventSource::new());
    let mut poset = new_poset(genesis, source.clone(), app);
    let events = extend_dag(&mut poset, &source, config, seed);
    (poset, source, events)
}

/// Grows the DAG of an existing engine.
pub fn extend_dag(
    poset: &mut Poset<TestApp>,
    source: &Arc<MemoryEventSource>,
    config: &GenConfig,
    seed: u64,
) -> Vec<Event> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut builder = PosetBuilder::new(poset, source.clone());
    gen_rand_events(config, &mut rng, &mut builder).unwrap()
}

/// Feeds events to a fresh engine sharing `source`.
pub fn replay(
    genesis: &GenesisState,
    source: Arc<MemoryEventSource>,
    events: &[Event],
    app: TestApp,
) -> Poset<TestApp> {
    let mut poset = new_poset(genesis, source, app);
    for event in events {
        poset.process_event(event).unwrap();
    }
    poset
}

/// Config with `start_time` aligned to the test genesis.
pub fn gen_config(validators: u32, events_per_creator: usize, max_parents: usize) -> GenConfig {
    GenConfig {
        start_time: GENESIS_TIME,
        ..GenConfig::honest(1, validators, events_per_creator, max_parents)
    }
}
