//! # Poset Simulator
//!
//! Grows a random DAG of events through a reference engine, then feeds the
//! same events to further engines in other topological orders and checks
//! that every engine emits the same blocks.

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use poset_config::{Config, GenesisConfig};
use poset_consensus::{
    apply_genesis, gen_rand_events, random_topological_order, BlockResult, ConsensusCallbacks,
    GenConfig, GenesisState, MemoryEventSource, Poset, PosetBuilder, PosetStore,
};
use poset_kvdb::{KvStore, MemoryDb};
use poset_types::{Block, Epoch, Event, Frame, ValidatorSet, H256};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Poset consensus simulator
#[derive(Parser, Debug)]
#[command(name = "poset-sim")]
#[command(version)]
#[command(about = "Checks that Poset engines agree on blocks whatever order events arrive in")]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of equal-weight validators, when the config has no genesis validators
    #[arg(long, default_value_t = 5)]
    validators: u32,

    /// Events generated per validator and epoch
    #[arg(long, default_value_t = 100)]
    events_per_validator: usize,

    /// Maximum parents per event (overrides config)
    #[arg(long)]
    max_parents: Option<usize>,

    /// Engines replaying the DAG besides the reference
    #[arg(long, default_value_t = 3)]
    instances: usize,

    /// Validators that fork
    #[arg(long, default_value_t = 0)]
    cheaters: u32,

    /// Seal the epoch when this frame is decided
    #[arg(long)]
    seal_at_frame: Option<Frame>,

    /// Epochs to generate; sealing must be enabled for more than one
    #[arg(long, default_value_t = 1)]
    epochs: u32,

    /// RNG seed
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Empty directory for a persistent store of the reference engine
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (overrides config)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format: text, json, or compact (overrides config)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
    Compact,
}

/// Application that chains block hashes and seals on request.
struct SimApp {
    blocks: Vec<Block>,
    app_hash: H256,
    seal_at_frame: Option<Frame>,
    validators: ValidatorSet,
}

impl SimApp {
    fn new(genesis: &GenesisState, seal_at_frame: Option<Frame>) -> Self {
        Self {
            blocks: Vec::new(),
            app_hash: genesis.state_hash,
            seal_at_frame,
            validators: genesis.validators.clone(),
        }
    }
}

impl ConsensusCallbacks for SimApp {
    fn apply_block(&mut self, block: &Block) -> BlockResult {
        self.app_hash = H256::keccak256_concat(&[
            self.app_hash.as_bytes(),
            &block.number.to_be_bytes(),
            block.atropos.as_bytes(),
        ]);
        self.blocks.push(block.clone());
        BlockResult {
            app_hash: self.app_hash,
            seal_epoch: self.seal_at_frame == Some(block.frame),
        }
    }

    fn select_validators(&mut self, _old_epoch: Epoch, _new_epoch: Epoch) -> ValidatorSet {
        self.validators.clone()
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::default(),
    };
    if config.genesis.validators.is_empty() {
        config.genesis = GenesisConfig {
            validators: GenesisConfig::with_equal_validators(cli.validators).validators,
            ..config.genesis
        };
    }
    if let Some(max_parents) = cli.max_parents {
        config.consensus.max_parents = max_parents;
    }
    config.validate().context("invalid configuration")?;

    init_tracing(&cli, &config)?;
    ensure!(
        cli.events_per_validator > 0,
        "--events-per-validator must be positive"
    );
    ensure!(
        cli.epochs <= 1 || cli.seal_at_frame.is_some(),
        "--epochs {} needs --seal-at-frame",
        cli.epochs
    );

    let genesis = GenesisState {
        epoch: config.genesis.epoch,
        time: config.genesis.time,
        state_hash: config.genesis.state_hash,
        validators: config.genesis.validator_set()?,
    };
    info!(
        validators = genesis.validators.len(),
        quorum = genesis.validators.quorum(),
        genesis = %genesis.hash(),
        "starting simulation"
    );

    let source = Arc::new(MemoryEventSource::new());
    let (reference, segments) = run_reference(&cli, &config, &genesis, source.clone())?;
    let total: usize = segments.iter().map(Vec::len).sum();
    info!(
        events = total,
        blocks = reference.callbacks().blocks.len(),
        epoch = reference.epoch(),
        last_atropos = %reference.last_atropos(),
        "reference engine done"
    );
    if reference.callbacks().blocks.is_empty() {
        warn!("no frame was decided, grow the DAG with --events-per-validator");
    }

    let mut rng = ChaCha8Rng::seed_from_u64(cli.seed.wrapping_add(1));
    for instance in 1..=cli.instances {
        let mut poset = Poset::bootstrap(
            config.consensus.clone(),
            new_store(&genesis, None)?,
            source.clone(),
            SimApp::new(&genesis, cli.seal_at_frame),
        )?;
        for segment in &segments {
            for event in random_topological_order(segment, &mut rng) {
                poset
                    .process_event(&event)
                    .with_context(|| format!("instance {instance} rejected {}", event.id()))?;
            }
        }
        compare(instance, &reference, &poset)?;
        info!(instance, blocks = poset.callbacks().blocks.len(), "instance agrees");
    }

    println!(
        "{} engines agree on {} blocks (epoch {}, last atropos {}, app hash 0x{})",
        cli.instances + 1,
        reference.callbacks().blocks.len(),
        reference.epoch(),
        reference.last_atropos(),
        hex::encode(reference.callbacks().app_hash.as_bytes()),
    );
    Ok(())
}

/// Grows the DAG epoch by epoch. Returns the engine and the events of
/// every epoch in creation order.
fn run_reference(
    cli: &Cli,
    config: &Config,
    genesis: &GenesisState,
    source: Arc<MemoryEventSource>,
) -> Result<(Poset<SimApp>, Vec<Vec<Event>>)> {
    let mut poset = Poset::bootstrap(
        config.consensus.clone(),
        new_store(genesis, cli.data_dir.as_ref())?,
        source.clone(),
        SimApp::new(genesis, cli.seal_at_frame),
    )?;

    let mut rng = ChaCha8Rng::seed_from_u64(cli.seed);
    let mut segments = Vec::new();
    for _ in 0..cli.epochs {
        let epoch = poset.epoch();
        let creators: Vec<_> = poset.validators().ids().collect();
        let gen = GenConfig {
            start_time: poset.epoch_state().prev_epoch.time,
            cheaters: creators.iter().copied().take(cli.cheaters as usize).collect(),
            fork_probability: if cli.cheaters > 0 { 0.1 } else { 0.0 },
            creators,
            ..GenConfig::honest(
                epoch,
                0,
                cli.events_per_validator,
                config.consensus.max_parents,
            )
        };
        let events = {
            let mut builder = PosetBuilder::new(&mut poset, source.clone());
            gen_rand_events(&gen, &mut rng, &mut builder)?
        };
        debug!(epoch, events = events.len(), "generated epoch");
        segments.push(events);
        if poset.epoch() == epoch {
            break;
        }
    }
    if poset.is_halted() {
        bail!("reference engine halted");
    }
    Ok((poset, segments))
}

fn new_store(genesis: &GenesisState, data_dir: Option<&PathBuf>) -> Result<PosetStore> {
    let db: Arc<dyn KvStore> = match data_dir {
        None => Arc::new(MemoryDb::new()),
        Some(dir) => open_db(dir)?,
    };
    let store = PosetStore::new(db);
    // events live in memory only, so a used store cannot be resumed
    if !apply_genesis(&store, genesis)? {
        bail!("store already holds a network");
    }
    Ok(store)
}

#[cfg(feature = "rocksdb")]
fn open_db(dir: &PathBuf) -> Result<Arc<dyn KvStore>> {
    Ok(Arc::new(poset_kvdb::RocksDb::open_default(dir)?))
}

#[cfg(not(feature = "rocksdb"))]
fn open_db(dir: &PathBuf) -> Result<Arc<dyn KvStore>> {
    bail!(
        "cannot open {}: built without the rocksdb feature",
        dir.display()
    )
}

fn compare(instance: usize, reference: &Poset<SimApp>, other: &Poset<SimApp>) -> Result<()> {
    let expected = &reference.callbacks().blocks;
    let actual = &other.callbacks().blocks;
    if let Some(pos) = expected.iter().zip(actual).position(|(a, b)| a != b) {
        bail!(
            "instance {instance} diverged at block {}: atropos {} != {}",
            expected[pos].number,
            actual[pos].atropos,
            expected[pos].atropos
        );
    }
    ensure!(
        expected.len() == actual.len(),
        "instance {instance} emitted {} blocks, reference {}",
        actual.len(),
        expected.len()
    );
    ensure!(
        reference.checkpoint() == other.checkpoint(),
        "instance {instance} checkpoint differs"
    );
    Ok(())
}

fn init_tracing(cli: &Cli, config: &Config) -> Result<()> {
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.to_lowercase());
    let format = match cli.log_format {
        Some(format) => format,
        None => match config.logging.format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Text,
        },
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{level},poset_consensus={level}")))
        .context("invalid log level")?;

    match format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true))
                .with(env_filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(env_filter)
                .init();
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(fmt::layer().compact())
                .with(env_filter)
                .init();
        }
    }

    Ok(())
}
