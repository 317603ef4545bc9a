//! Integration tests for fork detection and cheater exclusion.

mod common;

use common::{build_dag, gen_config, genesis, new_poset, replay, TestApp};
use poset_consensus::{
    random_topological_order, ConsensusError, ConsensusResult, EventSource, GenConfig, MemoryEventSource, Poset,
};
use poset_types::{Event, EventHeader, EventId, ValidatorSet};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::sync::Arc;

const CHEATER: u32 = 1;

fn cheating_config() -> GenConfig {
    GenConfig {
        cheaters: vec![CHEATER],
        fork_probability: 0.3,
        ..gen_config(5, 100, 3)
    }
}

fn add(
    poset: &mut Poset<TestApp>,
    source: &MemoryEventSource,
    mut draft: EventHeader,
    extra: &[u8],
) -> ConsensusResult<Event> {
    draft.extra = extra.to_vec();
    let header = poset.try_prepare(draft)?;
    let event = Event::new(header, vec![]);
    source.add(event.clone());
    poset.process_event(&event)?;
    Ok(event)
}

#[test]
fn test_cheater_events_excluded() {
    let validators = ValidatorSet::equal(5).unwrap();
    let (poset, source, events) = build_dag(
        &genesis(validators.clone()),
        &cheating_config(),
        51,
        TestApp::new(validators),
    );

    let mut seqs = HashSet::new();
    let forked = events
        .iter()
        .filter(|e| e.header().creator == CHEATER)
        .any(|e| !seqs.insert(e.header().seq));
    assert!(forked);

    let blocks = &poset.callbacks().blocks;
    assert!(!blocks.is_empty());
    assert!(blocks.iter().any(|b| b.cheaters == vec![CHEATER]));
    for block in blocks {
        assert!(block.cheaters.iter().all(|&c| c == CHEATER));
        if block.cheaters.contains(&CHEATER) {
            for id in &block.events {
                let creator = source.get_event(id).unwrap().header().creator;
                assert_ne!(creator, CHEATER);
            }
        }
    }
}

#[test]
fn test_forks_do_not_break_determinism() {
    let validators = ValidatorSet::equal(5).unwrap();
    let genesis = genesis(validators.clone());
    let (reference, source, events) = build_dag(
        &genesis,
        &cheating_config(),
        52,
        TestApp::new(validators.clone()),
    );

    let mut rng = ChaCha8Rng::seed_from_u64(53);
    let ordered = random_topological_order(&events, &mut rng);
    let instance = replay(&genesis, source, &ordered, TestApp::new(validators));
    assert_eq!(instance.callbacks().blocks, reference.callbacks().blocks);
    assert_eq!(instance.checkpoint(), reference.checkpoint());
}

#[test]
fn test_parents_of_observed_cheater_rejected() {
    let validators = ValidatorSet::equal(4).unwrap();
    let source = Arc::new(MemoryEventSource::new());
    let mut poset = new_poset(&genesis(validators.clone()), source.clone(), TestApp::new(validators));

    let a1 = add(&mut poset, &source, EventHeader::new(1, 1, 1, vec![]), b"").unwrap();
    let a1_fork = add(&mut poset, &source, EventHeader::new(1, 1, 1, vec![]), b"fork").unwrap();
    assert_ne!(a1.id(), a1_fork.id());
    assert!(poset.vecclock().branches().at_least_one_fork());

    let b1 = add(&mut poset, &source, EventHeader::new(1, 2, 1, vec![a1.id()]), b"").unwrap();
    let c1 = add(&mut poset, &source, EventHeader::new(1, 3, 1, vec![a1_fork.id()]), b"").unwrap();
    assert!(poset.vecclock().cheaters(&b1.id()).unwrap().is_empty());
    assert!(poset.vecclock().cheaters(&c1.id()).unwrap().is_empty());

    // b2 is the first event to see both branches
    let b2 = add(
        &mut poset,
        &source,
        EventHeader::new(1, 2, 2, vec![b1.id(), c1.id()]),
        b"",
    )
    .unwrap();
    assert_eq!(poset.vecclock().cheaters(&b2.id()).unwrap(), vec![CHEATER]);

    let options: Vec<EventId> = vec![a1.id(), c1.id()];
    assert_eq!(poset.no_cheaters(Some(&b2.id()), &options).unwrap(), vec![c1.id()]);
    assert_eq!(poset.no_cheaters(Some(&b1.id()), &options).unwrap(), options);

    let err = add(
        &mut poset,
        &source,
        EventHeader::new(1, 2, 3, vec![b2.id(), a1.id()]),
        b"",
    )
    .unwrap_err();
    assert!(matches!(err, ConsensusError::CheatersObserved { .. }));
    assert!(!err.is_fatal());
    assert!(!poset.is_halted());

    add(&mut poset, &source, EventHeader::new(1, 2, 3, vec![b2.id()]), b"").unwrap();
}
