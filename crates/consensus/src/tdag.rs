//! Random DAG generation for tests and simulation.
//!
//! [`gen_rand_events`] grows a DAG of events: every step one creator emits
//! an event on top of its previous one, linking random heads of other
//! creators. Cheaters occasionally fork by building on an older event.
//! The generator only shapes drafts; an [`EventBuilder`] turns them into
//! events, typically by running them through an engine.

use crate::callbacks::{ConsensusCallbacks, MemoryEventSource};
use crate::error::ConsensusResult;
use crate::poset::Poset;
use poset_types::{Epoch, Event, EventHeader, EventId, Timestamp, ValidatorId, SECOND};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Shape of a generated DAG.
#[derive(Debug, Clone)]
pub struct GenConfig {
    /// Epoch of the events
    pub epoch: Epoch,
    /// Creators, in the order used for every tie
    pub creators: Vec<ValidatorId>,
    /// Events attempted per creator
    pub events_per_creator: usize,
    /// Maximum parents per event, self-parent included
    pub max_parents: usize,
    /// Creators that fork
    pub cheaters: Vec<ValidatorId>,
    /// Chance that a cheater's event forks
    pub fork_probability: f64,
    /// Creation time of Lamport time 0
    pub start_time: Timestamp,
}

impl GenConfig {
    /// `n` honest creators with IDs `1..=n`.
    pub fn honest(epoch: Epoch, n: u32, events_per_creator: usize, max_parents: usize) -> Self {
        Self {
            epoch,
            creators: (1..=n).collect(),
            events_per_creator,
            max_parents,
            cheaters: Vec::new(),
            fork_probability: 0.0,
            start_time: 0,
        }
    }
}

/// Turns drafts into events.
pub trait EventBuilder {
    /// Narrows the parent candidates of a draft. The self-parent is not
    /// among `options`.
    fn filter_parents(
        &mut self,
        _self_parent: Option<&EventId>,
        options: Vec<EventId>,
    ) -> ConsensusResult<Vec<EventId>> {
        Ok(options)
    }

    /// Completes a draft. Non-fatal errors drop the draft.
    fn build(&mut self, draft: EventHeader) -> ConsensusResult<Event>;
}

/// Generates events per `config`. Returns the accepted events in creation
/// order.
pub fn gen_rand_events<R: Rng, B: EventBuilder>(
    config: &GenConfig,
    rng: &mut R,
    builder: &mut B,
) -> ConsensusResult<Vec<Event>> {
    let mut remaining: Vec<(ValidatorId, usize)> = config
        .creators
        .iter()
        .filter(|_| config.events_per_creator > 0)
        .map(|&c| (c, config.events_per_creator))
        .collect();
    let mut history: HashMap<ValidatorId, Vec<Event>> = HashMap::new();
    let mut created = Vec::new();

    while !remaining.is_empty() {
        let pick = rng.gen_range(0..remaining.len());
        let creator = remaining[pick].0;
        remaining[pick].1 -= 1;
        if remaining[pick].1 == 0 {
            remaining.remove(pick);
        }

        let own = history.get(&creator).map(Vec::as_slice).unwrap_or_default();
        let forks = config.cheaters.contains(&creator)
            && !own.is_empty()
            && rng.gen_bool(config.fork_probability);
        let self_parent = if forks {
            // 0 starts a second chain, k builds on the k-th event but never on the head
            match rng.gen_range(0..own.len()) {
                0 => None,
                k => Some(&own[k - 1]),
            }
        } else {
            own.last()
        };

        let heads: Vec<EventId> = config
            .creators
            .iter()
            .filter(|&&c| c != creator)
            .filter_map(|c| history.get(c).and_then(|events| events.last()))
            .map(Event::id)
            .collect();
        let self_parent_id = self_parent.map(Event::id);
        let mut options = builder.filter_parents(self_parent_id.as_ref(), heads)?;
        options.shuffle(rng);
        let others = if options.is_empty() {
            0
        } else {
            rng.gen_range(1..=options.len().min(config.max_parents.saturating_sub(1).max(1)))
        };

        let mut parents: Vec<EventId> = self_parent_id.into_iter().collect();
        parents.extend(options.into_iter().take(others));
        let seq = self_parent.map_or(1, |p| p.header().seq + 1);

        let mut draft = EventHeader::new(config.epoch, creator, seq, parents);
        draft.lamport = draft.parents.iter().map(|p| p.lamport()).max().unwrap_or(0) + 1;
        draft.creation_time =
            config.start_time + draft.lamport as u64 * SECOND + rng.gen_range(0..SECOND / 2);
        if forks {
            draft.extra = rng.gen::<[u8; 8]>().to_vec();
        }

        match builder.build(draft) {
            Ok(event) => {
                trace!(event = %event.id().short(), creator, seq, "generated event");
                history.entry(creator).or_default().push(event.clone());
                created.push(event);
            }
            Err(err) if !err.is_fatal() => {
                trace!(%err, creator, "draft dropped");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(created)
}

/// Shuffles events into a random order in which parents still precede
/// children. Parents outside `events` are ignored.
pub fn random_topological_order<R: Rng>(events: &[Event], rng: &mut R) -> Vec<Event> {
    let index: HashMap<EventId, usize> = events
        .iter()
        .enumerate()
        .map(|(i, e)| (e.id(), i))
        .collect();
    let mut pending = vec![0usize; events.len()];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); events.len()];
    for (i, event) in events.iter().enumerate() {
        for parent in &event.header().parents {
            if let Some(&p) = index.get(parent) {
                pending[i] += 1;
                children[p].push(i);
            }
        }
    }

    let mut ready: Vec<usize> = (0..events.len()).filter(|&i| pending[i] == 0).collect();
    let mut ordered = Vec::with_capacity(events.len());
    while !ready.is_empty() {
        let i = ready.swap_remove(rng.gen_range(0..ready.len()));
        ordered.push(events[i].clone());
        for &child in &children[i] {
            pending[child] -= 1;
            if pending[child] == 0 {
                ready.push(child);
            }
        }
    }
    ordered
}

/// Builds events by preparing and processing them with an engine.
pub struct PosetBuilder<'a, C> {
    poset: &'a mut Poset<C>,
    source: Arc<MemoryEventSource>,
}

impl<'a, C: ConsensusCallbacks> PosetBuilder<'a, C> {
    /// Builds through `poset`, storing accepted events into `source`.
    pub fn new(poset: &'a mut Poset<C>, source: Arc<MemoryEventSource>) -> Self {
        Self { poset, source }
    }
}

impl<C: ConsensusCallbacks> EventBuilder for PosetBuilder<'_, C> {
    fn filter_parents(
        &mut self,
        self_parent: Option<&EventId>,
        options: Vec<EventId>,
    ) -> ConsensusResult<Vec<EventId>> {
        self.poset.no_cheaters(self_parent, &options)
    }

    fn build(&mut self, draft: EventHeader) -> ConsensusResult<Event> {
        let header = self.poset.try_prepare(draft)?;
        let event = Event::new(header, Vec::new());
        self.source.add(event.clone());
        self.poset.process_event(&event)?;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConsensusError;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    /// Accepts drafts as they are.
    struct Raw;

    impl EventBuilder for Raw {
        fn build(&mut self, draft: EventHeader) -> ConsensusResult<Event> {
            Ok(Event::new(draft, Vec::new()))
        }
    }

    #[test]
    fn test_gen_respects_shape() {
        let config = GenConfig::honest(1, 4, 10, 3);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let events = gen_rand_events(&config, &mut rng, &mut Raw).unwrap();
        assert_eq!(events.len(), 40);

        for event in &events {
            let header = event.header();
            assert!(!header.parents.is_empty() || header.seq == 1);
            assert!(header.parents.len() <= 3);
            let max_parent = header.parents.iter().map(|p| p.lamport()).max().unwrap_or(0);
            assert_eq!(header.lamport, max_parent + 1);
        }
    }

    #[test]
    fn test_gen_with_no_events_per_creator() {
        let config = GenConfig::honest(1, 3, 0, 3);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let events = gen_rand_events(&config, &mut rng, &mut Raw).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_gen_skips_rejected_drafts() {
        struct RejectOdd;
        impl EventBuilder for RejectOdd {
            fn build(&mut self, draft: EventHeader) -> ConsensusResult<Event> {
                let event = Event::new(draft, Vec::new());
                if event.header().creator % 2 == 1 {
                    return Err(ConsensusError::CheatersObserved { id: event.id() });
                }
                Ok(event)
            }
        }

        let config = GenConfig::honest(1, 4, 5, 3);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let events = gen_rand_events(&config, &mut rng, &mut RejectOdd).unwrap();
        assert_eq!(events.len(), 10);
    }

    #[test]
    fn test_random_topological_order() {
        let config = GenConfig::honest(1, 5, 20, 3);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let events = gen_rand_events(&config, &mut rng, &mut Raw).unwrap();

        let ordered = random_topological_order(&events, &mut rng);
        assert_eq!(ordered.len(), events.len());
        let mut seen = HashSet::new();
        for event in &ordered {
            for parent in &event.header().parents {
                assert!(seen.contains(parent));
            }
            seen.insert(event.id());
        }
    }
}
