//! Parent selection for locally created events.
//!
//! Parents are picked one at a time, each by its own [`SearchStrategy`].
//! [`CausalityStrategy`] prefers the candidate that adds the most weight of
//! newly observed validators, which is what makes new roots appear quickly.

use crate::error::ConsensusResult;
use crate::vecclock::{HighestBefore, VectorClock};
use poset_types::{EventId, ValidatorSet, Weight};
use rand::Rng;

/// Picks one parent among candidates.
pub trait SearchStrategy {
    /// Index into `options` of the chosen parent. `options` is never empty.
    fn choose(&mut self, existing: &[EventId], options: &[EventId]) -> ConsensusResult<usize>;
}

/// Picks a uniformly random candidate.
#[derive(Debug)]
pub struct RandomStrategy<R> {
    rng: R,
}

impl<R: Rng> RandomStrategy<R> {
    /// Creates the strategy over `rng`.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> SearchStrategy for RandomStrategy<R> {
    fn choose(&mut self, _existing: &[EventId], options: &[EventId]) -> ConsensusResult<usize> {
        Ok(self.rng.gen_range(0..options.len()))
    }
}

/// Picks the candidate observing the most weight beyond what the already
/// chosen parents observe.
pub struct CausalityStrategy<'a> {
    vecclock: &'a VectorClock,
    validators: &'a ValidatorSet,
    template: HighestBefore,
}

impl<'a> CausalityStrategy<'a> {
    /// Starts from what `self_parent` observes, or from nothing.
    pub fn new(
        vecclock: &'a VectorClock,
        validators: &'a ValidatorSet,
        self_parent: Option<&EventId>,
    ) -> ConsensusResult<Self> {
        let template = match self_parent {
            Some(id) => vecclock.merged_highest_before(id)?,
            None => HighestBefore::new(validators.len()),
        };
        Ok(Self {
            vecclock,
            validators,
            template,
        })
    }

    fn score(&self, candidate: &HighestBefore) -> Weight {
        self.validators
            .iter()
            .enumerate()
            .filter(|(idx, _)| {
                let mine = self.template.get(*idx);
                let his = candidate.get(*idx);
                !mine.is_fork_detected() && (his.is_fork_detected() || his.seq > mine.seq)
            })
            .map(|(_, v)| v.weight)
            .sum()
    }
}

impl SearchStrategy for CausalityStrategy<'_> {
    fn choose(&mut self, _existing: &[EventId], options: &[EventId]) -> ConsensusResult<usize> {
        let mut best: Option<(usize, Weight, HighestBefore)> = None;
        for (idx, option) in options.iter().enumerate() {
            let highest = self.vecclock.merged_highest_before(option)?;
            let score = self.score(&highest);
            if best.as_ref().map_or(true, |(_, top, _)| score > *top) {
                best = Some((idx, score, highest));
            }
        }
        let (idx, _, highest) = best.unwrap_or_default();
        self.template
            .collect_from(&highest, self.validators.len());
        Ok(idx)
    }
}

/// Extends `existing` with one parent per strategy, drawn from `options`.
pub fn choose_parents(
    existing: &[EventId],
    options: &[EventId],
    strategies: &mut [&mut dyn SearchStrategy],
) -> ConsensusResult<Vec<EventId>> {
    let mut parents = existing.to_vec();
    let mut remaining: Vec<EventId> = options
        .iter()
        .filter(|id| !existing.contains(*id))
        .copied()
        .collect();
    for strategy in strategies.iter_mut() {
        if remaining.is_empty() {
            break;
        }
        let idx = strategy.choose(&parents, &remaining)?;
        parents.push(remaining.remove(idx));
    }
    Ok(parents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use poset_types::H256;
    use rand::rngs::mock::StepRng;

    fn id(n: u8) -> EventId {
        EventId::new(1, n as u32, &H256::keccak256(&[n]))
    }

    #[test]
    fn test_choose_parents_bounded_by_strategies() {
        let options: Vec<EventId> = (1..=5).map(id).collect();
        let mut first = RandomStrategy::new(StepRng::new(0, 1));
        let mut second = RandomStrategy::new(StepRng::new(0, 1));
        let parents = choose_parents(&[id(9)], &options, &mut [&mut first, &mut second]).unwrap();
        assert_eq!(parents.len(), 3);
        assert_eq!(parents[0], id(9));
        assert!(parents[1..].iter().all(|p| options.contains(p)));
        assert_ne!(parents[1], parents[2]);
    }

    #[test]
    fn test_choose_parents_skips_existing() {
        let options = vec![id(1), id(2)];
        let mut strategy = RandomStrategy::new(StepRng::new(0, 1));
        let mut other = RandomStrategy::new(StepRng::new(0, 1));
        let parents =
            choose_parents(&[id(1)], &options, &mut [&mut strategy, &mut other]).unwrap();
        assert_eq!(parents, vec![id(1), id(2)]);
    }
}
