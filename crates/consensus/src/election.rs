//! Atropos election.
//!
//! Roots of frame `f + 1` vote on the roots of frame `f` (the frame to
//! decide): yes iff they forkless-cause-observe the subject validator's
//! root. Roots of later frames aggregate the votes of the prior-frame
//! roots they observe, and a vote backed by a quorum of weight is final.
//! Once every validator's slot is decided, the first validator in
//! consensus order with a "yes" slot provides the Atropos.
//!
//! Every failure here is fatal: it is only possible with more than 1/3 of
//! the weight Byzantine, or with roots fed out of order.

use crate::error::{ConsensusError, ConsensusResult};
use crate::roots::RootAndSlot;
use poset_types::{EventId, Frame, ValidatorId, ValidatorSet};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// DAG queries the election depends on.
pub trait ElectionDag {
    /// Whether `a` forkless-causes `b`.
    fn forkless_cause(&self, a: &EventId, b: &EventId) -> ConsensusResult<bool>;

    /// All roots of `frame`.
    fn frame_roots(&self, frame: Frame) -> ConsensusResult<Vec<RootAndSlot>>;
}

/// A decided frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionDecision {
    /// Decided frame
    pub frame: Frame,
    /// Its Atropos
    pub atropos: EventId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct VoteId {
    from_root: EventId,
    for_validator: ValidatorId,
}

#[derive(Debug, Clone, Copy, Default)]
struct Vote {
    decided: bool,
    yes: bool,
    observed_root: Option<EventId>,
}

/// Election of one frame.
#[derive(Debug)]
pub struct Election {
    validators: Arc<ValidatorSet>,
    frame_to_decide: Frame,
    votes: HashMap<VoteId, Vote>,
    decided_roots: HashMap<ValidatorId, Vote>,
}

impl Election {
    /// Starts the election of `frame_to_decide`.
    pub fn new(validators: Arc<ValidatorSet>, frame_to_decide: Frame) -> Self {
        Self {
            validators,
            frame_to_decide,
            votes: HashMap::new(),
            decided_roots: HashMap::new(),
        }
    }

    /// Restarts the election for another frame, forgetting every vote.
    pub fn reset(&mut self, validators: Arc<ValidatorSet>, frame_to_decide: Frame) {
        self.validators = validators;
        self.frame_to_decide = frame_to_decide;
        self.votes.clear();
        self.decided_roots.clear();
    }

    /// The frame being decided.
    pub fn frame_to_decide(&self) -> Frame {
        self.frame_to_decide
    }

    /// Feeds a new root. Roots must arrive in topological order.
    ///
    /// Returns the decision once the frame is decided.
    pub fn process_root(
        &mut self,
        root: &RootAndSlot,
        dag: &dyn ElectionDag,
    ) -> ConsensusResult<Option<ElectionDecision>> {
        if let Some(decision) = self.choose_atropos()? {
            return Ok(Some(decision));
        }
        if root.slot.frame <= self.frame_to_decide {
            return Ok(None);
        }
        let round = root.slot.frame - self.frame_to_decide;
        let observed = self.observed_roots(&root.id, root.slot.frame - 1, dag)?;

        for subject in self.not_decided() {
            let vote = if round == 1 {
                // the last observed root of the subject wins; forks of one
                // creator are never both forkless-caused below 1/3 Byzantine
                let observed_root = observed
                    .iter()
                    .rev()
                    .find(|r| r.slot.validator == subject)
                    .map(|r| r.id);
                Vote {
                    decided: false,
                    yes: observed_root.is_some(),
                    observed_root,
                }
            } else {
                let vote = self.aggregate(root, subject, &observed)?;
                if vote.decided {
                    self.decided_roots.insert(subject, vote);
                }
                vote
            };
            self.votes.insert(
                VoteId {
                    from_root: root.id,
                    for_validator: subject,
                },
                vote,
            );
        }

        if self.not_decided().is_empty() {
            return self.choose_atropos();
        }
        Ok(None)
    }

    /// Replays the known roots above the frame to decide, frame by frame,
    /// until a decision or a frame without roots.
    pub fn process_known_roots(
        &mut self,
        dag: &dyn ElectionDag,
    ) -> ConsensusResult<Option<ElectionDecision>> {
        let mut frame = self.frame_to_decide + 1;
        loop {
            let roots = dag.frame_roots(frame)?;
            if roots.is_empty() {
                return Ok(None);
            }
            for root in &roots {
                if let Some(decision) = self.process_root(root, dag)? {
                    return Ok(Some(decision));
                }
            }
            frame += 1;
        }
    }

    fn aggregate(
        &self,
        root: &RootAndSlot,
        subject: ValidatorId,
        observed: &[RootAndSlot],
    ) -> ConsensusResult<Vote> {
        let mut yes_votes = self.validators.new_counter();
        let mut no_votes = self.validators.new_counter();
        let mut all_votes = self.validators.new_counter();
        let mut subject_root: Option<EventId> = None;

        for prev in observed {
            let vote = self
                .votes
                .get(&VoteId {
                    from_root: prev.id,
                    for_validator: subject,
                })
                .ok_or_else(|| {
                    self.non_convergence(format!(
                        "root {} has no vote for validator {}, roots processed out of order",
                        prev.id.short(),
                        subject
                    ))
                })?;
            if vote.yes {
                if subject_root.is_some() && subject_root != vote.observed_root {
                    return Err(self.non_convergence(format!(
                        "validator {subject} has two forkless-caused fork roots"
                    )));
                }
                subject_root = vote.observed_root;
                yes_votes.count(prev.slot.validator);
            } else {
                no_votes.count(prev.slot.validator);
            }
            if !all_votes.count(prev.slot.validator) {
                return Err(self.non_convergence(format!(
                    "validator {} has two forkless-caused fork roots",
                    prev.slot.validator
                )));
            }
        }
        if !all_votes.has_quorum() {
            return Err(self.non_convergence(format!(
                "root {} is not forkless-caused by a quorum of frame {} roots",
                root.id.short(),
                root.slot.frame - 1
            )));
        }

        let yes = yes_votes.sum() >= no_votes.sum();
        Ok(Vote {
            decided: yes_votes.has_quorum() || no_votes.has_quorum(),
            yes,
            observed_root: if yes { subject_root } else { None },
        })
    }

    /// The Atropos if every slot is decided, in validator order.
    fn choose_atropos(&self) -> ConsensusResult<Option<ElectionDecision>> {
        for validator in self.validators.ids() {
            let Some(vote) = self.decided_roots.get(&validator) else {
                return Ok(None);
            };
            if vote.yes {
                if let Some(atropos) = vote.observed_root {
                    trace!(frame = self.frame_to_decide, validator, "atropos chosen");
                    return Ok(Some(ElectionDecision {
                        frame: self.frame_to_decide,
                        atropos,
                    }));
                }
            }
        }
        Err(self.non_convergence("every root is decided as 'no'".to_string()))
    }

    fn not_decided(&self) -> Vec<ValidatorId> {
        self.validators
            .ids()
            .filter(|id| !self.decided_roots.contains_key(id))
            .collect()
    }

    fn observed_roots(
        &self,
        root: &EventId,
        frame: Frame,
        dag: &dyn ElectionDag,
    ) -> ConsensusResult<Vec<RootAndSlot>> {
        let mut observed = Vec::new();
        for candidate in dag.frame_roots(frame)? {
            if dag.forkless_cause(&candidate.id, root)? {
                observed.push(candidate);
            }
        }
        Ok(observed)
    }

    fn non_convergence(&self, reason: String) -> ConsensusError {
        ConsensusError::ElectionNonConvergence {
            frame: self.frame_to_decide,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roots::Slot;
    use poset_types::{Validator, H256};
    use std::collections::HashSet;

    #[derive(Default)]
    struct FakeDag {
        roots: HashMap<Frame, Vec<RootAndSlot>>,
        causes: HashSet<(EventId, EventId)>,
    }

    impl FakeDag {
        fn root(&mut self, frame: Frame, validator: ValidatorId) -> RootAndSlot {
            let root = RootAndSlot {
                id: EventId::new(1, frame, &H256::keccak256(&[frame as u8, validator as u8])),
                slot: Slot { frame, validator },
            };
            self.roots.entry(frame).or_default().push(root);
            root
        }

        fn cause(&mut self, a: &RootAndSlot, b: &RootAndSlot) {
            self.causes.insert((a.id, b.id));
        }
    }

    impl ElectionDag for FakeDag {
        fn forkless_cause(&self, a: &EventId, b: &EventId) -> ConsensusResult<bool> {
            Ok(self.causes.contains(&(*a, *b)))
        }

        fn frame_roots(&self, frame: Frame) -> ConsensusResult<Vec<RootAndSlot>> {
            Ok(self.roots.get(&frame).cloned().unwrap_or_default())
        }
    }

    /// Three frames of roots, every root observing the listed roots of the previous frame.
    fn build(
        validators: &[ValidatorId],
        observed: impl Fn(Frame, ValidatorId, ValidatorId) -> bool,
    ) -> (FakeDag, Vec<RootAndSlot>) {
        let mut dag = FakeDag::default();
        let mut all = Vec::new();
        for frame in 1..=3 {
            for &v in validators {
                let root = dag.root(frame, v);
                if frame > 1 {
                    for prev in dag.roots[&(frame - 1)].clone() {
                        if observed(frame, v, prev.slot.validator) {
                            dag.cause(&prev, &root);
                        }
                    }
                }
                all.push(root);
            }
        }
        (dag, all)
    }

    #[test]
    fn test_decides_first_validator_in_order() {
        let validators = Arc::new(
            ValidatorSet::new(vec![
                Validator::new(1, 1),
                Validator::new(2, 1),
                Validator::new(3, 5),
                Validator::new(4, 1),
            ])
            .unwrap(),
        );
        let (dag, roots) = build(&[1, 2, 3, 4], |_, _, _| true);

        let mut election = Election::new(validators, 1);
        let mut decision = None;
        for root in &roots {
            if let Some(d) = election.process_root(root, &dag).unwrap() {
                decision = Some(d);
                break;
            }
        }
        let decision = decision.unwrap();
        assert_eq!(decision.frame, 1);
        assert_eq!(decision.atropos, dag.roots[&1][2].id);
    }

    #[test]
    fn test_skips_validator_decided_no() {
        let validators = Arc::new(ValidatorSet::equal(4).unwrap());
        // nobody observes validator 1's frame 1 root
        let (dag, _) = build(&[1, 2, 3, 4], |frame, _, prev| frame != 2 || prev != 1);

        let mut election = Election::new(validators, 1);
        let decision = election.process_known_roots(&dag).unwrap().unwrap();
        assert_eq!(decision.atropos, dag.roots[&1][1].id);
    }

    #[test]
    fn test_undecided_without_enough_rounds() {
        let validators = Arc::new(ValidatorSet::equal(4).unwrap());
        let (mut dag, _) = build(&[1, 2, 3, 4], |_, _, _| true);
        dag.roots.remove(&3);

        let mut election = Election::new(validators.clone(), 1);
        assert!(election.process_known_roots(&dag).unwrap().is_none());

        election.reset(validators, 2);
        assert_eq!(election.frame_to_decide(), 2);
        assert!(election.process_known_roots(&dag).unwrap().is_none());
    }

    #[test]
    fn test_all_no_is_fatal() {
        let validators = Arc::new(ValidatorSet::equal(4).unwrap());
        let (dag, _) = build(&[1, 2, 3, 4], |frame, _, _| frame != 2);

        let mut election = Election::new(validators, 1);
        let err = election.process_known_roots(&dag).unwrap_err();
        assert!(err.is_fatal());
    }
}
