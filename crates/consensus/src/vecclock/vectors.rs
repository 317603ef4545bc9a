//! Vector types of the vector clock.
//!
//! Vectors are indexed by branch. Every validator owns one branch from the
//! start of the epoch; every detected fork of a validator adds another.

use poset_types::{Seq, Timestamp};
use serde::{Deserialize, Serialize};

/// The highest and lowest sequence numbers of one branch observed by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BranchSeq {
    /// Highest observed seq, 0 if nothing observed
    pub seq: Seq,
    /// Lowest observed seq
    pub min_seq: Seq,
}

impl BranchSeq {
    /// Sentinel marking a branch whose creator is seen forking.
    pub const FORK_DETECTED: Self = Self {
        seq: 0,
        min_seq: Seq::MAX,
    };

    /// Observation of a single event.
    pub const fn single(seq: Seq) -> Self {
        Self { seq, min_seq: seq }
    }

    /// Whether this is the fork sentinel.
    pub fn is_fork_detected(&self) -> bool {
        *self == Self::FORK_DETECTED
    }

    /// Whether nothing is observed on the branch.
    pub fn is_empty(&self) -> bool {
        self.seq == 0 && !self.is_fork_detected()
    }
}

/// What an event observes of every branch: per branch the highest observed
/// seq and the creation time of that observed event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HighestBefore {
    seqs: Vec<BranchSeq>,
    times: Vec<Timestamp>,
}

impl HighestBefore {
    /// Creates an empty vector sized for `branches` branches.
    pub fn new(branches: usize) -> Self {
        Self {
            seqs: vec![BranchSeq::default(); branches],
            times: vec![0; branches],
        }
    }

    /// Number of branches the vector covers.
    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    /// Whether the vector covers no branch.
    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    /// Observation of `branch`.
    pub fn get(&self, branch: usize) -> BranchSeq {
        self.seqs.get(branch).copied().unwrap_or_default()
    }

    /// Creation time of the highest observed event of `branch`.
    pub fn get_time(&self, branch: usize) -> Timestamp {
        self.times.get(branch).copied().unwrap_or_default()
    }

    /// Sets the observation of `branch`.
    pub fn set(&mut self, branch: usize, seq: BranchSeq, time: Timestamp) {
        self.grow(branch);
        self.seqs[branch] = seq;
        self.times[branch] = time;
    }

    /// Marks `branch` as forked.
    pub fn set_fork_detected(&mut self, branch: usize) {
        self.set(branch, BranchSeq::FORK_DETECTED, 0);
    }

    /// Merges the observations of a parent into this vector.
    pub fn collect_from(&mut self, other: &HighestBefore, branches: usize) {
        for branch in 0..branches {
            let his = other.get(branch);
            if his.is_empty() {
                continue;
            }
            let mut mine = self.get(branch);
            if mine.is_fork_detected() {
                continue;
            }
            if his.is_fork_detected() {
                self.set_fork_detected(branch);
                continue;
            }
            let mut time = self.get_time(branch);
            if mine.seq == 0 || mine.min_seq > his.min_seq {
                mine.min_seq = his.min_seq;
            }
            if mine.seq < his.seq {
                mine.seq = his.seq;
                time = other.get_time(branch);
            }
            self.set(branch, mine, time);
        }
    }

    fn grow(&mut self, branch: usize) {
        if branch >= self.seqs.len() {
            self.seqs.resize(branch + 1, BranchSeq::default());
            self.times.resize(branch + 1, 0);
        }
    }
}

/// The seq of the first event of every branch that observes an event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LowestAfter {
    seqs: Vec<Seq>,
}

impl LowestAfter {
    /// Creates an empty vector sized for `branches` branches.
    pub fn new(branches: usize) -> Self {
        Self {
            seqs: vec![0; branches],
        }
    }

    /// Lowest observing seq on `branch`, 0 if none.
    pub fn get(&self, branch: usize) -> Seq {
        self.seqs.get(branch).copied().unwrap_or_default()
    }

    /// Records that `seq` on `branch` observes the event, unless an earlier
    /// event of that branch already does. Returns whether it was recorded.
    pub fn visit(&mut self, branch: usize, seq: Seq) -> bool {
        if self.get(branch) != 0 {
            return false;
        }
        if branch >= self.seqs.len() {
            self.seqs.resize(branch + 1, 0);
        }
        self.seqs[branch] = seq;
        true
    }
}

/// Branch bookkeeping of one epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchesInfo {
    /// Last seq seen on every branch
    pub last_seq: Vec<Seq>,
    /// Creator (validator index) owning every branch
    pub creator_idx: Vec<usize>,
    /// Branches of every creator (validator index), the first being the creator's own index
    pub by_creator: Vec<Vec<usize>>,
}

impl BranchesInfo {
    /// One branch per validator.
    pub fn new(validators: usize) -> Self {
        Self {
            last_seq: vec![0; validators],
            creator_idx: (0..validators).collect(),
            by_creator: (0..validators).map(|idx| vec![idx]).collect(),
        }
    }

    /// Number of branches.
    pub fn len(&self) -> usize {
        self.creator_idx.len()
    }

    /// Whether there are no branches.
    pub fn is_empty(&self) -> bool {
        self.creator_idx.is_empty()
    }

    /// Whether any validator forked in this epoch.
    pub fn at_least_one_fork(&self) -> bool {
        self.creator_idx.len() > self.by_creator.len()
    }

    /// Opens a new branch for `creator_idx` starting at `seq`.
    pub fn add_branch(&mut self, creator_idx: usize, seq: Seq) -> usize {
        let branch = self.creator_idx.len();
        self.last_seq.push(seq);
        self.creator_idx.push(creator_idx);
        self.by_creator[creator_idx].push(branch);
        branch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_from_takes_highest_and_lowest() {
        let mut mine = HighestBefore::new(3);
        mine.set(0, BranchSeq { seq: 3, min_seq: 2 }, 30);
        mine.set(1, BranchSeq::single(1), 10);

        let mut his = HighestBefore::new(3);
        his.set(0, BranchSeq { seq: 5, min_seq: 1 }, 50);
        his.set(1, BranchSeq::single(1), 11);
        his.set(2, BranchSeq::single(4), 40);

        mine.collect_from(&his, 3);
        assert_eq!(mine.get(0), BranchSeq { seq: 5, min_seq: 1 });
        assert_eq!(mine.get_time(0), 50);
        assert_eq!(mine.get(1), BranchSeq::single(1));
        assert_eq!(mine.get_time(1), 10);
        assert_eq!(mine.get(2), BranchSeq::single(4));
    }

    #[test]
    fn test_fork_detected_is_sticky() {
        let mut mine = HighestBefore::new(2);
        mine.set(0, BranchSeq::single(2), 20);

        let mut his = HighestBefore::new(2);
        his.set_fork_detected(0);
        mine.collect_from(&his, 2);
        assert!(mine.get(0).is_fork_detected());

        let mut later = HighestBefore::new(2);
        later.set(0, BranchSeq::single(9), 90);
        mine.collect_from(&later, 2);
        assert!(mine.get(0).is_fork_detected());
        assert!(!mine.get(0).is_empty());
    }

    #[test]
    fn test_lowest_after_visit_once() {
        let mut la = LowestAfter::new(1);
        assert!(la.visit(2, 5));
        assert!(!la.visit(2, 7));
        assert_eq!(la.get(2), 5);
        assert_eq!(la.get(0), 0);
    }

    #[test]
    fn test_branches() {
        let mut info = BranchesInfo::new(3);
        assert!(!info.at_least_one_fork());
        let branch = info.add_branch(1, 4);
        assert_eq!(branch, 3);
        assert!(info.at_least_one_fork());
        assert_eq!(info.by_creator[1], vec![1, 3]);
        assert_eq!(info.creator_idx[3], 1);
    }
}
