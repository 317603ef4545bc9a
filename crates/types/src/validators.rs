//! Weighted validator sets.
//!
//! A [`ValidatorSet`] is kept sorted by weight (descending) and then by ID
//! (ascending). That order is part of consensus: it assigns the positional
//! index used by vector clocks and decides which validator's root is
//! considered first when choosing an Atropos.

use crate::idx::{ValidatorId, Weight};
use crate::{Error, Result, H256};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::collections::HashMap;

/// A validator and its voting weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Validator {
    /// Validator identifier
    pub id: ValidatorId,
    /// Voting weight
    pub weight: Weight,
}

impl Validator {
    /// Creates a validator.
    pub const fn new(id: ValidatorId, weight: Weight) -> Self {
        Self { id, weight }
    }
}

/// Set of validators of one epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Validator>", into = "Vec<Validator>")]
pub struct ValidatorSet {
    validators: Vec<Validator>,
    total_weight: Weight,
    indexes: HashMap<ValidatorId, usize>,
}

impl ValidatorSet {
    /// Builds a set, sorting validators into consensus order.
    ///
    /// Fails on an empty list, a duplicated ID, a zero weight or a total
    /// weight that overflows.
    pub fn new(mut validators: Vec<Validator>) -> Result<Self> {
        if validators.is_empty() {
            return Err(Error::InvalidValidatorSet("empty validator set".into()));
        }
        validators.sort_by(|a, b| b.weight.cmp(&a.weight).then(a.id.cmp(&b.id)));

        let mut indexes = HashMap::with_capacity(validators.len());
        let mut total_weight: Weight = 0;
        for (idx, v) in validators.iter().enumerate() {
            if v.weight == 0 {
                return Err(Error::InvalidValidatorSet(format!(
                    "validator {} has zero weight",
                    v.id
                )));
            }
            if indexes.insert(v.id, idx).is_some() {
                return Err(Error::InvalidValidatorSet(format!(
                    "duplicate validator {}",
                    v.id
                )));
            }
            total_weight = total_weight.checked_add(v.weight).ok_or_else(|| {
                Error::InvalidValidatorSet("total weight overflows".into())
            })?;
        }

        Ok(Self {
            validators,
            total_weight,
            indexes,
        })
    }

    /// Builds a set of `n` validators with IDs `1..=n` and weight 1 each.
    pub fn equal(n: u32) -> Result<Self> {
        Self::new((1..=n).map(|id| Validator::new(id, 1)).collect())
    }

    /// Number of validators.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Whether the set is empty. Never true for a constructed set.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Sum of all weights.
    pub fn total_weight(&self) -> Weight {
        self.total_weight
    }

    /// Weight required for a quorum: strictly more than 2/3 of the total.
    pub fn quorum(&self) -> Weight {
        (u128::from(self.total_weight) * 2 / 3) as Weight + 1
    }

    /// Weight of a validator, 0 if unknown.
    pub fn weight(&self, id: ValidatorId) -> Weight {
        self.get_idx(id)
            .map(|idx| self.validators[idx].weight)
            .unwrap_or(0)
    }

    /// Positional index of a validator.
    pub fn get_idx(&self, id: ValidatorId) -> Option<usize> {
        self.indexes.get(&id).copied()
    }

    /// Validator at a positional index.
    pub fn get_by_idx(&self, idx: usize) -> Option<&Validator> {
        self.validators.get(idx)
    }

    /// Whether `id` belongs to the set.
    pub fn contains(&self, id: ValidatorId) -> bool {
        self.indexes.contains_key(&id)
    }

    /// Validators in consensus order.
    pub fn iter(&self) -> impl Iterator<Item = &Validator> {
        self.validators.iter()
    }

    /// Validator IDs in consensus order.
    pub fn ids(&self) -> impl Iterator<Item = ValidatorId> + '_ {
        self.validators.iter().map(|v| v.id)
    }

    /// Starts a weight counter over this set.
    pub fn new_counter(&self) -> WeightCounter<'_> {
        WeightCounter::new(self)
    }

    /// Keccak256 over `count || (id || weight)*` in consensus order.
    pub fn hash(&self) -> H256 {
        let mut hasher = Keccak256::new();
        hasher.update((self.validators.len() as u64).to_be_bytes());
        for v in &self.validators {
            hasher.update(v.id.to_be_bytes());
            hasher.update(v.weight.to_be_bytes());
        }
        H256::new(hasher.finalize().into())
    }
}

impl TryFrom<Vec<Validator>> for ValidatorSet {
    type Error = Error;

    fn try_from(validators: Vec<Validator>) -> Result<Self> {
        Self::new(validators)
    }
}

impl From<ValidatorSet> for Vec<Validator> {
    fn from(set: ValidatorSet) -> Self {
        set.validators
    }
}

impl Encodable for ValidatorSet {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(self.validators.len());
        for v in &self.validators {
            s.begin_list(2);
            s.append(&v.id);
            s.append(&v.weight);
        }
    }
}

impl Decodable for ValidatorSet {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        let mut validators = Vec::with_capacity(rlp.item_count()?);
        for item in rlp.iter() {
            if item.item_count()? != 2 {
                return Err(DecoderError::RlpIncorrectListLen);
            }
            validators.push(Validator::new(item.val_at(0)?, item.val_at(1)?));
        }
        Self::new(validators).map_err(|_| DecoderError::Custom("invalid validator set"))
    }
}

/// Accumulates the weight of distinct validators.
///
/// Each validator is counted at most once, so several forked events of one
/// creator never add up to more than its weight.
#[derive(Debug, Clone)]
pub struct WeightCounter<'a> {
    validators: &'a ValidatorSet,
    counted: Vec<bool>,
    sum: Weight,
}

impl<'a> WeightCounter<'a> {
    fn new(validators: &'a ValidatorSet) -> Self {
        Self {
            validators,
            counted: vec![false; validators.len()],
            sum: 0,
        }
    }

    /// Counts a validator by ID. Returns false if unknown or already counted.
    pub fn count(&mut self, id: ValidatorId) -> bool {
        match self.validators.get_idx(id) {
            Some(idx) => self.count_by_idx(idx),
            None => false,
        }
    }

    /// Counts a validator by positional index. Returns false if already counted.
    pub fn count_by_idx(&mut self, idx: usize) -> bool {
        match self.counted.get_mut(idx) {
            Some(counted) if !*counted => {
                *counted = true;
                self.sum += self.validators.validators[idx].weight;
                true
            }
            _ => false,
        }
    }

    /// Accumulated weight.
    pub fn sum(&self) -> Weight {
        self.sum
    }

    /// Whether the accumulated weight reached the quorum.
    pub fn has_quorum(&self) -> bool {
        self.sum >= self.validators.quorum()
    }
}
