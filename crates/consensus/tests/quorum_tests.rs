//! Property tests for quorum arithmetic, agreement under random weights and
//! the absence of decisions below the quorum.

mod common;

use common::{build_dag, gen_config, genesis, replay, TestApp};
use poset_consensus::GenConfig;
use poset_consensus::random_topological_order;
use poset_types::{Validator, ValidatorSet, Weight};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn validator_set(weights: &[Weight]) -> ValidatorSet {
    ValidatorSet::new(
        weights
            .iter()
            .enumerate()
            .map(|(i, &w)| Validator::new(i as u32 + 1, w))
            .collect(),
    )
    .unwrap()
}

fn counted(validators: &ValidatorSet, members: &[bool]) -> (Weight, bool) {
    let mut counter = validators.new_counter();
    for (id, _) in validators.ids().zip(members).filter(|(_, &m)| m) {
        counter.count(id);
    }
    (counter.sum(), counter.has_quorum())
}

proptest! {
    #[test]
    fn quorum_is_more_than_two_thirds(weights in prop::collection::vec(1u64..1_000, 1..30)) {
        let validators = validator_set(&weights);
        let total = validators.total_weight();
        prop_assert_eq!(total, weights.iter().sum::<u64>());
        prop_assert!(validators.quorum() * 3 > total * 2);
        prop_assert!((validators.quorum() - 1) * 3 <= total * 2);
    }

    #[test]
    fn two_quorums_share_honest_weight(
        weights in prop::collection::vec(1u64..1_000, 1..30),
        a in prop::collection::vec(any::<bool>(), 30),
        b in prop::collection::vec(any::<bool>(), 30),
    ) {
        let validators = validator_set(&weights);
        let (sum_a, quorum_a) = counted(&validators, &a);
        let (sum_b, quorum_b) = counted(&validators, &b);
        prop_assert_eq!(quorum_a, sum_a >= validators.quorum());
        prop_assert_eq!(quorum_b, sum_b >= validators.quorum());

        if quorum_a && quorum_b {
            let both: Vec<bool> = a.iter().zip(&b).map(|(x, y)| *x && *y).collect();
            let (shared, _) = counted(&validators, &both);
            // more than any faulty third
            prop_assert!(shared * 3 > validators.total_weight());
        }
    }

    #[test]
    fn counting_twice_adds_nothing(weights in prop::collection::vec(1u64..1_000, 1..10)) {
        let validators = validator_set(&weights);
        let mut counter = validators.new_counter();
        for id in validators.ids() {
            prop_assert!(counter.count(id));
            prop_assert!(!counter.count(id));
        }
        prop_assert_eq!(counter.sum(), validators.total_weight());
        prop_assert!(counter.has_quorum());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(6))]

    #[test]
    fn weighted_networks_agree(
        weights in prop::collection::vec(1u64..100, 4..6),
        seed in any::<u64>(),
    ) {
        let validators = validator_set(&weights);
        let genesis = genesis(validators.clone());
        let config = gen_config(weights.len() as u32, 30, 3);
        let (reference, source, events) =
            build_dag(&genesis, &config, seed, TestApp::new(validators.clone()));

        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));
        let ordered = random_topological_order(&events, &mut rng);
        let instance = replay(&genesis, source, &ordered, TestApp::new(validators));
        prop_assert_eq!(&instance.callbacks().blocks, &reference.callbacks().blocks);
        prop_assert_eq!(instance.checkpoint(), reference.checkpoint());
    }
}

/// Picks the validators marked in `members` while their weight stays below
/// the quorum.
fn sub_quorum_creators(validators: &ValidatorSet, members: &[bool]) -> Vec<u32> {
    let mut weight: Weight = 0;
    let mut creators = Vec::new();
    for (validator, _) in validators.iter().zip(members).filter(|(_, &m)| m) {
        if weight + validator.weight < validators.quorum() {
            weight += validator.weight;
            creators.push(validator.id);
        }
    }
    creators
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn no_frame_decided_below_quorum(
        weights in prop::collection::vec(1u64..100, 3..8),
        members in prop::collection::vec(any::<bool>(), 8),
        seed in any::<u64>(),
    ) {
        let validators = validator_set(&weights);
        let creators = sub_quorum_creators(&validators, &members);
        prop_assume!(!creators.is_empty());

        let config = GenConfig {
            creators: creators.clone(),
            ..gen_config(weights.len() as u32, 20, 3)
        };
        let (poset, _, events) =
            build_dag(&genesis(validators.clone()), &config, seed, TestApp::new(validators));

        prop_assert_eq!(events.len(), creators.len() * 20);
        prop_assert!(poset.callbacks().blocks.is_empty());
        prop_assert_eq!(poset.last_block(), 0);
        prop_assert_eq!(poset.last_decided_frame(), 0);
        prop_assert_eq!(poset.frame_roots(1).unwrap().len(), creators.len());
        prop_assert!(poset.frame_roots(2).unwrap().is_empty());
        prop_assert!(events.iter().all(|e| e.header().frame == 1));
    }
}
