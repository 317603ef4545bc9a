//! Tests for events, blocks and their serialized forms

use bytes::Bytes;
use poset_types::{
    transactions_hash, Block, Event, EventHeader, EventId, GasPowerLeft, ValidatorSet, H256,
    LONG_TERM_GAS, SHORT_TERM_GAS,
};

fn header_with_parents(seq: u32, parents: Vec<EventId>) -> EventHeader {
    let mut header = EventHeader::new(3, 2, seq, parents);
    header.lamport = header.parents.iter().map(|p| p.lamport()).max().unwrap_or(0) + 1;
    header
}

#[test]
fn test_event_id_carries_epoch_and_lamport() {
    let parent = Event::new(header_with_parents(1, vec![]), vec![]);
    let child = Event::new(header_with_parents(2, vec![parent.id()]), vec![]);

    assert_eq!(parent.id().epoch(), 3);
    assert_eq!(parent.id().lamport(), 1);
    assert_eq!(child.id().lamport(), 2);
    assert!(parent.id() < child.id());
    assert_eq!(child.header().self_parent(), Some(&parent.id()));
}

#[test]
fn test_payload_changes_id() {
    let header = header_with_parents(1, vec![]);
    let empty = Event::new(header.clone(), vec![]);
    let full = Event::new(header, vec![Bytes::from_static(b"tx")]);

    assert!(empty.header().tx_hash.is_zero());
    assert_eq!(
        full.header().tx_hash,
        transactions_hash(&[Bytes::from_static(b"tx")])
    );
    assert_ne!(empty.id(), full.id());
    assert_eq!(full.transactions().len(), 1);
}

#[test]
fn test_transactions_hash_is_length_prefixed() {
    let split = transactions_hash(&[Bytes::from_static(b"ab"), Bytes::from_static(b"c")]);
    let joined = transactions_hash(&[Bytes::from_static(b"a"), Bytes::from_static(b"bc")]);
    assert_ne!(split, joined);
}

#[test]
fn test_event_serde_round_trip() {
    let mut header = header_with_parents(1, vec![]);
    header.gas_power_left = GasPowerLeft::new(10, 20);
    header.extra = b"extra".to_vec();
    let event = Event::new(header, vec![Bytes::from_static(b"payload")]);

    let json = serde_json::to_string(&event).unwrap();
    let decoded: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, event);
    assert_eq!(decoded.header().calc_id(), event.id());

    let bin = bincode::serialize(&event).unwrap();
    let decoded: Event = bincode::deserialize(&bin).unwrap();
    assert_eq!(decoded.id(), event.id());
}

#[test]
fn test_gas_power_left() {
    let left = GasPowerLeft::new(100, 40);
    assert_eq!(left.min(), 40);
    assert_eq!(left.gas[SHORT_TERM_GAS], 100);
    assert_eq!(left.gas[LONG_TERM_GAS], 40);
    assert_eq!(left.checked_sub(40), Some(GasPowerLeft::new(60, 0)));
    assert_eq!(left.checked_sub(41), None);

    let encoded = rlp::encode(&left);
    assert_eq!(rlp::decode::<GasPowerLeft>(&encoded).unwrap(), left);
}

#[test]
fn test_block() {
    let atropos = EventId::new(1, 9, &H256::keccak256(b"atropos"));
    let block = Block {
        number: 4,
        timestamp: 1_000,
        frame: 4,
        atropos,
        events: vec![],
        cheaters: vec![],
    };
    assert!(block.is_empty());

    let json = serde_json::to_string(&block).unwrap();
    let decoded: Block = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, block);
}

#[test]
fn test_validator_set_hash_follows_content() {
    let a = ValidatorSet::equal(4).unwrap();
    let b = ValidatorSet::equal(4).unwrap();
    let c = ValidatorSet::equal(5).unwrap();
    assert_eq!(a.hash(), b.hash());
    assert_ne!(a.hash(), c.hash());
}
