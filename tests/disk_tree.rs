//! Integration tests for the disk B+tree: bulk insertion across many
//! node splits, replacement, persistence across reopen, and the limits
//! on key and record sizes.

use coffer::{BTree, Config};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::tempdir;

fn key_for(i: u32) -> Vec<u8> {
    format!("user:{i:08}").into_bytes()
}

fn value_for(i: u32) -> Vec<u8> {
    format!("record payload number {i}").into_bytes()
}

#[test]
fn a_thousand_keys_survive_splits_and_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tree.dat");

    {
        let mut tree = BTree::open(&path, Config::default()).unwrap();
        for i in 0..1000 {
            tree.insert(&key_for(i), &value_for(i)).unwrap();
        }
        assert_eq!(tree.record_count(), 1000);
        tree.close().unwrap();
    }

    let mut tree = BTree::open(&path, Config::default()).unwrap();
    for i in 0..1000 {
        assert_eq!(
            tree.find(&key_for(i)).unwrap(),
            Some(value_for(i)),
            "key {i} lost after reopen"
        );
    }
    assert!(tree.find(b"user:99999999").unwrap().is_none());
    assert_eq!(tree.record_count(), 1000);
    tree.close().unwrap();
}

#[test]
fn shuffled_insertion_order_reaches_every_key() {
    let dir = tempdir().unwrap();
    let mut tree = BTree::open(dir.path().join("tree.dat"), Config::default()).unwrap();

    let mut order: Vec<u32> = (0..600).collect();
    order.shuffle(&mut rand::rngs::StdRng::seed_from_u64(41));

    for &i in &order {
        tree.insert(&key_for(i), &value_for(i)).unwrap();
    }

    for i in 0..600 {
        assert_eq!(tree.find(&key_for(i)).unwrap(), Some(value_for(i)));
    }
    tree.close().unwrap();
}

#[test]
fn replacement_keeps_one_record_per_key() {
    let dir = tempdir().unwrap();
    let mut tree = BTree::open(dir.path().join("tree.dat"), Config::default()).unwrap();

    for i in 0..200 {
        tree.insert(&key_for(i), b"old").unwrap();
    }
    for i in 0..200 {
        tree.insert(&key_for(i), &value_for(i)).unwrap();
    }

    assert_eq!(tree.record_count(), 200);
    for i in 0..200 {
        assert_eq!(tree.find(&key_for(i)).unwrap(), Some(value_for(i)));
    }
    tree.close().unwrap();
}

#[test]
fn small_pages_force_deep_trees() {
    let dir = tempdir().unwrap();
    let config = Config {
        page_size: 256,
        page_header_size: 64,
        max_key_size: 32,
        ..Config::default()
    };
    let mut tree = BTree::open(dir.path().join("tree.dat"), config).unwrap();

    for i in 0..400 {
        tree.insert(&key_for(i), &i.to_be_bytes()).unwrap();
    }

    for i in 0..400u32 {
        assert_eq!(
            tree.find(&key_for(i)).unwrap(),
            Some(i.to_be_bytes().to_vec())
        );
    }
    tree.close().unwrap();
}

#[test]
fn oversized_records_are_rejected() {
    let dir = tempdir().unwrap();
    let mut tree = BTree::open(dir.path().join("tree.dat"), Config::default()).unwrap();

    let too_long_key = vec![b'k'; 257];
    assert!(tree.insert(&too_long_key, b"v").is_err());

    let huge_record = vec![0u8; 8192];
    assert!(tree.insert(b"key", &huge_record).is_err());

    tree.insert(b"key", b"fits").unwrap();
    assert_eq!(tree.find(b"key").unwrap(), Some(b"fits".to_vec()));
    tree.close().unwrap();
}
