//! End-to-end tests for the B+Tree index: build, insert, scan, reopen.

use std::path::Path;

use pagedindex::index::btree::node::{InternalNode, LeafNode};
use pagedindex::relation::tuple_with_key;
use pagedindex::{
    AttrType, BTreeIndex, Error, IndexConfig, MemoryRelation, Operator, PageId, RecordId,
};
use tempfile::tempdir;

const TUPLE_LEN: usize = 16;
const KEY_OFFSET: usize = 8;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn small_config() -> IndexConfig {
    IndexConfig::default()
        .with_pool_size(40)
        .with_leaf_capacity(3)
        .with_internal_capacity(3)
}

fn relation(keys: &[i32]) -> (MemoryRelation, Vec<RecordId>) {
    let mut relation = MemoryRelation::new("emp");
    let rids = keys
        .iter()
        .map(|&k| relation.push_record(tuple_with_key(TUPLE_LEN, KEY_OFFSET, k)))
        .collect();
    (relation, rids)
}

fn build(dir: &Path, keys: &[i32], config: IndexConfig) -> (BTreeIndex, Vec<RecordId>) {
    let (mut source, rids) = relation(keys);
    let index = BTreeIndex::open_or_create(
        dir,
        "emp",
        KEY_OFFSET as i32,
        AttrType::Integer,
        &mut source,
        config,
    )
    .unwrap();
    (index, rids)
}

fn drain(index: &mut BTreeIndex) -> Vec<RecordId> {
    let mut out = Vec::new();
    loop {
        match index.scan_next() {
            Ok(rid) => out.push(rid),
            Err(Error::ScanCompleted) => return out,
            Err(err) => panic!("unexpected scan error: {}", err),
        }
    }
}

fn leaf_at(index: &BTreeIndex, page_id: PageId) -> LeafNode {
    let guard = index.buffer_pool().fetch_page_read(page_id).unwrap();
    LeafNode::decode(&guard, page_id, index.leaf_capacity()).unwrap()
}

fn internal_at(index: &BTreeIndex, page_id: PageId) -> InternalNode {
    let guard = index.buffer_pool().fetch_page_read(page_id).unwrap();
    InternalNode::decode(&guard, page_id, index.internal_capacity()).unwrap()
}

// ============================================================================
// Insert and structure
// ============================================================================

#[test]
fn test_four_keys_split_into_two_leaves() {
    init_tracing();
    let dir = tempdir().unwrap();
    let (mut index, _) = build(dir.path(), &[], small_config());

    for (i, k) in [10, 20, 30, 40].into_iter().enumerate() {
        let rid = RecordId::new(PageId::new(1), i as u16);
        index.insert_entry(k, rid).unwrap();
    }

    assert_eq!(index.height(), 2);
    let root = internal_at(&index, index.root_page_id());
    assert_eq!(root.keys, vec![30]);

    let left = leaf_at(&index, root.children[0]);
    let right = leaf_at(&index, root.children[1]);
    assert_eq!(left.keys, vec![10, 20]);
    assert_eq!(right.keys, vec![30, 40]);
    assert_eq!(left.right_sibling, Some(root.children[1]));

    let stats = index.verify().unwrap();
    assert_eq!(stats.height, 2);
    assert_eq!(stats.leaf_pages, 2);
    assert_eq!(stats.internal_pages, 1);
    assert_eq!(stats.entries, 4);
    assert_eq!(index.buffer_pool().pinned_total(), 0);
}

#[test]
fn test_many_inserts_keep_tree_valid() {
    let dir = tempdir().unwrap();
    let keys: Vec<i32> = (0..600).map(|i| (i * 7919) % 1000 - 500).collect();
    let (index, _) = build(dir.path(), &keys, small_config());

    let stats = index.verify().unwrap();
    assert_eq!(stats.entries, keys.len());
    assert!(stats.height >= 4);

    let mut sorted = keys.clone();
    sorted.sort();
    let stored: Vec<i32> = index.leaf_entries().unwrap().into_iter().map(|(k, _)| k).collect();
    assert_eq!(stored, sorted);
    assert_eq!(index.buffer_pool().pinned_total(), 0);
}

#[test]
fn test_extreme_keys() {
    let dir = tempdir().unwrap();
    let keys = [i32::MAX, 0, i32::MIN, -1, 1, i32::MIN, i32::MAX];
    let (mut index, _) = build(dir.path(), &keys, small_config());

    index.verify().unwrap();
    let all = index
        .scan_range(i32::MIN, Operator::Gte, i32::MAX, Operator::Lte)
        .unwrap();
    assert_eq!(all.len(), keys.len());

    let strict = index
        .scan_range(i32::MIN, Operator::Gt, i32::MAX, Operator::Lt)
        .unwrap();
    assert_eq!(strict.len(), 3);
}

// ============================================================================
// Duplicates
// ============================================================================

#[test]
fn test_duplicates_in_one_leaf_scan_in_arrival_order() {
    let dir = tempdir().unwrap();
    let (mut index, rids) = build(dir.path(), &[5, 5, 5], small_config());

    assert_eq!(index.height(), 1);
    index.start_scan(5, Operator::Gte, 5, Operator::Lte).unwrap();
    assert_eq!(drain(&mut index), rids);
    index.end_scan().unwrap();
}

#[test]
fn test_scan_finds_keys_equal_to_separator_in_left_leaf() {
    let dir = tempdir().unwrap();
    let (mut index, rids) = build(dir.path(), &[5, 5, 5, 5], small_config());

    // Both leaves hold {5, 5} under a root separator of 5.
    assert_eq!(index.height(), 2);
    assert_eq!(index.verify().unwrap().leaf_pages, 2);

    index.start_scan(5, Operator::Gte, 5, Operator::Lte).unwrap();
    assert_eq!(drain(&mut index), rids);
    index.end_scan().unwrap();

    assert_eq!(index.scan_range(4, Operator::Gt, 6, Operator::Lt).unwrap(), rids);
}

#[test]
fn test_duplicates_across_many_leaves() {
    let dir = tempdir().unwrap();
    let mut keys = vec![1, 2, 3, 20, 21];
    keys.extend(std::iter::repeat(7).take(40));
    keys.extend([0, 8, 9, 6]);
    let (mut index, rids) = build(dir.path(), &keys, small_config());

    index.verify().unwrap();
    let expected: Vec<RecordId> = keys
        .iter()
        .zip(&rids)
        .filter(|(k, _)| **k == 7)
        .map(|(_, rid)| *rid)
        .collect();

    index.start_scan(7, Operator::Gte, 7, Operator::Lte).unwrap();
    assert_eq!(drain(&mut index), expected);
    index.end_scan().unwrap();

    assert_eq!(index.scan_range(6, Operator::Gt, 8, Operator::Lt).unwrap().len(), 40);
    assert!(matches!(
        index.start_scan(7, Operator::Gt, 7, Operator::Lte),
        Err(Error::NoSuchKey)
    ));
}

// ============================================================================
// Scans
// ============================================================================

#[test]
fn test_range_scan_inclusive_bounds() {
    let dir = tempdir().unwrap();
    let (mut index, rids) = build(dir.path(), &[10, 20, 30, 40], small_config());

    index.start_scan(15, Operator::Gte, 35, Operator::Lte).unwrap();
    assert_eq!(index.scan_next().unwrap(), rids[1]);
    assert_eq!(index.scan_next().unwrap(), rids[2]);
    assert!(matches!(index.scan_next(), Err(Error::ScanCompleted)));
    assert!(matches!(index.scan_next(), Err(Error::ScanCompleted)));

    index.end_scan().unwrap();
    assert!(matches!(index.end_scan(), Err(Error::ScanNotInitialized)));
    assert!(matches!(index.scan_next(), Err(Error::ScanNotInitialized)));
}

#[test]
fn test_range_scan_operators() {
    let dir = tempdir().unwrap();
    let keys: Vec<i32> = (1..=50).collect();
    let (mut index, rids) = build(dir.path(), &keys, small_config());

    let check = |index: &mut BTreeIndex,
                 low: i32,
                 low_op: Operator,
                 high: i32,
                 high_op: Operator,
                 range: std::ops::RangeInclusive<usize>| {
        let got = index.scan_range(low, low_op, high, high_op).unwrap();
        let want: Vec<RecordId> = range.map(|k| rids[k - 1]).collect();
        assert_eq!(got, want, "{:?} {} .. {:?} {}", low_op, low, high_op, high);
    };

    check(&mut index, 10, Operator::Gte, 20, Operator::Lte, 10..=20);
    check(&mut index, 10, Operator::Gt, 20, Operator::Lte, 11..=20);
    check(&mut index, 10, Operator::Gte, 20, Operator::Lt, 10..=19);
    check(&mut index, 10, Operator::Gt, 20, Operator::Lt, 11..=19);
    check(&mut index, -100, Operator::Gt, 3, Operator::Lte, 1..=3);
    check(&mut index, 48, Operator::Gte, 1000, Operator::Lt, 48..=50);
}

#[test]
fn test_scan_holds_exactly_one_pin() {
    let dir = tempdir().unwrap();
    let keys: Vec<i32> = (0..100).collect();
    let (mut index, _) = build(dir.path(), &keys, small_config());

    index.start_scan(0, Operator::Gte, 99, Operator::Lte).unwrap();
    assert_eq!(index.buffer_pool().pinned_total(), 1);
    for _ in 0..60 {
        index.scan_next().unwrap();
        assert_eq!(index.buffer_pool().pinned_total(), 1);
    }

    // Restarting replaces the old cursor instead of stacking pins.
    index.start_scan(50, Operator::Gte, 60, Operator::Lte).unwrap();
    assert_eq!(index.buffer_pool().pinned_total(), 1);
    assert_eq!(drain(&mut index).len(), 11);
    assert_eq!(index.buffer_pool().pinned_total(), 1);

    index.end_scan().unwrap();
    assert_eq!(index.buffer_pool().pinned_total(), 0);
}

#[test]
fn test_empty_ranges_report_no_such_key() {
    let dir = tempdir().unwrap();
    let (mut index, _) = build(dir.path(), &[10, 20, 30, 40, 50], small_config());

    for (low, high) in [(21, 29), (51, 90), (-9, 9)] {
        assert!(matches!(
            index.start_scan(low, Operator::Gte, high, Operator::Lte),
            Err(Error::NoSuchKey)
        ));
        assert!(!index.is_scanning());
        assert_eq!(index.buffer_pool().pinned_total(), 0);
    }
    assert!(matches!(
        index.start_scan(20, Operator::Gt, 30, Operator::Lt),
        Err(Error::NoSuchKey)
    ));
    assert!(matches!(index.scan_next(), Err(Error::ScanNotInitialized)));
}

#[test]
fn test_scan_on_empty_index() {
    let dir = tempdir().unwrap();
    let (mut index, _) = build(dir.path(), &[], small_config());

    assert!(matches!(
        index.start_scan(i32::MIN, Operator::Gte, i32::MAX, Operator::Lte),
        Err(Error::NoSuchKey)
    ));
    assert_eq!(index.verify().unwrap().entries, 0);
}

#[test]
fn test_invalid_scan_arguments_keep_active_scan() {
    let dir = tempdir().unwrap();
    let (mut index, rids) = build(dir.path(), &[1, 2, 3, 4, 5], small_config());

    index.start_scan(1, Operator::Gte, 5, Operator::Lte).unwrap();
    assert_eq!(index.scan_next().unwrap(), rids[0]);

    assert!(matches!(
        index.start_scan(1, Operator::Lt, 5, Operator::Lte),
        Err(Error::BadOpcode)
    ));
    assert!(matches!(
        index.start_scan(1, Operator::Gte, 5, Operator::Gt),
        Err(Error::BadOpcode)
    ));
    assert!(matches!(
        index.start_scan(9, Operator::Gte, 5, Operator::Lte),
        Err(Error::BadScanRange { low: 9, high: 5 })
    ));

    assert!(index.is_scanning());
    assert_eq!(index.buffer_pool().pinned_total(), 1);
    assert_eq!(index.scan_next().unwrap(), rids[1]);
    index.end_scan().unwrap();
}

#[test]
fn test_bad_range_without_scan_pins_nothing() {
    let dir = tempdir().unwrap();
    let (mut index, _) = build(dir.path(), &[1, 2, 3], small_config());
    let reads = index.buffer_pool().stats().snapshot();

    assert!(matches!(
        index.start_scan(3, Operator::Gt, 2, Operator::Lt),
        Err(Error::BadScanRange { .. })
    ));
    assert_eq!(index.buffer_pool().pinned_total(), 0);
    let after = index.buffer_pool().stats().snapshot();
    assert_eq!(after.cache_hits + after.cache_misses, reads.cache_hits + reads.cache_misses);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_reopen_uses_stored_root_and_capacities() {
    let dir = tempdir().unwrap();
    let keys: Vec<i32> = (0..300).rev().collect();

    let (root, height) = {
        let (index, _) = build(dir.path(), &keys, small_config());
        (index.root_page_id(), index.height())
    };

    // Capacities in the config are ignored for an existing file.
    let (mut index, _) = build(dir.path(), &[], IndexConfig::default());
    assert_eq!(index.root_page_id(), root);
    assert_eq!(index.height(), height);
    assert_eq!(index.leaf_capacity(), 3);
    assert_eq!(index.internal_capacity(), 3);
    assert_eq!(index.verify().unwrap().entries, 300);

    index.insert_entry(1000, RecordId::new(PageId::new(9), 9)).unwrap();
    assert_eq!(
        index.scan_range(299, Operator::Gte, 1000, Operator::Lte).unwrap().len(),
        2
    );
}

#[test]
fn test_index_file_for_other_relation_rejected() {
    let dir = tempdir().unwrap();
    drop(build(dir.path(), &[1, 2, 3], small_config()));

    std::fs::copy(dir.path().join("emp.8"), dir.path().join("dept.8")).unwrap();

    let (mut source, _) = relation(&[]);
    let result = BTreeIndex::open_or_create(
        dir.path(),
        "dept",
        8,
        AttrType::Integer,
        &mut source,
        small_config(),
    );
    match result {
        Err(Error::BadIndexMetadata { index_name }) => assert_eq!(index_name, "dept.8"),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("mismatched header accepted"),
    }
}

#[test]
fn test_garbage_file_is_corrupted() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("emp.8"), vec![0xAB; 4096]).unwrap();

    let (mut source, _) = relation(&[1]);
    let result = BTreeIndex::open_or_create(
        dir.path(),
        "emp",
        8,
        AttrType::Integer,
        &mut source,
        small_config(),
    );
    assert!(matches!(result, Err(Error::Corrupted { page_id: 0, .. })));
}

#[test]
fn test_drop_with_active_scan_flushes() {
    let dir = tempdir().unwrap();
    {
        let (mut index, _) = build(dir.path(), &[3, 1, 2], small_config());
        index.insert_entry(4, RecordId::new(PageId::new(5), 0)).unwrap();
        index.start_scan(1, Operator::Gte, 4, Operator::Lte).unwrap();
        index.scan_next().unwrap();
    }

    let (mut index, _) = build(dir.path(), &[], small_config());
    let rids = index.scan_range(4, Operator::Gte, 4, Operator::Lte).unwrap();
    assert_eq!(rids, vec![RecordId::new(PageId::new(5), 0)]);
}

#[test]
fn test_small_pool_evicts_and_stays_consistent() {
    let dir = tempdir().unwrap();
    let config = IndexConfig::default()
        .with_pool_size(24)
        .with_leaf_capacity(4)
        .with_internal_capacity(4);
    let keys: Vec<i32> = (0..2000).map(|i| (i * 37) % 2000).collect();
    let (mut index, _) = build(dir.path(), &keys, config);

    let stats = index.buffer_pool().stats().snapshot();
    assert!(stats.evictions > 0, "{}", stats);
    assert_eq!(index.verify().unwrap().entries, 2000);
    assert_eq!(
        index.scan_range(500, Operator::Gte, 1499, Operator::Lte).unwrap().len(),
        1000
    );
    assert_eq!(index.buffer_pool().pinned_total(), 0);
}

#[test]
fn test_narrowest_tree_inserts_within_minimum_pool() {
    let dir = tempdir().unwrap();
    let narrow = IndexConfig::default()
        .with_leaf_capacity(1)
        .with_internal_capacity(2);

    let (mut source, _) = relation(&[1, 2, 3]);
    let rejected = BTreeIndex::open_or_create(
        dir.path(),
        "emp",
        KEY_OFFSET as i32,
        AttrType::Integer,
        &mut source,
        narrow.with_pool_size(4),
    );
    assert!(matches!(rejected, Err(Error::InvalidConfig(_))));
    assert!(!dir.path().join("emp.8").exists());

    let config = narrow.with_pool_size(narrow.min_pool_size());
    let keys: Vec<i32> = (0..64).collect();
    let (mut index, _) = build(dir.path(), &keys, config);
    for key in 64..512 {
        index
            .insert_entry(key, RecordId::new(PageId::new(7), (key % 64) as u16))
            .unwrap();
    }

    assert!(index.height() > 4);
    assert_eq!(index.verify().unwrap().entries, 512);
    assert_eq!(index.buffer_pool().pinned_total(), 0);
    assert_eq!(
        index.scan_range(0, Operator::Gte, 511, Operator::Lte).unwrap().len(),
        512
    );
}

#[test]
fn test_reopen_checks_pool_against_stored_capacities() {
    let dir = tempdir().unwrap();
    drop(build(dir.path(), &[1, 2, 3], small_config()));

    // Fine for the default capacities, too shallow for internal_capacity 3.
    let config = IndexConfig::default().with_pool_size(16);
    assert!(config.validate().is_ok());

    let (mut source, _) = relation(&[]);
    let reopened = BTreeIndex::open_or_create(
        dir.path(),
        "emp",
        KEY_OFFSET as i32,
        AttrType::Integer,
        &mut source,
        config,
    );
    assert!(matches!(reopened, Err(Error::InvalidConfig(_))));
    assert!(dir.path().join("emp.8").exists());
}
