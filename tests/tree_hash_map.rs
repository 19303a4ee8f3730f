// TreeHashMap integration suite.
//
// Each test names the behavior it checks. Hash-sensitive tests use a
// pass-through hasher so bucket placement is known in advance:
// - Growth: crossing the threshold doubles capacity and keeps every key.
// - Bucket forms: 8 same-hash keys at capacity 64 make a tree; dropping to
//   6 or fewer turns it back into a chain in insertion order.
// - Construction: bad arguments fail before anything is allocated.
// - Replacement: a second put of a key replaces the value in place.
// - Traversal: cursors fail fast on structural change made elsewhere.
use std::collections::BTreeSet;
use std::hash::{BuildHasher, Hash, Hasher};

use tracing_subscriber::EnvFilter;
use tree_hashmap::{BinKind, Error, TableConfig, TreeHashMap, MAX_CAPACITY, MIN_TREEIFY_CAPACITY};

// Route crate events to the test harness; set RUST_LOG to see them.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("tree_hashmap=trace"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[derive(Clone, Default)]
struct PassThrough;
#[derive(Default)]
struct PassThroughHasher(u64);
impl BuildHasher for PassThrough {
    type Hasher = PassThroughHasher;
    fn build_hasher(&self) -> PassThroughHasher {
        PassThroughHasher::default()
    }
}
impl Hasher for PassThroughHasher {
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = (self.0 << 8) | u64::from(b);
        }
    }
    fn write_u32(&mut self, n: u32) {
        self.0 = u64::from(n);
    }
    fn finish(&self) -> u64 {
        self.0
    }
}

// Key that hashes to a chosen value regardless of its identity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Colliding {
    hash: u32,
    id: u32,
}
impl Hash for Colliding {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.hash);
    }
}

fn colliding(hash: u32, ids: std::ops::Range<u32>) -> Vec<Colliding> {
    ids.map(|id| Colliding { hash, id }).collect()
}

fn bucket_ids<S>(m: &TreeHashMap<Colliding, u32, S>, idx: usize) -> Vec<u32> {
    m.bucket(idx).map(|(k, _)| k.id).collect()
}

// Test: 13 well-spread keys into a 16/0.75 table.
// Verifies: threshold 12 is crossed once, capacity doubles to 32, every key
// is still retrievable.
#[test]
fn thirteenth_insert_doubles_capacity() {
    init_tracing();
    let mut m = TreeHashMap::try_new(16, 0.75).unwrap();
    assert_eq!(m.threshold(), 12);
    for i in 0..12u32 {
        m.put(i, i * 100).unwrap();
    }
    assert_eq!(m.capacity(), 16);
    m.put(12, 1200).unwrap();
    assert_eq!(m.capacity(), 32);
    assert_eq!(m.threshold(), 24);
    for i in 0..13u32 {
        assert_eq!(m.get(&i), Some(&(i * 100)));
    }
}

// Test: 8 keys sharing one hash in a table already at capacity 64.
// Verifies: their bucket is a tree and every key resolves to its value.
#[test]
fn eight_colliding_keys_make_a_tree() {
    init_tracing();
    let mut m = TreeHashMap::with_capacity_and_hasher(MIN_TREEIFY_CAPACITY, PassThrough);
    let keys = colliding(0x55, 0..8);
    for k in &keys {
        m.put(k.clone(), k.id + 1000).unwrap();
    }
    assert_eq!(m.capacity(), 64);
    let idx = m.bucket_index(&keys[0]).unwrap();
    assert_eq!(m.bin_kind(idx), Some(BinKind::Tree));
    for k in &keys {
        assert_eq!(m.get(k), Some(&(k.id + 1000)));
    }
}

// Test: continue from the tree above and remove three keys.
// Verifies: the bucket reverts to a chain holding the other five keys in
// their original insertion order.
#[test]
fn removing_three_of_eight_reverts_to_chain() {
    let mut m = TreeHashMap::with_capacity_and_hasher(MIN_TREEIFY_CAPACITY, PassThrough);
    let keys = colliding(0x55, 0..8);
    for k in &keys {
        m.put(k.clone(), k.id).unwrap();
    }
    let idx = m.bucket_index(&keys[0]).unwrap();
    for id in [1u32, 4, 6] {
        assert_eq!(m.remove(&keys[id as usize]), Some(id));
    }
    assert_eq!(m.bin_kind(idx), Some(BinKind::Chain));
    assert_eq!(bucket_ids(&m, idx), vec![0, 2, 3, 5, 7]);
    for id in [0u32, 2, 3, 5, 7] {
        assert_eq!(m.get(&keys[id as usize]), Some(&id));
    }
    assert_eq!(m.len(), 5);
}

// Test: negative capacity and bad load factors.
// Verifies: construction fails with an invalid-argument error.
#[test]
fn invalid_constructor_arguments_are_rejected() {
    let err = TreeHashMap::<u32, u32>::try_new(-1, 0.75).unwrap_err();
    assert_eq!(err, Error::InvalidCapacity(-1));
    assert!(err.is_invalid_argument());

    for lf in [0.0, -0.5, f32::NAN] {
        let err = TreeHashMap::<u32, u32>::try_new(16, lf).unwrap_err();
        assert!(err.is_invalid_argument(), "load factor {lf} accepted");
    }

    let cfg = TableConfig::new().with_initial_capacity(-8);
    assert!(TreeHashMap::<u32, u32>::with_config(cfg).is_err());
}

// Test: same key put twice.
// Verifies: size stays 1, the second put returns the first value and get
// returns the second.
#[test]
fn second_put_replaces_value() {
    let mut m = TreeHashMap::new();
    assert_eq!(m.put("key", "first").unwrap(), None);
    assert_eq!(m.put("key", "second").unwrap(), Some("first"));
    assert_eq!(m.size(), 1);
    assert_eq!(m.get("key"), Some(&"second"));
}

// Test: a long chain at capacity below 64.
// Verifies: the table grows instead of treeifying; the tree only appears
// once capacity reaches 64.
#[test]
fn small_table_grows_before_treeifying() {
    let mut m = TreeHashMap::with_hasher(PassThrough);
    let keys = colliding(3, 0..10);
    for (n, k) in keys.iter().enumerate() {
        m.put(k.clone(), k.id).unwrap();
        let idx = m.bucket_index(k).unwrap();
        if m.capacity() < MIN_TREEIFY_CAPACITY {
            assert_ne!(m.bin_kind(idx), Some(BinKind::Tree), "treeified at {n} entries");
        }
    }
    assert_eq!(m.capacity(), 64);
    assert_eq!(m.bin_kind(3), Some(BinKind::Tree));
    assert_eq!(bucket_ids(&m, 3), (0..10).collect::<Vec<_>>());
}

// Test: resize with a chain whose entries split between two buckets.
// Verifies: each half keeps the relative insertion order of the original.
#[test]
fn chain_split_is_order_stable() {
    let mut m = TreeHashMap::with_capacity_and_hasher(16, PassThrough);
    let hashes = [2, 18, 2 + 32, 18 + 32, 2 + 64];
    let keys: Vec<Colliding> = hashes
        .iter()
        .zip(0..)
        .map(|(&hash, id)| Colliding { hash, id })
        .collect();
    for k in &keys {
        m.put(k.clone(), k.id).unwrap();
    }
    assert_eq!(bucket_ids(&m, 2), vec![0, 1, 2, 3, 4]);
    m.ensure_capacity(20).unwrap();
    assert_eq!(m.capacity(), 32);
    assert_eq!(bucket_ids(&m, 2), vec![0, 2, 4]);
    assert_eq!(bucket_ids(&m, 18), vec![1, 3]);
}

// Test: a tree that splits so one half is large and the other small.
// Verifies: the large half stays a tree, the small half is a chain, and
// both keep insertion order.
#[test]
fn tree_split_rebuilds_each_half() {
    init_tracing();
    let mut m = TreeHashMap::with_capacity_and_hasher(64, PassThrough);
    let mut keys = colliding(9, 0..8);
    keys.extend(colliding(9 + 64, 8..11));
    for k in &keys {
        m.put(k.clone(), k.id).unwrap();
    }
    assert_eq!(m.bin_kind(9), Some(BinKind::Tree));
    assert_eq!(bucket_ids(&m, 9), (0..11).collect::<Vec<_>>());

    m.ensure_capacity(60).unwrap();
    assert_eq!(m.capacity(), 128);
    assert_eq!(m.bin_kind(9), Some(BinKind::Tree));
    assert_eq!(m.bin_kind(73), Some(BinKind::Chain));
    assert_eq!(bucket_ids(&m, 9), (0..8).collect::<Vec<_>>());
    assert_eq!(bucket_ids(&m, 73), vec![8, 9, 10]);
    for k in &keys {
        assert_eq!(m.get(k), Some(&k.id));
    }
}

// Test: pre-sizing from a bulk source.
// Verifies: from_entries/put_all reach their final capacity in one step and
// keep every pair.
#[test]
fn bulk_load_presizes() {
    let pairs: Vec<(u32, u32)> = (0..1000).map(|i| (i, i)).collect();
    let m = TreeHashMap::from_entries(pairs.clone()).unwrap();
    assert_eq!(m.len(), 1000);
    assert_eq!(m.capacity(), 2048);
    assert_eq!(m.modification_count(), 1001, "one allocation plus one per insert");

    let mut n: TreeHashMap<u32, u32> = TreeHashMap::new();
    n.put_all(pairs).unwrap();
    assert_eq!(m, n);
}

// Test: capacity stays a power of two large enough for size / load_factor.
#[test]
fn capacity_covers_size_over_load_factor() {
    let mut m = TreeHashMap::try_new(3, 0.5).unwrap();
    for i in 0..500u64 {
        m.put(i, ()).unwrap();
        let cap = m.capacity();
        assert!(cap.is_power_of_two());
        assert!(cap as f64 >= m.len() as f64 / 0.5);
    }
    assert!(!m.is_saturated());
    assert!(m.capacity() < MAX_CAPACITY);
}

// Test: removing never shrinks; clear keeps the bucket array too.
#[test]
fn capacity_is_never_given_back() {
    let mut m: TreeHashMap<u32, u32> = (0..100).map(|i| (i, i)).collect();
    let cap = m.capacity();
    for i in 0..100 {
        m.remove(&i);
    }
    assert!(m.is_empty());
    assert_eq!(m.capacity(), cap);
    m.extend((0..10).map(|i| (i, i)));
    m.clear();
    assert_eq!(m.capacity(), cap);
    assert!(m.iter().next().is_none());
}

// Test: full traversal before and after growth.
// Verifies: the same key/value set is seen, each key exactly once.
#[test]
fn resize_preserves_contents() {
    let mut m = TreeHashMap::with_capacity_and_hasher(64, PassThrough);
    for k in colliding(7, 0..20).into_iter().chain(colliding(7 + 64, 20..40)) {
        let v = k.id * 3;
        m.put(k, v).unwrap();
    }
    let before: BTreeSet<(u32, u32)> = m.iter().map(|(k, v)| (k.id, *v)).collect();
    m.ensure_capacity(1000).unwrap();
    let after: Vec<(u32, u32)> = m.iter().map(|(k, v)| (k.id, *v)).collect();
    assert_eq!(after.len(), 40);
    assert_eq!(before, after.into_iter().collect::<BTreeSet<_>>());
}

// Test: cursor sees a put made by someone else.
// Verifies: the next step fails with ConcurrentModification; the map itself
// is unaffected and a reset traversal succeeds.
#[test]
fn cursor_fails_fast_on_foreign_insert() {
    let mut m: TreeHashMap<u32, u32> = (0..10).map(|i| (i, i)).collect();
    let mut c = m.cursor();
    assert!(c.next(&m).unwrap().is_some());
    m.put(99, 99).unwrap();
    assert_eq!(c.next(&m), Err(Error::ConcurrentModification));

    c.reset(&m);
    let mut n = 0;
    while c.next(&m).unwrap().is_some() {
        n += 1;
    }
    assert_eq!(n, 11);
}

// Test: cursor removal of every entry of a tree bucket.
// Verifies: removal through the cursor survives the tree reverting to a
// chain mid-traversal.
#[test]
fn cursor_drains_a_tree_bucket() {
    let mut m = TreeHashMap::with_capacity_and_hasher(64, PassThrough);
    for k in colliding(12, 0..10) {
        let v = k.id;
        m.put(k, v).unwrap();
    }
    assert_eq!(m.bin_kind(12), Some(BinKind::Tree));
    let mut c = m.cursor();
    let mut order = Vec::new();
    while let Some((k, _)) = c.next(&m).unwrap() {
        order.push(k.id);
        c.remove_current(&mut m).unwrap();
    }
    assert_eq!(order, (0..10).collect::<Vec<_>>());
    assert!(m.is_empty());
    assert_eq!(m.bin_kind(12), Some(BinKind::Empty));
}

// Test: key order installed after trees already exist.
// Verifies: trees are rebuilt and owned-key puts still find existing keys.
#[test]
fn key_order_applies_to_existing_trees() {
    let mut m = TreeHashMap::with_capacity_and_hasher(64, PassThrough);
    for k in colliding(20, 0..16).into_iter().rev() {
        let v = k.id;
        m.put(k, v).unwrap();
    }
    let mut m = m.with_key_order();
    for k in colliding(20, 0..16) {
        assert_eq!(m.put(k.clone(), k.id + 100).unwrap(), Some(k.id));
    }
    assert_eq!(m.len(), 16);
    assert_eq!(m.bin_kind(20), Some(BinKind::Tree));
}

// Test: pass-through hashing differs only in bits above 16.
// Verifies: spreading folds them into the bucket index.
#[test]
fn high_bits_reach_the_bucket_index() {
    let mut m = TreeHashMap::with_capacity_and_hasher(16, PassThrough);
    let a = Colliding { hash: 1 << 16, id: 0 };
    let b = Colliding { hash: 2 << 16, id: 1 };
    m.put(a.clone(), 0).unwrap();
    m.put(b.clone(), 1).unwrap();
    assert_eq!(m.bucket_index(&a), Some(1));
    assert_eq!(m.bucket_index(&b), Some(2));
}

// Test: put_if_absent on a present key.
// Verifies: the stored value is returned and kept, nothing else changes.
#[test]
fn put_if_absent_reports_existing() {
    let mut m = TreeHashMap::new();
    m.put("a".to_string(), 1).unwrap();
    let count = m.modification_count();
    assert_eq!(m.put_if_absent("a".to_string(), 2).unwrap(), Some(&1));
    assert_eq!(m.modification_count(), count);
    assert_eq!(m.put_if_absent("b".to_string(), 3).unwrap(), None);
    assert_eq!(m.get("b"), Some(&3));
}

// Test: a map moved to another thread behind a mutex.
// Verifies: the map is Send and usable under caller-provided locking.
#[test]
fn usable_behind_a_mutex() {
    use std::sync::{Arc, Mutex};
    let shared = Arc::new(Mutex::new(TreeHashMap::<u32, u32>::new()));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || {
                for i in 0..100 {
                    shared.lock().unwrap().put(t * 1000 + i, i).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(shared.lock().unwrap().len(), 400);
}
