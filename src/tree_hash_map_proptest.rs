#![cfg(test)]

// State-machine property tests for TreeHashMap, kept inside the crate so
// every step can run the internal table checker.

use crate::table::check_table;
use crate::tree_hash_map::TreeHashMap;
use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash, Hasher};

// Hash values chosen to share buckets at small capacities and separate at
// larger ones; 1 << 16 lands on bucket 1 once spread.
const CLASSES: [u32; 6] = [0, 1, 16, 64, 80, 1 << 16];

// Key whose hash depends only on its class, so many keys collide.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Key {
    class: u32,
    name: u8,
}
impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.class);
    }
}

// Hasher that passes the written u32 through unchanged.
#[derive(Clone, Default)]
struct PickHash;
#[derive(Default)]
struct PickHasher(u64);
impl BuildHasher for PickHash {
    type Hasher = PickHasher;
    fn build_hasher(&self) -> PickHasher {
        PickHasher::default()
    }
}
impl Hasher for PickHasher {
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

#[derive(Clone, Debug)]
enum Op {
    Put(usize, i32),
    PutIfAbsent(usize, i32),
    Remove(usize),
    Get(usize),
    Mutate(usize, i32),
    EnsureCapacity(usize),
    CursorRemove(usize),
    Iterate,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<Key>, Vec<Op>)> {
    proptest::collection::vec((0..CLASSES.len(), any::<u8>()), 1..=40)
        .prop_map(|raw| {
            raw.into_iter()
                .map(|(c, name)| Key {
                    class: CLASSES[c],
                    name,
                })
                .collect::<Vec<_>>()
        })
        .prop_flat_map(|pool| {
            let idx = 0..pool.len();
            let op = prop_oneof![
                4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Put(i, v)),
                2 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::PutIfAbsent(i, v)),
                3 => idx.clone().prop_map(Op::Remove),
                2 => idx.clone().prop_map(Op::Get),
                1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| Op::Mutate(i, d)),
                1 => (0usize..300).prop_map(Op::EnsureCapacity),
                1 => idx.clone().prop_map(Op::CursorRemove),
                1 => Just(Op::Iterate),
            ];
            proptest::collection::vec(op, 1..120).prop_map(move |ops| (pool.clone(), ops))
        })
}

fn fail(e: crate::error::Error) -> TestCaseError {
    TestCaseError::fail(e.to_string())
}

// Drives `sut` and a std HashMap through the same operations. After every
// step the bucket structure must pass the table checker and agree with the
// model on size; `len <= threshold` must hold since inserts resize eagerly.
fn run_scenario<S: BuildHasher>(
    mut sut: TreeHashMap<Key, i32, S>,
    pool: &[Key],
    ops: Vec<Op>,
) -> Result<(), TestCaseError> {
    let mut model: HashMap<Key, i32> = HashMap::new();
    for op in ops {
        match op {
            Op::Put(i, v) => {
                let k = pool[i].clone();
                let prev = sut.put(k.clone(), v).map_err(fail)?;
                prop_assert_eq!(prev, model.insert(k, v));
            }
            Op::PutIfAbsent(i, v) => {
                let k = &pool[i];
                let existing = sut.put_if_absent(k.clone(), v).map_err(fail)?.copied();
                prop_assert_eq!(existing, model.get(k).copied());
                model.entry(k.clone()).or_insert(v);
            }
            Op::Remove(i) => {
                prop_assert_eq!(sut.remove(&pool[i]), model.remove(&pool[i]));
            }
            Op::Get(i) => {
                let k = &pool[i];
                prop_assert_eq!(sut.get(k), model.get(k));
                prop_assert_eq!(sut.contains_key(k), model.contains_key(k));
            }
            Op::Mutate(i, d) => {
                if let Some(v) = sut.get_mut(&pool[i]) {
                    *v = v.wrapping_add(d);
                }
                if let Some(v) = model.get_mut(&pool[i]) {
                    *v = v.wrapping_add(d);
                }
            }
            Op::EnsureCapacity(n) => {
                sut.ensure_capacity(n).map_err(fail)?;
                prop_assert!(sut.threshold() >= n);
            }
            Op::CursorRemove(i) => {
                let target = &pool[i];
                let mut c = sut.cursor();
                let mut removed = None;
                while let Some((k, _)) = c.next(&sut).map_err(fail)? {
                    let hit = k == target;
                    if hit {
                        removed = Some(c.remove_current(&mut sut).map_err(fail)?);
                    }
                }
                prop_assert_eq!(removed.map(|(_, v)| v), model.remove(target));
            }
            Op::Iterate => {
                prop_assert_eq!(sut.iter().count(), sut.len());
                let seen: BTreeMap<Key, i32> = sut.iter().map(|(k, v)| (k.clone(), *v)).collect();
                let expected: BTreeMap<Key, i32> = model.iter().map(|(k, v)| (k.clone(), *v)).collect();
                prop_assert_eq!(seen, expected);
            }
        }

        check_table(&sut.table).map_err(TestCaseError::fail)?;
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
        prop_assert!(sut.len() <= sut.threshold());
        prop_assert!(sut.capacity() == 0 || sut.capacity().is_power_of_two());
    }
    Ok(())
}

// Property: parity with std HashMap under a real hasher. Only six distinct
// hashes exist, so tree buckets form once capacity reaches 64.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run_scenario(TreeHashMap::new(), &pool, ops)?;
    }
}

// Property: same, with hashes passed through so buckets split across
// resizes in known ways.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_pass_through_hash((pool, ops) in arb_scenario()) {
        run_scenario(TreeHashMap::with_hasher(PickHash), &pool, ops)?;
    }
}

// Property: same, with same-hash keys ordered by `Ord` inside trees.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_key_order((pool, ops) in arb_scenario()) {
        run_scenario(TreeHashMap::with_hasher(PickHash).with_key_order(), &pool, ops)?;
    }
}
