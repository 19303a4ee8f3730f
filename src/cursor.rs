//! Fail-fast traversal that does not borrow the map between steps.
//!
//! A `Cursor` remembers the modification count it last saw. Every step
//! compares it against the map's current count and stops with
//! `ConcurrentModification` on a mismatch. This is best-effort detection
//! for a single-mutator map, not a synchronization mechanism: it only
//! notices structural changes made through the map's own API.

use crate::entry::EntryId;
use crate::error::{Error, Result};
use crate::tree_hash_map::TreeHashMap;

/// Position in a bucket-order traversal of a `TreeHashMap`.
#[derive(Clone, Debug)]
pub struct Cursor {
    /// Next bucket to open once the current one runs out.
    bin: usize,
    next: Option<EntryId>,
    /// Entry returned by the last `next`, if it may still be removed.
    current: Option<EntryId>,
    expected: u64,
}

impl Cursor {
    pub(crate) fn new(expected: u64) -> Self {
        Self {
            bin: 0,
            next: None,
            current: None,
            expected,
        }
    }

    /// Advance and return the next entry, or `Ok(None)` once every bucket
    /// has been visited.
    pub fn next<'m, K, V, S>(&mut self, map: &'m TreeHashMap<K, V, S>) -> Result<Option<(&'m K, &'m V)>> {
        let table = &map.table;
        table.mod_count.check(self.expected)?;
        while self.next.is_none() {
            let Some(bin) = table.bins.get(self.bin) else {
                return Ok(None);
            };
            self.bin += 1;
            self.next = bin.head(&table.trees);
        }
        let Some(id) = self.next else {
            return Ok(None);
        };
        let e = table.entries.get(id).ok_or(Error::ConcurrentModification)?;
        self.next = e.next;
        self.current = Some(id);
        Ok(Some((&e.key, &e.value)))
    }

    /// Remove the entry last returned by `next`. The traversal continues
    /// with the entry that followed it.
    pub fn remove_current<K, V, S>(&mut self, map: &mut TreeHashMap<K, V, S>) -> Result<(K, V)> {
        let id = self.current.ok_or(Error::NoCurrentEntry)?;
        map.table.mod_count.check(self.expected)?;
        let pair = map
            .table
            .remove_by_id(id)
            .ok_or(Error::ConcurrentModification)?;
        self.current = None;
        self.expected = map.table.mod_count.get();
        Ok(pair)
    }

    /// Start over from the first bucket, accepting the map as it is now.
    pub fn reset<K, V, S>(&mut self, map: &TreeHashMap<K, V, S>) {
        *self = Self::new(map.table.mod_count.get());
    }
}
