//! Table: the bucket array, the entry arena and their bookkeeping.
//!
//! Everything here works on precomputed spread hashes; `K: Hash` is never
//! called at this layer. Only `K: Eq` (and the optional comparator) run
//! while probing.

use core::cmp::Ordering;

use tracing::{debug, trace};

use crate::config::{threshold_for, MIN_TREEIFY_CAPACITY, TREEIFY_THRESHOLD, UNTREEIFY_THRESHOLD};
use crate::entry::{keys_match, Arena, Bin, Entry, EntryId, TreeId, Trees};
use crate::error::Result;
use crate::guard::ModCount;
use crate::tree::{self, KeyOrder, TreeBalancer};

#[derive(Clone)]
pub(crate) struct Table<K, V> {
    pub(crate) bins: Vec<Bin>,
    pub(crate) entries: Arena<K, V>,
    pub(crate) trees: Trees,
    pub(crate) threshold: usize,
    /// Bucket count used by the first allocation.
    pub(crate) initial_capacity: usize,
    pub(crate) load_factor: f32,
    pub(crate) order: KeyOrder<K>,
    pub(crate) mod_count: ModCount,
}

/// Outcome of `Table::put`.
#[derive(Debug, PartialEq)]
pub(crate) enum Put<V> {
    Inserted(EntryId),
    Replaced(V),
    /// Key already present and the caller asked not to overwrite it.
    Present(EntryId),
}

/// Where a new entry goes when its key is absent.
enum Vacant {
    Empty,
    Chain { tail: EntryId, len: usize },
    Tree(TreeId),
}

enum Probe {
    Found(EntryId),
    Vacant(Vacant),
}

impl<K, V> Table<K, V> {
    pub(crate) fn new(initial_capacity: usize, load_factor: f32) -> Self {
        Self {
            bins: Vec::new(),
            entries: Arena::with_key(),
            trees: Trees::with_key(),
            threshold: threshold_for(initial_capacity, load_factor),
            initial_capacity,
            load_factor,
            order: None,
            mod_count: ModCount::default(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.bins.len()
    }

    /// Bucket of `hash`. Only valid once the bucket array exists.
    #[inline]
    pub(crate) fn index_for(&self, hash: u32) -> usize {
        hash as usize & (self.bins.len() - 1)
    }

    /// Locate the entry with `hash` whose key satisfies `is_match`.
    pub(crate) fn find<F>(
        &self,
        hash: u32,
        is_match: &mut F,
        probe: Option<&dyn Fn(&K) -> Ordering>,
    ) -> Option<EntryId>
    where
        F: FnMut(&K) -> bool,
    {
        if self.bins.is_empty() {
            return None;
        }
        match self.bins[self.index_for(hash)] {
            Bin::Empty => None,
            Bin::Chain { head } => {
                let mut cur = Some(head);
                while let Some(id) = cur {
                    let e = &self.entries[id];
                    if e.hash == hash && is_match(&e.key) {
                        return Some(id);
                    }
                    cur = e.next;
                }
                None
            }
            Bin::Tree(t) => tree::find(&self.entries, Some(self.trees[t].root), hash, is_match, probe),
        }
    }

    /// Remove an entry by id, restoring bucket form as needed.
    pub(crate) fn remove_by_id(&mut self, id: EntryId) -> Option<(K, V)> {
        let hash = self.entries.get(id)?.hash;
        let idx = self.index_for(hash);
        self.unlink(idx, id);
        let e = self.entries.remove(id)?;
        self.mod_count.bump();
        Some((e.key, e.value))
    }

    /// First entry of bucket `idx` in bucket order.
    #[inline]
    pub(crate) fn bin_head(&self, idx: usize) -> Option<EntryId> {
        self.bins.get(idx).and_then(|b| b.head(&self.trees))
    }

    /// Detach `id` from bucket `idx` without freeing it. A tree left with
    /// `UNTREEIFY_THRESHOLD` entries or fewer reverts to a chain.
    fn unlink(&mut self, idx: usize, id: EntryId) {
        match self.bins[idx] {
            Bin::Empty => {}
            Bin::Chain { head } => {
                let next = self.entries[id].next.take();
                if head == id {
                    self.bins[idx] = next.map_or(Bin::Empty, |head| Bin::Chain { head });
                } else {
                    let mut cur = head;
                    while let Some(n) = self.entries[cur].next {
                        if n == id {
                            self.entries[cur].next = next;
                            break;
                        }
                        cur = n;
                    }
                }
            }
            Bin::Tree(tid) => {
                let mut balancer = TreeBalancer::new(&mut self.entries, self.order);
                match balancer.remove(self.trees[tid], id) {
                    None => {
                        self.trees.remove(tid);
                        self.bins[idx] = Bin::Empty;
                    }
                    Some(rest) if rest.len <= UNTREEIFY_THRESHOLD => {
                        trace!(bin = idx, len = rest.len, "untreeified bin after removal");
                        self.trees.remove(tid);
                        self.bins[idx] = Bin::Chain {
                            head: balancer.untreeify(rest.head),
                        };
                    }
                    Some(rest) => self.trees[tid] = rest,
                }
            }
        }
    }

    /// Convert bucket `idx` to a tree, or grow the table instead while it
    /// is still below `MIN_TREEIFY_CAPACITY`. Returns whether the bucket
    /// became a tree.
    fn treeify_bin(&mut self, idx: usize) -> Result<bool> {
        if self.bins.len() < MIN_TREEIFY_CAPACITY {
            self.resize()?;
            return Ok(false);
        }
        let Bin::Chain { head } = self.bins[idx] else {
            return Ok(false);
        };
        let t = TreeBalancer::new(&mut self.entries, self.order).treeify(head);
        trace!(bin = idx, len = t.len, "treeified bin");
        let tid = self.trees.insert(t);
        self.bins[idx] = Bin::Tree(tid);
        Ok(true)
    }

    /// Undo an insert whose follow-up growth failed. `treeified` says the
    /// same insert turned the bucket into a tree; it goes back to a chain.
    fn roll_back(&mut self, id: EntryId, treeified: bool) {
        let idx = self.index_for(self.entries[id].hash);
        self.unlink(idx, id);
        self.entries.remove(id);
        if treeified {
            if let Bin::Tree(tid) = self.bins[idx] {
                if let Some(t) = self.trees.remove(tid) {
                    let head = TreeBalancer::new(&mut self.entries, self.order).untreeify(t.head);
                    self.bins[idx] = Bin::Chain { head };
                }
            }
        }
        debug!(bin = idx, treeified, "rolled back insert after allocation failure");
    }

    /// Install a new tie-break comparator and rebuild every tree bin under
    /// it. Chain bins are unaffected.
    pub(crate) fn set_order(&mut self, order: KeyOrder<K>) {
        self.order = order;
        for idx in 0..self.bins.len() {
            if let Bin::Tree(tid) = self.bins[idx] {
                let mut balancer = TreeBalancer::new(&mut self.entries, order);
                let head = balancer.untreeify(self.trees[tid].head);
                self.trees[tid] = balancer.treeify(head);
            }
        }
    }

    /// Drop every entry but keep the bucket array.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.trees.clear();
        self.bins.iter_mut().for_each(|b| *b = Bin::Empty);
        self.mod_count.bump();
    }
}

impl<K: Eq, V> Table<K, V> {
    /// Insert or update the entry for `key`.
    ///
    /// On success of an insert the table may have been treeified at the
    /// target bucket or resized, but doubled at most once. If that doubling
    /// cannot be allocated the insert is undone and the table is left as it
    /// was, bucket forms included.
    pub(crate) fn put(&mut self, hash: u32, key: K, value: V, only_if_absent: bool) -> Result<Put<V>> {
        if self.bins.is_empty() {
            self.resize()?;
        }
        let cap = self.bins.len();
        let idx = self.index_for(hash);

        match self.probe(idx, hash, &key) {
            Probe::Found(id) if only_if_absent => Ok(Put::Present(id)),
            Probe::Found(id) => {
                let old = core::mem::replace(&mut self.entries[id].value, value);
                Ok(Put::Replaced(old))
            }
            Probe::Vacant(slot) => {
                let id = self.entries.insert(Entry::new(hash, key, value));
                let mut treeified = false;
                match slot {
                    Vacant::Empty => self.bins[idx] = Bin::Chain { head: id },
                    Vacant::Chain { tail, len } => {
                        self.entries[tail].next = Some(id);
                        if len + 1 >= TREEIFY_THRESHOLD {
                            match self.treeify_bin(idx) {
                                Ok(t) => treeified = t,
                                Err(e) => {
                                    self.roll_back(id, false);
                                    return Err(e);
                                }
                            }
                        }
                    }
                    Vacant::Tree(tid) => {
                        let mut t = self.trees[tid];
                        TreeBalancer::new(&mut self.entries, self.order).insert(&mut t, id);
                        self.trees[tid] = t;
                    }
                }
                if self.bins.len() == cap && self.len() > self.threshold {
                    if let Err(e) = self.resize() {
                        self.roll_back(id, treeified);
                        return Err(e);
                    }
                }
                self.mod_count.bump();
                Ok(Put::Inserted(id))
            }
        }
    }

    /// Single pass over bucket `idx`: either the matching entry or where a
    /// new one would be attached.
    fn probe(&self, idx: usize, hash: u32, key: &K) -> Probe {
        match self.bins[idx] {
            Bin::Empty => Probe::Vacant(Vacant::Empty),
            Bin::Chain { head } => {
                let (mut cur, mut len) = (head, 1);
                loop {
                    let e = &self.entries[cur];
                    if e.hash == hash && keys_match(&e.key, key) {
                        return Probe::Found(cur);
                    }
                    match e.next {
                        Some(n) => {
                            cur = n;
                            len += 1;
                        }
                        None => return Probe::Vacant(Vacant::Chain { tail: cur, len }),
                    }
                }
            }
            Bin::Tree(tid) => {
                let probe = self.order.map(|cmp| move |stored: &K| cmp(key, stored));
                let found = tree::find(
                    &self.entries,
                    Some(self.trees[tid].root),
                    hash,
                    &mut |stored: &K| keys_match(stored, key),
                    probe.as_ref().map(|p| p as &dyn Fn(&K) -> Ordering),
                );
                match found {
                    Some(id) => Probe::Found(id),
                    None => Probe::Vacant(Vacant::Tree(tid)),
                }
            }
        }
    }
}

/// Verify table-wide invariants: power-of-two capacity, every entry in the
/// bucket its hash selects and reachable exactly once, and valid trees.
#[cfg(test)]
pub(crate) fn check_table<K, V>(table: &Table<K, V>) -> core::result::Result<(), String> {
    use crate::config::MAX_CAPACITY;

    let cap = table.bins.len();
    if cap == 0 {
        return if table.entries.is_empty() {
            Ok(())
        } else {
            Err("entries without a bucket array".into())
        };
    }
    if !cap.is_power_of_two() || cap > MAX_CAPACITY {
        return Err(format!("capacity {cap} is not a valid power of two"));
    }
    let mut seen = 0usize;
    let mut tree_bins = 0usize;
    for (idx, bin) in table.bins.iter().enumerate() {
        let mut len = 0usize;
        let mut cur = bin.head(&table.trees);
        while let Some(id) = cur {
            let e = &table.entries[id];
            if table.index_for(e.hash) != idx {
                return Err(format!("entry with hash {:#x} found in bin {idx}", e.hash));
            }
            len += 1;
            cur = e.next;
        }
        match bin {
            Bin::Tree(tid) => {
                let Some(t) = table.trees.get(*tid) else {
                    return Err(format!("tree bin {idx} has no tree record"));
                };
                tree_bins += 1;
                if t.len != len {
                    return Err(format!("tree bin {idx} claims {} entries, lists {len}", t.len));
                }
                if t.len <= UNTREEIFY_THRESHOLD {
                    return Err(format!("tree bin {idx} holds only {len} entries"));
                }
                tree::check_tree(&table.entries, t, table.order)
                    .map_err(|e| format!("bin {idx}: {e}"))?;
            }
            Bin::Chain { .. } | Bin::Empty => {}
        }
        seen += len;
    }
    if seen != table.entries.len() {
        return Err(format!("{seen} reachable entries, arena holds {}", table.entries.len()));
    }
    if tree_bins != table.trees.len() {
        return Err(format!("{tree_bins} tree bins, {} tree records", table.trees.len()));
    }
    Ok(())
}
