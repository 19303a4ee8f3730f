//! TreeHashMap: hashing front end over `Table`.

use core::borrow::Borrow;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::iter::FusedIterator;

use hashbrown::hash_map::DefaultHashBuilder;

use crate::config::{fold, spread, table_size_for, TableConfig, DEFAULT_LOAD_FACTOR, MAX_CAPACITY};
use crate::cursor::Cursor;
use crate::entry::{keys_match, Arena, Bin, BinKind, Entry, EntryId, Trees};
use crate::error::Result;
use crate::guard::DebugReentrancy;
use crate::table::{Put, Table};

/// Hash a query to the spread 32-bit form stored in entries.
#[inline]
fn make_hash<S, Q>(hasher: &S, q: &Q) -> u32
where
    S: BuildHasher,
    Q: ?Sized + Hash,
{
    spread(fold(hasher.hash_one(q)))
}

/// Hash map with chain buckets that turn into red-black trees once they
/// collect `TREEIFY_THRESHOLD` entries.
///
/// Single mutator, no internal locking. Wrap it in a mutex to share it.
pub struct TreeHashMap<K, V, S = DefaultHashBuilder> {
    hasher: S,
    pub(crate) table: Table<K, V>,
    reentrancy: DebugReentrancy,
}

impl<K, V> TreeHashMap<K, V> {
    /// Empty map with capacity 16 and load factor 0.75. Nothing is
    /// allocated until the first insert.
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }

    /// Map with an explicit initial capacity and load factor.
    ///
    /// Fails with `InvalidCapacity` for a negative capacity and with
    /// `InvalidLoadFactor` for a load factor that is not a positive number.
    pub fn try_new(initial_capacity: isize, load_factor: f32) -> Result<Self> {
        Self::with_config(TableConfig {
            initial_capacity,
            load_factor,
        })
    }

    pub fn with_config(config: TableConfig) -> Result<Self> {
        Self::with_config_and_hasher(config, DefaultHashBuilder::default())
    }
}

impl<K, V> TreeHashMap<K, V>
where
    K: Eq + Hash,
{
    /// Build a map from `(key, value)` pairs, pre-sizing it from the
    /// iterator's lower size bound.
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut map = Self::new();
        map.put_all(entries)?;
        Ok(map)
    }
}

impl<K, V, S> TreeHashMap<K, V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(crate::config::DEFAULT_INITIAL_CAPACITY, hasher)
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self::from_parts(table_size_for(capacity), DEFAULT_LOAD_FACTOR, hasher)
    }

    pub fn with_config_and_hasher(config: TableConfig, hasher: S) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(config.bucket_count(), config.load_factor, hasher))
    }

    fn from_parts(bucket_count: usize, load_factor: f32, hasher: S) -> Self {
        Self {
            hasher,
            table: Table::new(bucket_count, load_factor),
            reentrancy: DebugReentrancy::new(),
        }
    }

    /// Order same-hash keys inside tree buckets by `Ord`, which lets
    /// owned-key probes descend instead of scanning. Existing tree buckets
    /// are rebuilt.
    pub fn with_key_order(mut self) -> Self
    where
        K: Ord,
    {
        let cmp: fn(&K, &K) -> Ordering = K::cmp;
        self.table.set_order(Some(cmp));
        self
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Same as `len`.
    pub fn size(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    /// Current bucket count; zero until the first allocation.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Entry count above which the next insert doubles the capacity.
    pub fn threshold(&self) -> usize {
        self.table.threshold
    }

    pub fn load_factor(&self) -> f32 {
        self.table.load_factor
    }

    /// True once the bucket array has reached `MAX_CAPACITY`. From then on
    /// the table no longer grows and buckets may exceed their usual length.
    pub fn is_saturated(&self) -> bool {
        self.table.capacity() >= MAX_CAPACITY
    }

    /// Count of structural modifications so far.
    pub fn modification_count(&self) -> u64 {
        self.table.mod_count.get()
    }

    /// Form of bucket `index`, or `None` past the end of the bucket array.
    pub fn bin_kind(&self, index: usize) -> Option<BinKind> {
        self.table.bins.get(index).map(Bin::kind)
    }

    /// Entries of bucket `index` in bucket order.
    pub fn bucket(&self, index: usize) -> Bucket<'_, K, V> {
        Bucket {
            entries: &self.table.entries,
            next: self.table.bin_head(index),
        }
    }

    /// Remove every entry. The bucket array is kept.
    pub fn clear(&mut self) {
        let _g = self.reentrancy.enter();
        self.table.clear();
    }

    /// Grow the table if it is unallocated or above its threshold.
    pub fn resize_if_needed(&mut self) -> Result<()> {
        let _g = self.reentrancy.enter();
        self.table.resize_if_needed()
    }

    /// Pre-size the table so `entries` entries fit without further
    /// resizing.
    pub fn ensure_capacity(&mut self, entries: usize) -> Result<()> {
        let _g = self.reentrancy.enter();
        self.table.ensure_capacity(entries)
    }

    /// Borrowing iterator in bucket order: buckets by index, each bucket in
    /// chain or insertion order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            bins: &self.table.bins,
            trees: &self.table.trees,
            entries: &self.table.entries,
            bin: 0,
            next: None,
            remaining: self.table.len(),
        }
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Mutable iterator. Visits entries in storage order, not bucket order.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            it: self.table.entries.iter_mut(),
        }
    }

    /// Mutable values in storage order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> + '_ {
        self.iter_mut().map(|(_, v)| v)
    }

    /// Detached traversal that fails instead of continuing when the map is
    /// structurally modified behind it.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.table.mod_count.get())
    }
}

impl<K, V, S> TreeHashMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn find<Q>(&self, q: &Q) -> Option<EntryId>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        if self.table.capacity() == 0 {
            return None;
        }
        let hash = make_hash(&self.hasher, q);
        self.table
            .find(hash, &mut |k: &K| keys_match::<Q>(k.borrow(), q), None)
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let id = self.find(q)?;
        Some(&self.table.entries[id].value)
    }

    pub fn get_key_value<Q>(&self, q: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let e = &self.table.entries[self.find(q)?];
        Some((&e.key, &e.value))
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let id = self.find(q)?;
        Some(&mut self.table.entries[id].value)
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        self.find(q).is_some()
    }

    /// Insert or replace. Returns the previous value for `key`, if any.
    ///
    /// Fails only when growing the table cannot be allocated; the map is
    /// then unchanged.
    pub fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        let _g = self.reentrancy.enter();
        let hash = make_hash(&self.hasher, &key);
        match self.table.put(hash, key, value, false)? {
            Put::Replaced(old) => Ok(Some(old)),
            Put::Inserted(_) | Put::Present(_) => Ok(None),
        }
    }

    /// Insert only if `key` is absent. Returns the value already stored for
    /// `key` when there is one; `key` and `value` are dropped in that case.
    pub fn put_if_absent(&mut self, key: K, value: V) -> Result<Option<&V>> {
        let _g = self.reentrancy.enter();
        let hash = make_hash(&self.hasher, &key);
        match self.table.put(hash, key, value, true)? {
            Put::Present(id) => Ok(Some(&self.table.entries[id].value)),
            Put::Inserted(_) | Put::Replaced(_) => Ok(None),
        }
    }

    /// Insert every pair, pre-sizing from the iterator's lower size bound.
    pub fn put_all<I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let entries = entries.into_iter();
        self.ensure_capacity(entries.size_hint().0)?;
        for (k, v) in entries {
            self.put(k, v)?;
        }
        Ok(())
    }

    pub fn remove<Q>(&mut self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove_entry(q).map(|(_, v)| v)
    }

    /// Remove and return the stored key and value. Capacity never shrinks.
    pub fn remove_entry<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let id = self.find(q)?;
        self.table.remove_by_id(id)
    }

    /// Bucket `key` maps to under the current capacity.
    pub fn bucket_index<Q>(&self, q: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        if self.table.capacity() == 0 {
            return None;
        }
        Some(self.table.index_for(make_hash(&self.hasher, q)))
    }
}

impl<K, V, S> TreeHashMap<K, V, S>
where
    V: PartialEq,
{
    pub fn contains_value(&self, value: &V) -> bool {
        self.table.entries.values().any(|e| e.value == *value)
    }
}

impl<K, V> Default for TreeHashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> Clone for TreeHashMap<K, V, S>
where
    K: Clone,
    V: Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            hasher: self.hasher.clone(),
            table: self.table.clone(),
            reentrancy: DebugReentrancy::new(),
        }
    }
}

impl<K, V, S> fmt::Debug for TreeHashMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> PartialEq for TreeHashMap<K, V, S>
where
    K: Eq + Hash,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|ov| v == ov))
    }
}

impl<K, V, S> Eq for TreeHashMap<K, V, S>
where
    K: Eq + Hash,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, V, S> Extend<(K, V)> for TreeHashMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// # Panics
    ///
    /// Panics if growing the table cannot be allocated, like the standard
    /// collections do.
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        if let Err(e) = self.put_all(iter) {
            panic!("TreeHashMap::extend: {e}");
        }
    }
}

impl<K, V> FromIterator<(K, V)> for TreeHashMap<K, V>
where
    K: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

/// Iterator over `(&K, &V)` in bucket order.
pub struct Iter<'a, K, V> {
    bins: &'a [Bin],
    trees: &'a Trees,
    entries: &'a Arena<K, V>,
    bin: usize,
    next: Option<EntryId>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(id) = self.next {
                let entries = self.entries;
                let e = &entries[id];
                self.next = e.next;
                self.remaining -= 1;
                return Some((&e.key, &e.value));
            }
            let bin = self.bins.get(self.bin)?;
            self.bin += 1;
            self.next = bin.head(self.trees);
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}

pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}

/// Iterator over mutable entries in storage order.
pub struct IterMut<'a, K, V> {
    it: slotmap::basic::IterMut<'a, EntryId, Entry<K, V>>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|(_, e)| (&e.key, &mut e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

/// Entries of a single bucket.
pub struct Bucket<'a, K, V> {
    entries: &'a Arena<K, V>,
    next: Option<EntryId>,
}

impl<'a, K, V> Iterator for Bucket<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let entries = self.entries;
        let e = &entries[self.next?];
        self.next = e.next;
        Some((&e.key, &e.value))
    }
}

/// Owning iterator, storage order.
pub struct IntoIter<K, V> {
    it: slotmap::basic::IntoIter<EntryId, Entry<K, V>>,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|(_, e)| (e.key, e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

impl<K, V, S> IntoIterator for TreeHashMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            it: self.table.entries.into_iter(),
        }
    }
}

impl<'a, K, V, S> IntoIterator for &'a TreeHashMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
