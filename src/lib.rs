//! tree-hashmap: a hash map whose buckets start as chains and turn into
//! red-black trees when too many keys collide in one of them.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: keep lookups logarithmic in the worst bucket even under a poor
//!   or adversarial hash, while staying a plain chained table in the
//!   common case.
//! - Layers:
//!   - `Table<K, V>`: bucket array, entry arena and bookkeeping. Works on
//!     precomputed hashes only and never calls `K: Hash`.
//!   - `tree`: red-black insert/remove/rebalance over arena ids, plus
//!     treeify and untreeify.
//!   - `resize`: capacity doubling with the one-bit low/high bucket split.
//!   - `TreeHashMap<K, V, S>`: public API. Hashes keys with `S`, guards
//!     each operation, exposes iterators and diagnostics.
//!
//! Storage
//! - Entries live in a `slotmap` arena and link to each other by
//!   generational `EntryId`. A bucket is a tagged `Bin`: empty, the head of
//!   a chain, or a `TreeId`. Tree root, head/tail of the insertion-order
//!   list and length sit in a second arena, so a bucket slot stays one
//!   handle wide.
//! - Each entry stores its 32-bit spread hash. Resizes and bucket
//!   conversions reuse it, so user `Hash` code runs once per insert or
//!   lookup.
//!
//! Bucket transitions
//! - A chain that reaches `TREEIFY_THRESHOLD` entries becomes a tree, or
//!   the table doubles instead while its capacity is under
//!   `MIN_TREEIFY_CAPACITY`.
//! - A tree at or below `UNTREEIFY_THRESHOLD` entries, after a removal or a
//!   split, reverts to a chain in insertion order.
//! - Within a tree, same-hash keys are ordered by an optional comparator
//!   (`TreeHashMap::with_key_order`) and finally by arena id. The id order
//!   only keeps the tree balanced; lookups still confirm with `Eq`.
//!
//! Failure model
//! - Growth reserves the new bucket array before moving anything. If that
//!   fails the call returns `Error::AllocationFailure` and the map is as it
//!   was: the insert that asked for the growth is unlinked and a bucket it
//!   had just treeified goes back to a chain. An insert doubles the table at
//!   most once.
//! - At `MAX_CAPACITY` the table stops growing and buckets may get long;
//!   `is_saturated` reports it and a `warn` event is logged once.
//!
//! Concurrency
//! - Single mutator, no internal locking. The map is `Send` but not `Sync`
//!   in every build profile; wrap it in a mutex to share it.
//! - `Cursor` traversals check a modification counter before each step
//!   and fail on a structural change they did not make. That is
//!   best-effort detection, not a guarantee.
//! - In debug builds a reentrancy guard panics if a key's `Hash`/`Eq`/`Ord`
//!   calls back into the map it is being probed in.
//!
//! Logging
//! - `tracing` events only; the crate installs no subscriber. Resizes log
//!   at `debug`, bucket conversions at `trace`.

mod config;
mod cursor;
mod entry;
mod error;
mod guard;
mod resize;
mod table;
mod tree;
mod tree_hash_map;
mod tree_hash_map_proptest;

// Public surface
pub use config::{
    spread, table_size_for, threshold_for, TableConfig, DEFAULT_INITIAL_CAPACITY,
    DEFAULT_LOAD_FACTOR, MAX_CAPACITY, MIN_TREEIFY_CAPACITY, TREEIFY_THRESHOLD,
    UNTREEIFY_THRESHOLD,
};
pub use cursor::Cursor;
pub use entry::BinKind;
pub use error::{Error, Result};
pub use tree_hash_map::{Bucket, IntoIter, Iter, IterMut, Keys, TreeHashMap, Values};
