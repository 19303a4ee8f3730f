//! ResizeCoordinator: capacity doubling and bucket splitting.
//!
//! Growing from `n` to `2n` buckets sends every entry of old bucket `j` to
//! new bucket `j` or `j + n`, decided by the single hash bit `n`. Stored
//! spread hashes make this possible without calling `K: Hash` again, and
//! walking each bucket in its list order keeps both halves in the original
//! relative order.

use tracing::{debug, trace, warn};

use crate::config::{capacity_for_entries, threshold_for, MAX_CAPACITY, UNTREEIFY_THRESHOLD};
use crate::entry::{Bin, EntryId, TreeId};
use crate::error::{Error, Result};
use crate::table::Table;
use crate::tree::TreeBalancer;

#[cfg(test)]
thread_local! {
    static FAIL_GROWTH: core::cell::Cell<bool> = const { core::cell::Cell::new(false) };
}

/// Make every bucket-array allocation on the calling thread fail while `on`.
#[cfg(test)]
pub(crate) fn fail_growth(on: bool) {
    FAIL_GROWTH.with(|f| f.set(on));
}

/// Bucket count after growing from `old_cap`, or `None` once the table is
/// saturated at `MAX_CAPACITY`.
fn grown_capacity(old_cap: usize, initial: usize) -> Option<usize> {
    if old_cap == 0 {
        Some(initial)
    } else if old_cap >= MAX_CAPACITY {
        None
    } else {
        Some(old_cap << 1)
    }
}

/// Fully reserved bucket array of `cap` empty slots.
fn allocate_bins(cap: usize) -> Result<Vec<Bin>> {
    #[cfg(test)]
    {
        if FAIL_GROWTH.with(core::cell::Cell::get) {
            return Err(Error::AllocationFailure { capacity: cap });
        }
    }
    let mut bins = Vec::new();
    bins.try_reserve_exact(cap)
        .map_err(|_| Error::AllocationFailure { capacity: cap })?;
    bins.resize(cap, Bin::Empty);
    Ok(bins)
}

/// One half of a split bucket, linked through `Entry::next`.
#[derive(Clone, Copy, Debug)]
struct Run {
    head: EntryId,
    tail: EntryId,
    len: usize,
}

impl<K, V> Table<K, V> {
    /// Allocate the first bucket array, or double the current one.
    ///
    /// The new array is fully reserved before any entry moves, so on
    /// `AllocationFailure` the table is untouched. At `MAX_CAPACITY` no
    /// growth happens and the threshold is pinned instead.
    pub(crate) fn resize(&mut self) -> Result<()> {
        let old_cap = self.bins.len();
        let Some(new_cap) = grown_capacity(old_cap, self.initial_capacity) else {
            self.saturate();
            return Ok(());
        };

        let bins = allocate_bins(new_cap)?;
        let old = core::mem::replace(&mut self.bins, bins);
        for (j, bin) in old.into_iter().enumerate() {
            self.split_bin(bin, j, old_cap);
        }
        self.threshold = threshold_for(new_cap, self.load_factor);
        self.mod_count.bump();

        debug!(
            old_capacity = old_cap,
            new_capacity = new_cap,
            size = self.len(),
            threshold = self.threshold,
            "resized table"
        );
        if new_cap == MAX_CAPACITY {
            warn!(
                capacity = MAX_CAPACITY,
                size = self.len(),
                "table capacity saturated; buckets may now grow without bound"
            );
        }
        Ok(())
    }

    /// Stop growing: the threshold can no longer be crossed.
    fn saturate(&mut self) {
        self.threshold = usize::MAX;
    }

    /// Grow until `entries` fit under the threshold. Before the first
    /// allocation this only raises the capacity that allocation will use.
    pub(crate) fn ensure_capacity(&mut self, entries: usize) -> Result<()> {
        if entries == 0 {
            return Ok(());
        }
        if self.bins.is_empty() {
            let wanted = capacity_for_entries(entries, self.load_factor);
            if wanted > self.initial_capacity {
                self.initial_capacity = wanted;
                self.threshold = threshold_for(wanted, self.load_factor);
            }
            return Ok(());
        }
        while entries > self.threshold && self.bins.len() < MAX_CAPACITY {
            self.resize()?;
        }
        Ok(())
    }

    /// Resize if the table is unallocated or over its threshold.
    pub(crate) fn resize_if_needed(&mut self) -> Result<()> {
        if self.bins.is_empty() || self.len() > self.threshold {
            self.resize()
        } else {
            Ok(())
        }
    }

    /// Move the contents of old bucket `j` into the new array.
    fn split_bin(&mut self, bin: Bin, j: usize, bit: usize) {
        match bin {
            Bin::Empty => {}
            Bin::Chain { head } => {
                let (lo, hi) = self.split_list(head, bit);
                if let Some(lo) = lo {
                    self.bins[j] = Bin::Chain { head: lo.head };
                }
                if let Some(hi) = hi {
                    self.bins[j + bit] = Bin::Chain { head: hi.head };
                }
            }
            Bin::Tree(t) => self.split_tree(t, j, bit),
        }
    }

    /// Split a tree bucket by walking its insertion order. Each half is
    /// rebuilt on its own: a chain when small enough, otherwise a tree. A
    /// tree whose entries all land in one half is moved intact, record and
    /// all.
    fn split_tree(&mut self, tid: TreeId, j: usize, bit: usize) {
        let t = self.trees[tid];
        let (lo, hi) = self.split_list(t.head, bit);
        trace!(
            bin = j,
            low = lo.map_or(0, |r| r.len),
            high = hi.map_or(0, |r| r.len),
            "split tree bin"
        );
        let mut kept = false;
        for (run, idx) in [(lo, j), (hi, j + bit)] {
            let Some(run) = run else { continue };
            let mut balancer = TreeBalancer::new(&mut self.entries, self.order);
            self.bins[idx] = if run.len <= UNTREEIFY_THRESHOLD {
                Bin::Chain {
                    head: balancer.untreeify(run.head),
                }
            } else if run.len == t.len {
                kept = true;
                Bin::Tree(tid)
            } else {
                let half = balancer.treeify(run.head);
                Bin::Tree(self.trees.insert(half))
            };
        }
        if !kept {
            self.trees.remove(tid);
        }
    }

    /// Partition the list starting at `head` by `hash & bit`, preserving
    /// relative order within each half. `prev` links are left alone.
    fn split_list(&mut self, head: EntryId, bit: usize) -> (Option<Run>, Option<Run>) {
        let (mut lo, mut hi): (Option<Run>, Option<Run>) = (None, None);
        let mut cur = Some(head);
        while let Some(id) = cur {
            let e = &mut self.entries[id];
            cur = e.next.take();
            let run = if e.hash as usize & bit == 0 {
                &mut lo
            } else {
                &mut hi
            };
            match run {
                None => {
                    *run = Some(Run {
                        head: id,
                        tail: id,
                        len: 1,
                    })
                }
                Some(r) => {
                    self.entries[r.tail].next = Some(id);
                    r.tail = id;
                    r.len += 1;
                }
            }
        }
        (lo, hi)
    }
}
