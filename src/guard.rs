//! Structural-change bookkeeping.
//!
//! `ModCount` counts structural changes so detached traversals can notice
//! that the table moved under them. `DebugReentrancy` catches a key's
//! `Hash`/`Eq`/`Ord` calling back into the map that is probing it; in
//! release builds it compiles to nothing.
//!
//! Neither is a synchronization primitive. Both are best-effort detectors
//! for a single-mutator structure.

use core::cell::Cell;
use core::marker::PhantomData;

use crate::error::{Error, Result};

/// Monotonic count of structural modifications (insert, remove, resize,
/// clear). Value-only updates do not count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ModCount(u64);

impl ModCount {
    #[inline]
    pub(crate) fn bump(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    #[inline]
    pub(crate) fn get(&self) -> u64 {
        self.0
    }

    /// Fail if the count moved away from `expected`.
    #[inline]
    pub(crate) fn check(&self, expected: u64) -> Result<()> {
        if self.0 == expected {
            Ok(())
        } else {
            Err(Error::ConcurrentModification)
        }
    }
}

/// Per-map busy flag. Public operations hold a `Busy` token for their whole
/// duration; taking a second one while the first is alive panics in debug
/// builds.
///
/// Uses a plain `Cell`, so the owning map stays `Send` and can be moved
/// into a caller-supplied mutex. The map is `!Sync` in every profile; the
/// marker keeps release builds in line with debug ones.
#[derive(Debug, Default)]
pub(crate) struct DebugReentrancy {
    #[cfg(debug_assertions)]
    busy: Cell<bool>,
    _not_sync: PhantomData<Cell<()>>,
}

impl DebugReentrancy {
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            busy: Cell::new(false),
            _not_sync: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn enter(&self) -> Busy<'_> {
        #[cfg(debug_assertions)]
        {
            assert!(
                !self.busy.replace(true),
                "reentrancy detected: key callback re-entered TreeHashMap"
            );
            Busy { owner: self }
        }

        #[cfg(not(debug_assertions))]
        {
            Busy { _owner: PhantomData }
        }
    }
}

/// RAII token returned by `DebugReentrancy::enter`.
pub(crate) struct Busy<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _owner: PhantomData<&'a ()>,
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.owner.busy.set(false);
    }
}
