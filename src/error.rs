//! Error taxonomy for `TreeHashMap`.

use thiserror::Error;

/// Failures surfaced by the table's fallible operations.
///
/// Reaching `MAX_CAPACITY` is not an error; see `TreeHashMap::is_saturated`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Negative initial capacity passed to a constructor.
    #[error("illegal initial capacity: {0}")]
    InvalidCapacity(isize),

    /// Load factor that is zero, negative or NaN.
    #[error("illegal load factor: {0}")]
    InvalidLoadFactor(f32),

    /// A cursor observed a structural change it did not make itself.
    #[error("map was structurally modified during traversal")]
    ConcurrentModification,

    /// `Cursor::remove_current` called before `next` or twice in a row.
    #[error("cursor has no current entry")]
    NoCurrentEntry,

    /// The bucket array for the requested capacity could not be allocated.
    /// A failed insert leaves the table exactly as it was before the call.
    /// `ensure_capacity` keeps any doublings it completed before the
    /// failing one.
    #[error("failed to allocate bucket array of capacity {capacity}")]
    AllocationFailure { capacity: usize },
}

impl Error {
    /// True for the constructor-argument class of errors.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidCapacity(_) | Error::InvalidLoadFactor(_))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
