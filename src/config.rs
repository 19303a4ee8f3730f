//! Sizing constants, construction parameters and hash spreading.

use crate::error::{Error, Result};

/// Capacity used when none is given.
pub const DEFAULT_INITIAL_CAPACITY: usize = 1 << 4;

/// Largest bucket array the table will allocate. Must stay a power of two.
pub const MAX_CAPACITY: usize = 1 << 30;

pub const DEFAULT_LOAD_FACTOR: f32 = 0.75;

/// Chain length at which a bucket is converted to a tree.
pub const TREEIFY_THRESHOLD: usize = 8;

/// Entry count at or below which a tree bucket reverts to a chain.
pub const UNTREEIFY_THRESHOLD: usize = 6;

/// Smallest capacity at which buckets may be treeified; below it a long
/// chain triggers a resize instead.
pub const MIN_TREEIFY_CAPACITY: usize = 64;

/// Construction parameters for `TreeHashMap`.
///
/// `initial_capacity` is signed so that a negative request can be reported
/// as an error instead of being unrepresentable at the call site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableConfig {
    pub initial_capacity: isize,
    pub load_factor: f32,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY as isize,
            load_factor: DEFAULT_LOAD_FACTOR,
        }
    }
}

impl TableConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_capacity(mut self, initial_capacity: isize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    pub fn with_load_factor(mut self, load_factor: f32) -> Self {
        self.load_factor = load_factor;
        self
    }

    /// Check both parameters without allocating anything.
    pub fn validate(&self) -> Result<()> {
        if self.initial_capacity < 0 {
            return Err(Error::InvalidCapacity(self.initial_capacity));
        }
        if self.load_factor.is_nan() || self.load_factor <= 0.0 {
            return Err(Error::InvalidLoadFactor(self.load_factor));
        }
        Ok(())
    }

    /// Bucket count the table starts with once it first allocates.
    pub(crate) fn bucket_count(&self) -> usize {
        table_size_for(self.initial_capacity.max(0) as usize)
    }
}

/// Smallest power of two `>= n`, clamped to `1..=MAX_CAPACITY`.
pub fn table_size_for(n: usize) -> usize {
    if n <= 1 {
        1
    } else if n >= MAX_CAPACITY {
        MAX_CAPACITY
    } else {
        n.next_power_of_two()
    }
}

/// Resize threshold for a bucket array of `capacity` slots.
///
/// At `MAX_CAPACITY` the threshold is pinned so no further resize is
/// attempted.
pub fn threshold_for(capacity: usize, load_factor: f32) -> usize {
    let ft = capacity as f32 * load_factor;
    if capacity < MAX_CAPACITY && ft < MAX_CAPACITY as f32 {
        ft as usize
    } else {
        usize::MAX
    }
}

/// Capacity that holds `entries` without crossing the threshold.
pub(crate) fn capacity_for_entries(entries: usize, load_factor: f32) -> usize {
    let ft = entries as f32 / load_factor + 1.0;
    let wanted = if ft < MAX_CAPACITY as f32 {
        ft as usize
    } else {
        MAX_CAPACITY
    };
    table_size_for(wanted)
}

/// Mix the high half of a 32-bit hash into the low half, which is the part
/// bucket indexing actually looks at.
#[inline]
pub fn spread(h: u32) -> u32 {
    h ^ (h >> 16)
}

/// Reduce a `BuildHasher` output to the 32-bit hash stored per entry.
#[inline]
pub(crate) fn fold(h: u64) -> u32 {
    (h ^ (h >> 32)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = TableConfig::default();
        assert_eq!(cfg.initial_capacity, 16);
        assert_eq!(cfg.load_factor, 0.75);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.bucket_count(), 16);
    }

    #[test]
    fn validate_rejects_bad_arguments() {
        let neg = TableConfig::new().with_initial_capacity(-1);
        assert_eq!(neg.validate(), Err(Error::InvalidCapacity(-1)));

        for lf in [0.0f32, -0.5, f32::NAN] {
            let cfg = TableConfig::new().with_load_factor(lf);
            assert!(matches!(cfg.validate(), Err(Error::InvalidLoadFactor(_))));
        }
    }

    #[test]
    fn table_size_for_rounds_up_to_power_of_two() {
        assert_eq!(table_size_for(0), 1);
        assert_eq!(table_size_for(1), 1);
        assert_eq!(table_size_for(2), 2);
        assert_eq!(table_size_for(3), 4);
        assert_eq!(table_size_for(16), 16);
        assert_eq!(table_size_for(17), 32);
        assert_eq!(table_size_for(MAX_CAPACITY + 1), MAX_CAPACITY);
        assert_eq!(table_size_for(usize::MAX), MAX_CAPACITY);
    }

    #[test]
    fn threshold_follows_load_factor_and_pins_at_max() {
        assert_eq!(threshold_for(16, 0.75), 12);
        assert_eq!(threshold_for(32, 0.75), 24);
        assert_eq!(threshold_for(1, 0.5), 0);
        assert_eq!(threshold_for(4, 2.0), 8);
        assert_eq!(threshold_for(MAX_CAPACITY, 0.75), usize::MAX);
        assert_eq!(threshold_for(1 << 29, 4.0), usize::MAX);
    }

    #[test]
    fn capacity_for_entries_leaves_headroom() {
        assert_eq!(capacity_for_entries(12, 0.75), 32);
        assert_eq!(capacity_for_entries(11, 0.75), 16);
        assert!(threshold_for(capacity_for_entries(100, 0.75), 0.75) >= 100);
    }

    #[test]
    fn spread_mixes_high_bits_down() {
        assert_eq!(spread(0), 0);
        assert_eq!(spread(0x0000_1234), 0x0000_1234);
        assert_eq!(spread(0x0001_0000), 0x0001_0001);
        assert_eq!(spread(0xFFFF_0000), 0xFFFF_FFFF);
    }

    #[test]
    fn fold_keeps_small_hashes() {
        assert_eq!(fold(42), 42);
        assert_eq!(fold(1 << 32), 1);
    }
}
