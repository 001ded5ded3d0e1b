//! Per-lane last-hit cache.
//!
//! A single index into the range table naming the last range that satisfied
//! an access on this lane. Each lane owns its cache exclusively; sharing one
//! across lanes would make results depend on interleaving.
//!
//! The slot is used directly as a table index, so it is only ever created
//! through a checked constructor. A stale index (table swapped underneath)
//! reads as a miss rather than a panic.

use crate::range_table::{AddrRange, RangeTable};

/// Returned when a cache is seeded with an index the table does not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cache index {index} out of bounds for table of {len} ranges")]
pub struct CacheIndexError {
    pub index: usize,
    pub len: usize,
}

/// Single-slot validation cache for one lane.
#[derive(Debug, Clone)]
pub struct LaneCache {
    slot: usize,
    hits: u64,
    misses: u64,
    last_probes: u32,
}

impl LaneCache {
    /// Seed the cache at `index`, which must name a range in `table`.
    pub fn new(table: &RangeTable, index: usize) -> Result<Self, CacheIndexError> {
        if index >= table.len() {
            return Err(CacheIndexError {
                index,
                len: table.len(),
            });
        }
        Ok(Self {
            slot: index,
            hits: 0,
            misses: 0,
            last_probes: 0,
        })
    }

    /// Seed the cache at the first range. Fails only for an empty table.
    pub fn first(table: &RangeTable) -> Result<Self, CacheIndexError> {
        Self::new(table, 0)
    }

    /// Current cached index.
    #[inline]
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Range the cache points at, if the index is still in bounds.
    #[inline]
    #[must_use]
    pub fn cached_range<'t>(&self, table: &'t RangeTable) -> Option<&'t AddrRange> {
        table.get(self.slot)
    }

    #[inline]
    pub(crate) fn record_hit(&mut self) {
        self.hits += 1;
        self.last_probes = 0;
    }

    #[inline]
    pub(crate) fn record_miss(&mut self) {
        self.misses += 1;
    }

    #[inline]
    pub(crate) fn record_scan(&mut self, probes: u32) {
        self.last_probes = probes;
    }

    #[inline]
    pub(crate) fn update(&mut self, index: usize) {
        self.slot = index;
    }

    /// Get cache hit count.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Get cache miss count.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Ranges examined by the most recent scan (0 after a cache hit or an
    /// alignment failure).
    #[must_use]
    pub fn last_probes(&self) -> u32 {
        self.last_probes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RangeTable {
        RangeTable::from_ranges([AddrRange::new(0, 64), AddrRange::new(128, 256)]).unwrap()
    }

    #[test]
    fn first_points_at_index_zero() {
        let t = table();
        let cache = LaneCache::first(&t).unwrap();
        assert_eq!(cache.slot(), 0);
        assert_eq!(cache.cached_range(&t), Some(&AddrRange::new(0, 64)));
    }

    #[test]
    fn out_of_bounds_seed_rejected() {
        let t = table();
        let err = LaneCache::new(&t, 2).unwrap_err();
        assert_eq!(err, CacheIndexError { index: 2, len: 2 });
    }

    #[test]
    fn empty_table_has_no_cache() {
        let t = RangeTable::from_sorted_unchecked(Vec::new());
        assert!(LaneCache::first(&t).is_err());
    }

    #[test]
    fn stale_slot_reads_as_none() {
        let big = table();
        let mut cache = LaneCache::new(&big, 1).unwrap();
        cache.update(1);
        let small = RangeTable::from_ranges([AddrRange::new(0, 8)]).unwrap();
        assert!(cache.cached_range(&small).is_none());
    }

    #[test]
    fn counters_track_activity() {
        let t = table();
        let mut cache = LaneCache::first(&t).unwrap();
        cache.record_miss();
        cache.record_scan(2);
        assert_eq!(cache.last_probes(), 2);
        cache.record_hit();
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.last_probes(), 0);
    }
}
