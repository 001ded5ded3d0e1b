//! Sorted, disjoint address-range table.
//!
//! The table is built once per unit of work and read by every lane for the
//! rest of that unit. The validator relies on two invariants it never
//! re-checks on the hot path:
//!
//! 1. ranges are sorted ascending by `begin`;
//! 2. no two ranges overlap.
//!
//! [`RangeTableBuilder`] establishes both. [`RangeTable::from_sorted_unchecked`]
//! trusts the caller, and [`RangeTable::audit`] re-verifies a table once per
//! publish when the check level asks for it.

use std::fmt;

use thiserror::Error;

/// Half-open address interval `[begin, end)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddrRange {
    pub begin: u64,
    pub end: u64,
}

impl fmt::Debug for AddrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.begin, self.end)
    }
}

impl AddrRange {
    #[must_use]
    pub const fn new(begin: u64, end: u64) -> Self {
        Self { begin, end }
    }

    /// Range starting at `begin` spanning `len` bytes, saturating at the top
    /// of the address space.
    #[must_use]
    pub const fn with_len(begin: u64, len: u64) -> Self {
        Self {
            begin,
            end: begin.saturating_add(len),
        }
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end.saturating_sub(self.begin)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.begin
    }

    /// True if `[addr, access_end)` lies entirely inside this range.
    #[inline]
    #[must_use]
    pub const fn contains_span(&self, addr: u64, access_end: u64) -> bool {
        addr >= self.begin && access_end <= self.end
    }
}

/// Errors raised while building or auditing a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("range {index} {range:?} has end before begin")]
    InvertedRange { index: usize, range: AddrRange },
    #[error("range {index} begins before range {prev}")]
    Unsorted { prev: usize, index: usize },
    #[error("range {index} {range:?} overlaps range {prev} {prev_range:?}")]
    Overlapping {
        prev: usize,
        prev_range: AddrRange,
        index: usize,
        range: AddrRange,
    },
    #[error("table capacity {capacity} exceeded")]
    CapacityExceeded { capacity: usize },
}

/// Read-only snapshot of the valid regions for one unit of work.
#[derive(Clone, PartialEq, Eq)]
pub struct RangeTable {
    ranges: Box<[AddrRange]>,
    capacity: usize,
}

impl fmt::Debug for RangeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeTable")
            .field("len", &self.ranges.len())
            .field("capacity", &self.capacity)
            .field("ranges", &self.ranges)
            .finish()
    }
}

impl RangeTable {
    /// Start building a table that holds at most `capacity` ranges.
    #[must_use]
    pub fn builder(capacity: usize) -> RangeTableBuilder {
        RangeTableBuilder::new(capacity)
    }

    /// Wrap ranges the caller guarantees are sorted and disjoint.
    ///
    /// Nothing is checked here. Feeding an unsorted or overlapping table to
    /// the validator produces false negatives, never a panic.
    #[must_use]
    pub fn from_sorted_unchecked(ranges: Vec<AddrRange>) -> Self {
        let capacity = ranges.len();
        Self {
            ranges: ranges.into_boxed_slice(),
            capacity,
        }
    }

    /// Build from arbitrary ranges: sort by `begin`, then reject inverted or
    /// overlapping entries.
    pub fn from_ranges<I>(ranges: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = AddrRange>,
    {
        let ranges: Vec<AddrRange> = ranges.into_iter().collect();
        let mut builder = RangeTableBuilder::new(ranges.len());
        for r in ranges {
            builder.push(r)?;
        }
        builder.build()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&AddrRange> {
        self.ranges.get(index)
    }

    #[must_use]
    pub fn ranges(&self) -> &[AddrRange] {
        &self.ranges
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Verify the sorted/disjoint invariants the validator assumes.
    ///
    /// Linear in table size. Runs once per publish, never per access.
    pub fn audit(&self) -> Result<(), TableError> {
        for (index, range) in self.ranges.iter().enumerate() {
            if range.end < range.begin {
                return Err(TableError::InvertedRange {
                    index,
                    range: *range,
                });
            }
            if index == 0 {
                continue;
            }
            let prev = index - 1;
            let prev_range = self.ranges[prev];
            if range.begin < prev_range.begin {
                return Err(TableError::Unsorted { prev, index });
            }
            if range.begin < prev_range.end {
                return Err(TableError::Overlapping {
                    prev,
                    prev_range,
                    index,
                    range: *range,
                });
            }
        }
        Ok(())
    }

    /// BLAKE3 digest over the little-endian `(begin, end)` pairs.
    ///
    /// Lets decoded diagnostics be tied back to the snapshot they were
    /// produced against.
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        *self.hash().as_bytes()
    }

    /// Hex rendering of [`digest`](Self::digest).
    #[must_use]
    pub fn digest_hex(&self) -> String {
        self.hash().to_hex().to_string()
    }

    fn hash(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.ranges.len() as u64).to_le_bytes());
        for r in self.ranges.iter() {
            hasher.update(&r.begin.to_le_bytes());
            hasher.update(&r.end.to_le_bytes());
        }
        hasher.finalize()
    }
}

/// Collects ranges for one table rebuild.
#[derive(Debug, Clone)]
pub struct RangeTableBuilder {
    ranges: Vec<AddrRange>,
    capacity: usize,
}

impl RangeTableBuilder {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            ranges: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Queue a range. Order does not matter; [`build`](Self::build) sorts.
    pub fn push(&mut self, range: AddrRange) -> Result<&mut Self, TableError> {
        if range.end < range.begin {
            return Err(TableError::InvertedRange {
                index: self.ranges.len(),
                range,
            });
        }
        if self.ranges.len() >= self.capacity {
            return Err(TableError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.ranges.push(range);
        Ok(self)
    }

    /// Sort by `begin` and reject overlaps.
    pub fn build(mut self) -> Result<RangeTable, TableError> {
        self.ranges.sort_unstable_by_key(|r| (r.begin, r.end));
        let table = RangeTable {
            ranges: self.ranges.into_boxed_slice(),
            capacity: self.capacity,
        };
        table.audit()?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sorts_input() {
        let mut b = RangeTable::builder(4);
        b.push(AddrRange::new(300, 400)).unwrap();
        b.push(AddrRange::new(100, 200)).unwrap();
        let table = b.build().unwrap();
        assert_eq!(
            table.ranges(),
            &[AddrRange::new(100, 200), AddrRange::new(300, 400)]
        );
        assert_eq!(table.capacity(), 4);
    }

    #[test]
    fn builder_rejects_overlap() {
        let err = RangeTable::from_ranges([AddrRange::new(100, 200), AddrRange::new(150, 250)])
            .unwrap_err();
        assert!(matches!(err, TableError::Overlapping { prev: 0, index: 1, .. }));
    }

    #[test]
    fn adjacent_ranges_are_not_overlapping() {
        let table =
            RangeTable::from_ranges([AddrRange::new(0, 16), AddrRange::new(16, 32)]).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn builder_enforces_capacity() {
        let mut b = RangeTable::builder(1);
        b.push(AddrRange::new(0, 8)).unwrap();
        let err = b.push(AddrRange::new(8, 16)).unwrap_err();
        assert_eq!(err, TableError::CapacityExceeded { capacity: 1 });
    }

    #[test]
    fn inverted_range_rejected() {
        let mut b = RangeTable::builder(1);
        let err = b.push(AddrRange::new(10, 5)).unwrap_err();
        assert!(matches!(err, TableError::InvertedRange { index: 0, .. }));
    }

    #[test]
    fn audit_catches_unsorted_unchecked_table() {
        let table = RangeTable::from_sorted_unchecked(vec![
            AddrRange::new(300, 400),
            AddrRange::new(100, 200),
        ]);
        assert_eq!(table.audit(), Err(TableError::Unsorted { prev: 0, index: 1 }));
    }

    #[test]
    fn digest_tracks_contents() {
        let a = RangeTable::from_ranges([AddrRange::new(0, 16)]).unwrap();
        let b = RangeTable::from_ranges([AddrRange::new(0, 16)]).unwrap();
        let c = RangeTable::from_ranges([AddrRange::new(0, 32)]).unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_eq!(a.digest_hex().len(), 64);
    }

    #[test]
    fn digest_hex_matches_digest_bytes() {
        let t = RangeTable::from_ranges([AddrRange::new(0x10, 0x20), AddrRange::new(0x40, 0x80)]).unwrap();
        let hex = t.digest_hex();
        assert!(hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
        let first = u8::from_str_radix(&hex[..2], 16).unwrap();
        let last = u8::from_str_radix(&hex[62..], 16).unwrap();
        assert_eq!(first, t.digest()[0]);
        assert_eq!(last, t.digest()[31]);
    }

    #[test]
    fn with_len_saturates() {
        let r = AddrRange::with_len(u64::MAX - 4, 100);
        assert_eq!(r.end, u64::MAX);
        assert_eq!(r.len(), 4);
    }
}
