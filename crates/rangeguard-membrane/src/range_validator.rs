//! Single-pass bounds validation against a sorted range table.
//!
//! Stages, in priority order:
//! 1. Alignment mask test. Misalignment wins even if the span would fit.
//! 2. Lane cache: one range comparison, no scan, no cache write.
//! 3. Linear scan from index 0 with early exit on `addr < begin`.
//!
//! The early exit and the "spans past end" stop are only sound because the
//! table is sorted by `begin` and disjoint. Nothing here allocates, locks, or
//! panics.

use crate::lane_cache::LaneCache;
use crate::range_table::RangeTable;

/// Direction of an access; carried into the diagnostic payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessKind {
    #[default]
    Read,
    Write,
}

impl AccessKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// One dereference to validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Access {
    pub addr: u64,
    /// Bytes touched starting at `addr`.
    pub size: u32,
    /// Required alignment; a power of two. 0 and 1 both mean unconstrained.
    pub alignment: u32,
    pub kind: AccessKind,
}

impl Access {
    #[must_use]
    pub const fn read(addr: u64, size: u32) -> Self {
        Self {
            addr,
            size,
            alignment: 1,
            kind: AccessKind::Read,
        }
    }

    #[must_use]
    pub const fn write(addr: u64, size: u32) -> Self {
        Self {
            addr,
            size,
            alignment: 1,
            kind: AccessKind::Write,
        }
    }

    #[must_use]
    pub const fn aligned_to(mut self, alignment: u32) -> Self {
        self.alignment = alignment;
        self
    }

    /// Mask test; equivalent to `addr % alignment == 0` for powers of two.
    #[inline]
    #[must_use]
    pub const fn is_aligned(&self) -> bool {
        if self.alignment <= 1 {
            return true;
        }
        debug_assert!(self.alignment.is_power_of_two());
        self.addr & (self.alignment as u64 - 1) == 0
    }

    /// One past the last byte touched, or `None` if that wraps the address space.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> Option<u64> {
        self.addr.checked_add(self.size as u64)
    }
}

/// Why an access was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Violation {
    /// Address not aligned to the required power of two.
    Misaligned,
    /// Span not fully contained in any single range.
    Unallocated,
}

impl Violation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Misaligned => "misaligned",
            Self::Unallocated => "unallocated",
        }
    }
}

/// Which path resolved a valid access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedBy {
    Cache,
    Scan { index: usize },
}

/// Result of validating one access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Valid(ResolvedBy),
    Invalid(Violation),
    /// Validation disabled (`CheckLevel::Off`).
    Bypassed,
}

impl Verdict {
    /// The plain boolean the caller branches on.
    #[inline]
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid(_))
    }

    #[must_use]
    pub const fn violation(&self) -> Option<Violation> {
        match self {
            Self::Invalid(v) => Some(*v),
            _ => None,
        }
    }
}

/// Validate `access` against `table`, consulting and updating `cache`.
pub fn validate(cache: &mut LaneCache, table: &RangeTable, access: Access) -> Verdict {
    // Stage 1: alignment
    if !access.is_aligned() {
        cache.record_scan(0);
        return Verdict::Invalid(Violation::Misaligned);
    }

    let Some(access_end) = access.end() else {
        cache.record_miss();
        cache.record_scan(0);
        return Verdict::Invalid(Violation::Unallocated);
    };

    // Stage 2: cache
    if let Some(range) = cache.cached_range(table)
        && range.contains_span(access.addr, access_end)
    {
        cache.record_hit();
        return Verdict::Valid(ResolvedBy::Cache);
    }
    cache.record_miss();

    // Stage 3: scan
    let mut probes = 0u32;
    for (index, range) in table.ranges().iter().enumerate() {
        probes = probes.saturating_add(1);
        if access.addr < range.begin {
            // Sorted: nothing later can start at or below addr.
            break;
        }
        if access.addr < range.end && access_end > range.end {
            // Starts inside, runs off the end. Disjointness rules out a later match.
            break;
        }
        if access_end <= range.end {
            cache.update(index);
            cache.record_scan(probes);
            return Verdict::Valid(ResolvedBy::Scan { index });
        }
    }
    cache.record_scan(probes);
    Verdict::Invalid(Violation::Unallocated)
}
