//! Atomic counters for guard observability.
//!
//! All counters use relaxed ordering; they are advisory/diagnostic,
//! not synchronization primitives.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-pipeline operation counters.
#[derive(Debug)]
pub struct GuardMetrics {
    /// Accesses validated (excludes bypassed).
    pub validations: AtomicU64,
    /// Accesses resolved by the lane cache.
    pub cache_hits: AtomicU64,
    /// Accesses resolved by a table scan.
    pub scans: AtomicU64,
    /// Ranges examined across all scans.
    pub scan_probes: AtomicU64,
    /// Alignment violations.
    pub misaligned: AtomicU64,
    /// Unallocated references.
    pub unallocated: AtomicU64,
    /// Accesses passed through with validation off.
    pub bypassed: AtomicU64,
    /// Diagnostics stored in the log.
    pub records_written: AtomicU64,
    /// Diagnostics dropped by the per-context cap.
    pub records_capped: AtomicU64,
    /// Diagnostics dropped because the log was full.
    pub records_overflowed: AtomicU64,
    /// Diagnostics dropped because the action id had no counter slot.
    pub records_unscoped: AtomicU64,
}

impl GuardMetrics {
    /// Create a new zeroed metrics instance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            validations: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            scans: AtomicU64::new(0),
            scan_probes: AtomicU64::new(0),
            misaligned: AtomicU64::new(0),
            unallocated: AtomicU64::new(0),
            bypassed: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            records_capped: AtomicU64::new(0),
            records_overflowed: AtomicU64::new(0),
            records_unscoped: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    #[inline]
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n` to a counter.
    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Snapshot all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            validations: Self::get(&self.validations),
            cache_hits: Self::get(&self.cache_hits),
            scans: Self::get(&self.scans),
            scan_probes: Self::get(&self.scan_probes),
            misaligned: Self::get(&self.misaligned),
            unallocated: Self::get(&self.unallocated),
            bypassed: Self::get(&self.bypassed),
            records_written: Self::get(&self.records_written),
            records_capped: Self::get(&self.records_capped),
            records_overflowed: Self::get(&self.records_overflowed),
            records_unscoped: Self::get(&self.records_unscoped),
        }
    }

    /// Zero every counter. Exclusive access; no lane may be running.
    pub fn reset(&mut self) {
        for counter in [
            &mut self.validations,
            &mut self.cache_hits,
            &mut self.scans,
            &mut self.scan_probes,
            &mut self.misaligned,
            &mut self.unallocated,
            &mut self.bypassed,
            &mut self.records_written,
            &mut self.records_capped,
            &mut self.records_overflowed,
            &mut self.records_unscoped,
        ] {
            *counter.get_mut() = 0;
        }
    }
}

impl Default for GuardMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of all guard counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub validations: u64,
    pub cache_hits: u64,
    pub scans: u64,
    pub scan_probes: u64,
    pub misaligned: u64,
    pub unallocated: u64,
    pub bypassed: u64,
    pub records_written: u64,
    pub records_capped: u64,
    pub records_overflowed: u64,
    pub records_unscoped: u64,
}

impl MetricsSnapshot {
    /// Failed validations of either kind.
    #[must_use]
    pub const fn violations(&self) -> u64 {
        self.misaligned + self.unallocated
    }

    /// Diagnostics attempted but not stored.
    #[must_use]
    pub const fn records_dropped(&self) -> u64 {
        self.records_capped + self.records_overflowed + self.records_unscoped
    }
}
