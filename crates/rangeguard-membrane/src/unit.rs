//! Unit-of-work lifecycle: publish a table, hand out lanes, collect the log.
//!
//! A unit owns the range table snapshot and the pipeline (log + counters).
//! [`UnitOfWork::begin`] takes `&mut self`, so the borrow checker guarantees
//! no [`Lane`] from the previous unit is still alive when the table is
//! swapped and the log is reset. Lanes borrow the table; checking never
//! locks.

use crate::config::GuardConfig;
use crate::error_log::LogDump;
use crate::error_record::ErrorContext;
use crate::lane_cache::LaneCache;
use crate::metrics::MetricsSnapshot;
use crate::pipeline::GuardPipeline;
use crate::range_table::{RangeTable, TableError};
use crate::range_validator::{Access, Verdict};

/// One independent execution lane: a table snapshot plus its private cache.
#[derive(Debug)]
pub struct Lane<'u> {
    table: &'u RangeTable,
    cache: LaneCache,
}

impl Lane<'_> {
    #[must_use]
    pub fn cache(&self) -> &LaneCache {
        &self.cache
    }

    #[must_use]
    pub fn table(&self) -> &RangeTable {
        self.table
    }
}

/// Table + log lifetime for one outer unit of work (e.g. one submission).
#[derive(Debug)]
pub struct UnitOfWork {
    table: RangeTable,
    pipeline: GuardPipeline,
    epoch: u64,
}

impl UnitOfWork {
    /// Create an idle unit with an empty table.
    #[must_use]
    pub fn new(config: GuardConfig) -> Self {
        Self {
            table: RangeTable::from_sorted_unchecked(Vec::new()),
            pipeline: GuardPipeline::new(config),
            epoch: 0,
        }
    }

    /// Publish `table` and reset the log for a new unit.
    ///
    /// When the check level audits tables, an unsorted or overlapping table is
    /// rejected and the previous unit's state is left in place.
    pub fn begin(&mut self, table: RangeTable) -> Result<u64, TableError> {
        if self.pipeline.config().level.audits_tables() {
            table.audit()?;
        }
        self.pipeline.reset();
        self.table = table;
        self.epoch += 1;
        Ok(self.epoch)
    }

    /// Start a lane on the current table. `None` while the table is empty.
    #[must_use]
    pub fn lane(&self) -> Option<Lane<'_>> {
        let cache = LaneCache::first(&self.table).ok()?;
        Some(Lane {
            table: &self.table,
            cache,
        })
    }

    /// Check one access on `lane`.
    pub fn check(&self, lane: &mut Lane<'_>, ctx: &ErrorContext, access: Access) -> Verdict {
        self.pipeline.check(&mut lane.cache, lane.table, ctx, access)
    }

    /// Export the log. Call only after every lane has finished.
    #[must_use]
    pub fn finish(&self) -> LogDump {
        self.pipeline.log().dump()
    }

    #[must_use]
    pub fn table(&self) -> &RangeTable {
        &self.table
    }

    #[must_use]
    pub fn pipeline(&self) -> &GuardPipeline {
        &self.pipeline
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.pipeline.metrics().snapshot()
    }

    /// Number of `begin` calls so far.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckLevel;
    use crate::range_table::AddrRange;

    #[test]
    fn idle_unit_has_no_lanes() {
        let unit = UnitOfWork::new(GuardConfig::default());
        assert!(unit.lane().is_none());
        assert_eq!(unit.epoch(), 0);
    }

    #[test]
    fn begin_resets_previous_log() {
        let mut unit = UnitOfWork::new(GuardConfig::default());
        let table = RangeTable::from_ranges([AddrRange::new(0, 64)]).unwrap();
        unit.begin(table.clone()).unwrap();
        {
            let mut lane = unit.lane().unwrap();
            let v = unit.check(&mut lane, &ErrorContext::for_action(0), Access::read(64, 1));
            assert!(!v.is_valid());
        }
        assert_eq!(unit.pipeline().log().stored_records(), 1);

        assert_eq!(unit.begin(table).unwrap(), 2);
        assert_eq!(unit.pipeline().log().stored_records(), 0);
        assert_eq!(unit.metrics().validations, 0);
    }

    #[test]
    fn audited_level_rejects_bad_table() {
        let cfg = GuardConfig {
            level: CheckLevel::Audited,
            ..GuardConfig::default()
        };
        let mut unit = UnitOfWork::new(cfg);
        let bad = RangeTable::from_sorted_unchecked(vec![
            AddrRange::new(0, 100),
            AddrRange::new(50, 150),
        ]);
        assert!(matches!(unit.begin(bad), Err(TableError::Overlapping { .. })));
        assert_eq!(unit.epoch(), 0);
    }

    #[test]
    fn strict_level_trusts_table() {
        let mut unit = UnitOfWork::new(GuardConfig::default());
        let unsorted = RangeTable::from_sorted_unchecked(vec![
            AddrRange::new(300, 400),
            AddrRange::new(100, 200),
        ]);
        assert!(unit.begin(unsorted).is_ok());
    }
}
