//! Per-access guard: validate, and on failure try to log a diagnostic.
//!
//! Pipeline stages:
//! 0. Check level (`off` returns [`Verdict::Bypassed`])
//! 1. Range validation against the lane cache + table
//! 2. On failure only: build the record and append it to the bounded log
//!
//! The verdict is returned whether or not stage 2 stored anything.

use crate::config::GuardConfig;
use crate::error_log::{BoundedErrorLog, RecordOutcome};
use crate::error_record::{ErrorContext, ErrorRecord};
use crate::lane_cache::LaneCache;
use crate::metrics::GuardMetrics;
use crate::range_table::RangeTable;
use crate::range_validator::{Access, ResolvedBy, Verdict, Violation, validate};

/// Validation + logging for one unit of work.
#[derive(Debug)]
pub struct GuardPipeline {
    config: GuardConfig,
    log: BoundedErrorLog,
    metrics: GuardMetrics,
}

impl GuardPipeline {
    #[must_use]
    pub fn new(config: GuardConfig) -> Self {
        Self {
            log: BoundedErrorLog::from_config(&config),
            metrics: GuardMetrics::new(),
            config,
        }
    }

    /// Check one access. Never blocks, never panics.
    pub fn check(
        &self,
        cache: &mut LaneCache,
        table: &RangeTable,
        ctx: &ErrorContext,
        access: Access,
    ) -> Verdict {
        if !self.config.level.validation_enabled() {
            GuardMetrics::inc(&self.metrics.bypassed);
            return Verdict::Bypassed;
        }
        GuardMetrics::inc(&self.metrics.validations);

        let verdict = validate(cache, table, access);
        match verdict {
            Verdict::Valid(ResolvedBy::Cache) => {
                GuardMetrics::inc(&self.metrics.cache_hits);
            }
            Verdict::Valid(ResolvedBy::Scan { .. }) => {
                GuardMetrics::inc(&self.metrics.scans);
                GuardMetrics::add(&self.metrics.scan_probes, u64::from(cache.last_probes()));
            }
            Verdict::Invalid(violation) => {
                GuardMetrics::add(&self.metrics.scan_probes, u64::from(cache.last_probes()));
                self.report(ctx, violation, access);
            }
            Verdict::Bypassed => {}
        }
        verdict
    }

    fn report(&self, ctx: &ErrorContext, violation: Violation, access: Access) {
        match violation {
            Violation::Misaligned => GuardMetrics::inc(&self.metrics.misaligned),
            Violation::Unallocated => GuardMetrics::inc(&self.metrics.unallocated),
        }

        let record = ErrorRecord::for_violation(*ctx, violation, access);
        let counter = match self.log.record_for_context(&record) {
            Some(RecordOutcome::Written { .. }) => &self.metrics.records_written,
            Some(RecordOutcome::CapReached) => &self.metrics.records_capped,
            Some(RecordOutcome::Overflowed { .. }) => &self.metrics.records_overflowed,
            None => &self.metrics.records_unscoped,
        };
        GuardMetrics::inc(counter);
    }

    #[must_use]
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    #[must_use]
    pub fn log(&self) -> &BoundedErrorLog {
        &self.log
    }

    #[must_use]
    pub fn metrics(&self) -> &GuardMetrics {
        &self.metrics
    }

    /// Clear log, counters and metrics for the next unit of work.
    pub fn reset(&mut self) {
        self.log.reset();
        self.metrics.reset();
    }
}
