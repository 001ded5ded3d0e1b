//! Range guard membrane: bounds validation for untrusted addresses.
//!
//! Every access a worker lane makes into a flat address space is checked
//! against a sorted, disjoint table of valid regions. Failures are reported
//! through a bounded, lock-free diagnostic log that is exported once the unit
//! of work completes.
//!
//! # Architecture
//!
//! - **Range table** (`range_table`): Sorted, disjoint `[begin, end)` regions
//! - **Lane cache** (`lane_cache`): Per-lane last-hit index (no sharing, no locks)
//! - **Range validator** (`range_validator`): Alignment + containment check
//! - **Error record** (`error_record`): Fixed 10-word diagnostic wire format
//! - **Error log** (`error_log`): Atomic reservation into a fixed buffer with
//!   per-context caps
//! - **Pipeline** (`pipeline`): Validate, then record on failure
//! - **Unit of work** (`unit`): Table publication, lanes, log export
//! - **Configuration** (`config`): Check level and log sizing
//! - **Metrics** (`metrics`): Atomic counters for observability

#![deny(unsafe_code)]

pub mod config;
pub mod error_log;
pub mod error_record;
pub mod lane_cache;
pub mod metrics;
pub mod pipeline;
pub mod range_table;
pub mod range_validator;
pub mod unit;

pub use config::{CheckLevel, GuardConfig};
pub use error_log::{BoundedErrorLog, LogDump, RecordOutcome};
pub use error_record::{ErrorContext, ErrorRecord, RecordDecodeError};
pub use lane_cache::LaneCache;
pub use metrics::{GuardMetrics, MetricsSnapshot};
pub use pipeline::GuardPipeline;
pub use range_table::{AddrRange, RangeTable, TableError};
pub use range_validator::{Access, AccessKind, ResolvedBy, Verdict, Violation, validate};
pub use unit::{Lane, UnitOfWork};
