//! JSON-described guard scenarios.
//!
//! A scenario names a range table, optional config overrides and a list of
//! accesses. It runs through one [`UnitOfWork`]; accesses are dealt
//! round-robin onto `threads` lanes that run concurrently. The lane count is
//! clamped to the number of accesses.
//!
//! ```json
//! {
//!   "name": "two-ranges",
//!   "ranges": [{"begin": 100, "end": 200}, {"begin": 300, "end": 400}],
//!   "config": {"mode": "strict", "max_errors_per_context": 6},
//!   "threads": 2,
//!   "accesses": [{"addr": 250, "size": 10, "action_id": 1}]
//! }
//! ```

use std::path::Path;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rangeguard_membrane::{
    Access, AddrRange, CheckLevel, ErrorContext, GuardConfig, LogDump, MetricsSnapshot,
    RangeTable, ResolvedBy, TableError, UnitOfWork, Verdict,
};

use crate::decode::DecodeReport;
use crate::render::describe_record;
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("scenario json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("range table: {0}")]
    Table(#[from] TableError),
    #[error("scenario has no ranges")]
    NoRanges,
    #[error("access {index}: alignment {alignment} is not a power of two")]
    BadAlignment { index: usize, alignment: u32 },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    pub ranges: Vec<RangeSpec>,
    #[serde(default)]
    pub config: ConfigOverrides,
    #[serde(default = "default_threads")]
    pub threads: usize,
    pub accesses: Vec<AccessSpec>,
}

fn default_threads() -> usize {
    1
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RangeSpec {
    pub begin: u64,
    pub end: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverrides {
    pub mode: Option<String>,
    pub max_errors_per_context: Option<u32>,
    pub log_capacity_words: Option<usize>,
    pub context_slots: Option<usize>,
}

impl ConfigOverrides {
    #[must_use]
    pub fn apply(&self, mut base: GuardConfig) -> GuardConfig {
        if let Some(mode) = &self.mode {
            base.level = CheckLevel::from_str_loose(mode);
        }
        if let Some(cap) = self.max_errors_per_context {
            base.max_errors_per_context = cap;
        }
        if let Some(words) = self.log_capacity_words {
            base.log_capacity_words = words;
        }
        if let Some(slots) = self.context_slots {
            base.context_slots = slots;
        }
        base
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct AccessSpec {
    pub addr: u64,
    pub size: u32,
    pub alignment: u32,
    pub write: bool,
    pub module_id: u32,
    pub site_id: u32,
    pub stage_id: u8,
    pub stage_info: [u32; 3],
    pub action_id: u16,
    pub resource_id: u16,
}

impl AccessSpec {
    /// 0 and 1 mean unconstrained; anything else must be a power of two.
    fn alignment_ok(&self) -> bool {
        self.alignment == 0 || self.alignment.is_power_of_two()
    }

    fn access(&self) -> Access {
        let base = if self.write {
            Access::write(self.addr, self.size)
        } else {
            Access::read(self.addr, self.size)
        };
        base.aligned_to(self.alignment)
    }

    fn context(&self) -> ErrorContext {
        ErrorContext::for_action(self.action_id)
            .with_site(self.module_id, self.site_id)
            .with_stage(self.stage_id, self.stage_info)
            .with_resource(self.resource_id)
    }
}

/// Verdict for one access, in scenario order.
#[derive(Debug, Clone, Serialize)]
pub struct AccessVerdict {
    pub index: usize,
    pub lane: usize,
    pub valid: bool,
    pub verdict: &'static str,
}

fn verdict_label(v: Verdict) -> &'static str {
    match v {
        Verdict::Valid(ResolvedBy::Cache) => "valid_cache",
        Verdict::Valid(ResolvedBy::Scan { .. }) => "valid_scan",
        Verdict::Invalid(violation) => violation.as_str(),
        Verdict::Bypassed => "bypassed",
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub name: String,
    pub level: CheckLevel,
    pub table_digest: String,
    pub verdicts: Vec<AccessVerdict>,
    pub metrics: MetricsSnapshot,
    pub dump: LogDump,
    pub duration_ms: u64,
}

impl ScenarioOutcome {
    #[must_use]
    pub fn invalid_count(&self) -> usize {
        self.verdicts.iter().filter(|v| !v.valid).count()
    }

    /// Machine-readable run summary.
    #[must_use]
    pub fn summary_json(&self) -> serde_json::Value {
        let m = &self.metrics;
        serde_json::json!({
            "scenario": self.name,
            "mode": self.level.as_str(),
            "table_digest": self.table_digest,
            "accesses": self.verdicts.len(),
            "invalid": self.invalid_count(),
            "duration_ms": self.duration_ms,
            "metrics": {
                "validations": m.validations,
                "cache_hits": m.cache_hits,
                "scans": m.scans,
                "scan_probes": m.scan_probes,
                "misaligned": m.misaligned,
                "unallocated": m.unallocated,
                "bypassed": m.bypassed,
                "records_written": m.records_written,
                "records_capped": m.records_capped,
                "records_overflowed": m.records_overflowed,
                "records_unscoped": m.records_unscoped,
            },
            "verdicts": self.verdicts,
        })
    }
}

pub fn load_scenario(path: &Path) -> Result<Scenario, ScenarioError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Run `scenario` on top of `base` config.
pub fn run_scenario(scenario: &Scenario, base: GuardConfig) -> Result<ScenarioOutcome, ScenarioError> {
    let started = Instant::now();
    let config = scenario.config.apply(base);

    if scenario.ranges.is_empty() {
        return Err(ScenarioError::NoRanges);
    }
    if let Some((index, spec)) = scenario
        .accesses
        .iter()
        .enumerate()
        .find(|(_, spec)| !spec.alignment_ok())
    {
        return Err(ScenarioError::BadAlignment {
            index,
            alignment: spec.alignment,
        });
    }

    let mut builder = RangeTable::builder(scenario.ranges.len());
    for r in &scenario.ranges {
        builder.push(AddrRange::new(r.begin, r.end))?;
    }
    let table = builder.build()?;
    let table_digest = table.digest_hex();

    let mut unit = UnitOfWork::new(config);
    unit.begin(table)?;

    let lanes = scenario.threads.clamp(1, scenario.accesses.len().max(1));
    let collected: Mutex<Vec<AccessVerdict>> = Mutex::new(Vec::with_capacity(scenario.accesses.len()));

    std::thread::scope(|s| {
        for lane_id in 0..lanes {
            let unit = &unit;
            let collected = &collected;
            let accesses = &scenario.accesses;
            s.spawn(move || {
                // Non-empty table, so a lane always starts.
                let Some(mut lane) = unit.lane() else {
                    return;
                };
                let mut local = Vec::new();
                for (index, spec) in accesses.iter().enumerate().skip(lane_id).step_by(lanes) {
                    let verdict = unit.check(&mut lane, &spec.context(), spec.access());
                    local.push(AccessVerdict {
                        index,
                        lane: lane_id,
                        valid: verdict.is_valid(),
                        verdict: verdict_label(verdict),
                    });
                }
                collected.lock().extend(local);
            });
        }
    });

    let mut verdicts = collected.into_inner();
    verdicts.sort_by_key(|v| v.index);

    Ok(ScenarioOutcome {
        name: scenario.name.clone(),
        level: config.level,
        table_digest,
        verdicts,
        metrics: unit.metrics(),
        dump: unit.finish(),
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}

/// Emit one line per decoded diagnostic plus a summary line.
///
/// `artifact_refs` (e.g. the dump path) are attached to the summary line.
pub fn log_outcome(
    emitter: &mut LogEmitter,
    outcome: &ScenarioOutcome,
    report: &DecodeReport,
    artifact_refs: Vec<String>,
) -> std::io::Result<()> {
    let mode = outcome.level.as_str();
    for rec in &report.records {
        emitter.emit_entry(
            LogEntry::new("", LogLevel::Warn, "diagnostic")
                .with_scenario(&outcome.name)
                .with_mode(mode)
                .with_outcome(Outcome::Fail)
                .with_violation(rec.violation.as_str(), rec.access_kind.as_str(), rec.address)
                .with_context(rec.module_id, rec.site_id, rec.action_id, rec.resource_id)
                .with_table_digest(&outcome.table_digest)
                .with_details(serde_json::json!({
                    "message": describe_record(rec),
                    "offset": rec.offset,
                    "stage_id": rec.stage_id,
                    "stage_info": rec.stage_info,
                    "detail": rec.detail,
                })),
        )?;
    }

    let level = if report.overflowed || !report.structural_errors.is_empty() {
        LogLevel::Warn
    } else {
        LogLevel::Info
    };
    let result = if outcome.invalid_count() == 0 {
        Outcome::Pass
    } else {
        Outcome::Fail
    };
    let mut summary = LogEntry::new("", level, "scenario_summary")
        .with_scenario(&outcome.name)
        .with_mode(mode)
        .with_outcome(result)
        .with_table_digest(&outcome.table_digest)
        .with_duration_ms(outcome.duration_ms);
    if !artifact_refs.is_empty() {
        summary = summary.with_artifacts(artifact_refs);
    }
    emitter.emit_entry(
        summary.with_details(serde_json::json!({
            "summary": outcome.summary_json(),
            "log": {
                "status": report.status,
                "written_words": report.written_words,
                "capacity_words": report.capacity_words,
                "records_decoded": report.records_decoded,
                "records_dropped_estimate": report.records_dropped_estimate,
            },
        })),
    )?;
    emitter.flush()
}
