//! Structured JSONL logging for scenario runs and decoded diagnostics.
//!
//! Provides:
//! - [`LogEntry`]: canonical JSONL record with required + optional fields.
//! - [`ArtifactIndex`]: links logs to dumps and reports with SHA-256 integrity.
//! - [`LogEmitter`]: writes JSONL lines to a file or an in-memory buffer.
//! - [`validate_log_line`] / [`validate_log_file`]: schema checks.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::Digest;

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Result of one checked access or one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Skip,
    Error,
}

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const MODES: [&str; 3] = ["strict", "audited", "off"];
const OUTCOMES: [&str; 4] = ["pass", "fail", "skip", "error"];
const VIOLATIONS: [&str; 2] = ["unallocated", "misaligned"];
const ACCESS_KINDS: [&str; 2] = ["read", "write"];

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
/// Diagnostic events (those carrying `violation`) must also carry `address`
/// and `action_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    // Required
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    // Optional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Scenario name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    /// Check level (`strict|audited|off`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    /// `unallocated|misaligned`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation: Option<String>,
    /// `read|write`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_kind: Option<String>,
    /// Hex string, `0x` prefixed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_id: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<u16>,
    /// BLAKE3 digest of the range table the diagnostics refer to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create a new log entry with required fields only.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            run_id: None,
            scenario: None,
            mode: None,
            outcome: None,
            violation: None,
            access_kind: None,
            address: None,
            module_id: None,
            site_id: None,
            action_id: None,
            resource_id: None,
            table_digest: None,
            duration_ms: None,
            artifact_refs: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_scenario(mut self, name: impl Into<String>) -> Self {
        self.scenario = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Attach the failed access: violation, kind and address.
    #[must_use]
    pub fn with_violation(
        mut self,
        violation: impl Into<String>,
        access_kind: impl Into<String>,
        address: u64,
    ) -> Self {
        self.violation = Some(violation.into());
        self.access_kind = Some(access_kind.into());
        self.address = Some(format!("{address:#x}"));
        self
    }

    /// Attach the error context identifiers.
    #[must_use]
    pub fn with_context(mut self, module_id: u32, site_id: u32, action_id: u16, resource_id: u16) -> Self {
        self.module_id = Some(module_id);
        self.site_id = Some(site_id);
        self.action_id = Some(action_id);
        self.resource_id = Some(resource_id);
        self
    }

    #[must_use]
    pub fn with_table_digest(mut self, digest: impl Into<String>) -> Self {
        self.table_digest = Some(digest.into());
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn with_artifacts(mut self, refs: Vec<String>) -> Self {
        self.artifact_refs = Some(refs);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Artifact index
// ---------------------------------------------------------------------------

/// A single artifact entry in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: String,
    pub kind: String,
    pub sha256: String,
    pub size_bytes: u64,
}

/// Artifact index linking a run's log to its dump and reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactIndex {
    pub index_version: u32,
    pub run_id: String,
    pub generated_utc: String,
    pub artifacts: Vec<ArtifactEntry>,
}

impl ArtifactIndex {
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            index_version: 1,
            run_id: run_id.into(),
            generated_utc: now_utc(),
            artifacts: Vec::new(),
        }
    }

    /// Add an artifact from its in-memory contents, hashing them.
    pub fn add_bytes(
        &mut self,
        path: impl Into<String>,
        kind: impl Into<String>,
        bytes: &[u8],
    ) -> &mut Self {
        self.artifacts.push(ArtifactEntry {
            path: path.into(),
            kind: kind.into(),
            sha256: sha256_hex(bytes),
            size_bytes: bytes.len() as u64,
        });
        self
    }

    /// Add an artifact by reading and hashing the file at `path`.
    pub fn add_file(&mut self, path: &Path, kind: impl Into<String>) -> std::io::Result<&mut Self> {
        let bytes = std::fs::read(path)?;
        Ok(self.add_bytes(path.display().to_string(), kind, &bytes))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let digest = sha2::Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push(HEX[usize::from(b >> 4)] as char);
        out.push(HEX[usize::from(b & 0x0F)] as char);
    }
    out
}

// ---------------------------------------------------------------------------
// Log emitter
// ---------------------------------------------------------------------------

/// Writes structured JSONL log entries to a file or buffer.
pub struct LogEmitter {
    writer: Box<dyn Write>,
    seq: u64,
    run_id: String,
}

impl LogEmitter {
    /// Create an emitter that writes to a file.
    pub fn to_file(path: &Path, run_id: &str) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self {
            writer: Box::new(std::io::BufWriter::new(file)),
            seq: 0,
            run_id: run_id.to_string(),
        })
    }

    /// Create an emitter that writes to any writer (e.g. a shared buffer in tests).
    #[must_use]
    pub fn to_writer(writer: Box<dyn Write>, run_id: &str) -> Self {
        Self {
            writer,
            seq: 0,
            run_id: run_id.to_string(),
        }
    }

    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("rangeguard::{}::{:03}", self.run_id, self.seq)
    }

    /// Emit a bare event with an auto-generated trace id.
    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<LogEntry> {
        let trace_id = self.next_trace_id();
        let mut entry = LogEntry::new(&trace_id, level, event);
        entry.run_id = Some(self.run_id.clone());
        let line = serde_json::to_string(&entry).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")?;
        Ok(entry)
    }

    /// Emit a fully-populated entry, filling trace and run ids if unset.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        if entry.run_id.is_none() {
            entry.run_id = Some(self.run_id.clone());
        }
        let line = serde_json::to_string(&entry).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validation error for a log line.
#[derive(Debug)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.message
        )
    }
}

fn check_enum(
    obj: &serde_json::Map<String, serde_json::Value>,
    field: &str,
    allowed: &[&str],
    line_number: usize,
    errors: &mut Vec<LogValidationError>,
) {
    if let Some(value) = obj.get(field).and_then(|v| v.as_str())
        && !allowed.contains(&value)
    {
        errors.push(LogValidationError {
            line_number,
            field: field.to_string(),
            message: format!("invalid {field}: '{value}'"),
        });
    }
}

/// Validate a single JSONL line against the schema.
pub fn validate_log_line(
    line: &str,
    line_number: usize,
) -> Result<LogEntry, Vec<LogValidationError>> {
    let mut errors = Vec::new();

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            errors.push(LogValidationError {
                line_number,
                field: "<json>".to_string(),
                message: format!("invalid JSON: {e}"),
            });
            return Err(errors);
        }
    };

    let Some(obj) = value.as_object() else {
        errors.push(LogValidationError {
            line_number,
            field: "<root>".to_string(),
            message: "expected JSON object".to_string(),
        });
        return Err(errors);
    };

    for field in ["timestamp", "trace_id", "level", "event"] {
        if !obj.contains_key(field) {
            errors.push(LogValidationError {
                line_number,
                field: field.to_string(),
                message: "required field missing".to_string(),
            });
        }
    }

    check_enum(obj, "level", &LEVELS, line_number, &mut errors);
    check_enum(obj, "mode", &MODES, line_number, &mut errors);
    check_enum(obj, "outcome", &OUTCOMES, line_number, &mut errors);
    check_enum(obj, "violation", &VIOLATIONS, line_number, &mut errors);
    check_enum(obj, "access_kind", &ACCESS_KINDS, line_number, &mut errors);

    // Diagnostic contract: a violation needs an address and a context.
    if obj.contains_key("violation") {
        match obj.get("address").and_then(|v| v.as_str()) {
            Some(addr) if addr.starts_with("0x") => {}
            Some(addr) => errors.push(LogValidationError {
                line_number,
                field: "address".to_string(),
                message: format!("address must be 0x-prefixed hex, got: '{addr}'"),
            }),
            None => errors.push(LogValidationError {
                line_number,
                field: "address".to_string(),
                message: "diagnostic events must include address".to_string(),
            }),
        }
        if !obj.get("action_id").is_some_and(serde_json::Value::is_u64) {
            errors.push(LogValidationError {
                line_number,
                field: "action_id".to_string(),
                message: "diagnostic events must include action_id".to_string(),
            });
        }
    }

    if let Some(trace_id) = obj.get("trace_id").and_then(|v| v.as_str())
        && !trace_id.contains("::")
    {
        errors.push(LogValidationError {
            line_number,
            field: "trace_id".to_string(),
            message: format!(
                "trace_id should follow <prefix>::<run_id>::<seq> format, got: '{trace_id}'"
            ),
        });
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    serde_json::from_value::<LogEntry>(value).map_err(|e| {
        vec![LogValidationError {
            line_number,
            field: "<deserialization>".to_string(),
            message: format!("failed to deserialize: {e}"),
        }]
    })
}

/// Validate an entire JSONL file.
///
/// Returns the non-empty line count and any validation errors found.
pub fn validate_log_file(path: &Path) -> Result<(usize, Vec<LogValidationError>), std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    let mut all_errors = Vec::new();
    let mut line_count = 0;

    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        line_count += 1;
        if let Err(errs) = validate_log_line(line, i + 1) {
            all_errors.extend(errs);
        }
    }

    Ok((line_count, all_errors))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{:03}Z",
        (secs % 86_400) / 3600,
        (secs % 3600) / 60,
        secs % 60,
        duration.subsec_millis(),
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entry_serializes_required_fields() {
        let entry = LogEntry::new("rangeguard::run-1::001", LogLevel::Info, "scenario_start");
        let json = entry.to_jsonl().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["timestamp"].is_string());
        assert_eq!(parsed["trace_id"], "rangeguard::run-1::001");
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["event"], "scenario_start");
        assert!(parsed.get("violation").is_none());
        assert!(parsed.get("mode").is_none());
    }

    #[test]
    fn diagnostic_entry_round_trips_through_validation() {
        let entry = LogEntry::new("rangeguard::run-1::002", LogLevel::Warn, "diagnostic")
            .with_mode("strict")
            .with_outcome(Outcome::Fail)
            .with_violation("unallocated", "write", 0xdead_beef)
            .with_context(7, 42, 3, 9)
            .with_table_digest("abc");
        let json = entry.to_jsonl().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["address"], "0xdeadbeef");
        assert_eq!(parsed["action_id"], 3);

        let restored = validate_log_line(&json, 1).unwrap();
        assert_eq!(restored.violation.as_deref(), Some("unallocated"));
        assert_eq!(restored.resource_id, Some(9));
    }

    #[test]
    fn validate_missing_required_field() {
        let json = r#"{"timestamp":"2026-01-01T00:00:00Z","level":"info","event":"test"}"#;
        let errors = validate_log_line(json, 1).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "trace_id"));
    }

    #[test]
    fn validate_rejects_unknown_enums() {
        let json = r#"{"timestamp":"t","trace_id":"a::b::c","level":"critical","event":"e","mode":"hardened"}"#;
        let errors = validate_log_line(json, 1).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "level"));
        assert!(errors.iter().any(|e| e.field == "mode"));
    }

    #[test]
    fn validate_diagnostic_requires_address_and_context() {
        let json = r#"{"timestamp":"t","trace_id":"a::b::c","level":"warn","event":"diagnostic","violation":"misaligned"}"#;
        let errors = validate_log_line(json, 4).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "address"));
        assert!(errors.iter().any(|e| e.field == "action_id"));
        assert!(errors.iter().all(|e| e.line_number == 4));
    }

    #[test]
    fn validate_invalid_json() {
        let errors = validate_log_line("not json at all", 1).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "<json>"));
    }

    #[test]
    fn validate_bad_trace_id_format() {
        let json = r#"{"timestamp":"t","trace_id":"no-separator","level":"info","event":"test"}"#;
        let errors = validate_log_line(json, 1).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "trace_id"));
    }

    #[test]
    fn artifact_index_hashes_bytes() {
        let mut idx = ArtifactIndex::new("run-001");
        idx.add_bytes("dump.bin", "log_dump", b"abc");
        let json = idx.to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["index_version"], 1);
        assert_eq!(
            parsed["artifacts"][0]["sha256"],
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(parsed["artifacts"][0]["size_bytes"], 3);
    }

    #[test]
    fn emitter_generates_sequential_trace_ids() {
        let mut emitter = LogEmitter::to_writer(Box::new(Vec::new()), "run-42");
        let e1 = emitter.emit(LogLevel::Info, "start").unwrap();
        let e2 = emitter.emit(LogLevel::Info, "end").unwrap();
        assert!(e1.trace_id.ends_with("::001"));
        assert!(e2.trace_id.ends_with("::002"));
        assert!(e1.trace_id.starts_with("rangeguard::run-42::"));
        assert_eq!(e1.run_id.as_deref(), Some("run-42"));
    }

    #[test]
    fn civil_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(11_016), (2000, 2, 29));
        assert_eq!(civil_from_days(20_454), (2026, 1, 1));
    }
}
