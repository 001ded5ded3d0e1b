//! Offline decoding of exported guard logs.
//!
//! Ingests a [`LogDump`] (cursor word + buffer, little-endian on disk) and
//! turns every stored record slot into an explainable, deterministic
//! [`DecodeReport`] suitable for diffs.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Serialize, Serializer};
use thiserror::Error;

use rangeguard_membrane::error_record::RECORD_WORDS;
use rangeguard_membrane::{AccessKind, ErrorRecord, LogDump, RecordDecodeError, Violation};

#[derive(Debug, Error)]
pub enum DumpDecodeError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("input length {len} is not a multiple of 4")]
    MisalignedInput { len: usize },
    #[error("dump is empty")]
    EmptyInput,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecodeReport {
    pub written_words: u32,
    pub capacity_words: usize,
    pub overflowed: bool,
    pub records_decoded: usize,
    /// Records whose reservation landed past capacity. A lower bound when
    /// the cursor word saturated.
    pub records_dropped_estimate: u64,
    pub structural_errors: Vec<SlotError>,
    pub contexts: Vec<ContextSummary>,
    pub records: Vec<DecodedRecord>,
    pub status: DecodeStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum DecodeStatus {
    Clean,
    Overflowed,
    Corrupt,
}

/// A record slot inside the written region that did not decode.
#[derive(Debug, Clone, Serialize)]
pub struct SlotError {
    pub offset: usize,
    pub error: &'static str,
    pub message: String,
}

/// Decoded diagnostics grouped by action id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextSummary {
    pub action_id: u16,
    pub records: usize,
    pub unallocated: usize,
    pub misaligned: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecodedRecord {
    pub offset: usize,
    pub module_id: u32,
    pub site_id: u32,
    pub stage_id: u8,
    pub stage_info: [u32; 3],
    pub action_id: u16,
    pub resource_id: u16,
    #[serde(serialize_with = "violation_str")]
    pub violation: Violation,
    #[serde(serialize_with = "access_kind_str")]
    pub access_kind: AccessKind,
    pub address: u64,
    pub address_hex: String,
    /// Required alignment for misaligned records, access size otherwise.
    pub detail: u32,
}

impl DecodedRecord {
    fn new(offset: usize, rec: &ErrorRecord) -> Self {
        let ctx = &rec.context;
        Self {
            offset,
            module_id: ctx.module_id,
            site_id: ctx.site_id,
            stage_id: ctx.stage_id,
            stage_info: ctx.stage_info,
            action_id: ctx.action_id,
            resource_id: ctx.resource_id,
            violation: rec.violation,
            access_kind: rec.kind,
            address: rec.address,
            address_hex: format!("{:#x}", rec.address),
            detail: rec.detail,
        }
    }
}

fn violation_str<S: Serializer>(v: &Violation, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(v.as_str())
}

fn access_kind_str<S: Serializer>(k: &AccessKind, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(k.as_str())
}

/// Decode a dump file written by `run-scenario --dump`.
pub fn decode_dump_file(input: &Path) -> Result<DecodeReport, DumpDecodeError> {
    let bytes = std::fs::read(input)?;
    decode_dump_bytes(&bytes)
}

/// Decode little-endian dump bytes.
pub fn decode_dump_bytes(bytes: &[u8]) -> Result<DecodeReport, DumpDecodeError> {
    if bytes.is_empty() {
        return Err(DumpDecodeError::EmptyInput);
    }
    let dump = LogDump::from_le_bytes(bytes)
        .ok_or(DumpDecodeError::MisalignedInput { len: bytes.len() })?;
    Ok(decode_dump(&dump))
}

/// Decode an in-memory dump.
#[must_use]
pub fn decode_dump(dump: &LogDump) -> DecodeReport {
    let mut records = Vec::new();
    let mut structural_errors = Vec::new();
    let mut by_context: BTreeMap<u16, ContextSummary> = BTreeMap::new();

    for (offset, words) in dump.record_slots() {
        match ErrorRecord::decode(words) {
            Ok(rec) => {
                let entry = by_context
                    .entry(rec.context.action_id)
                    .or_insert_with(|| ContextSummary {
                        action_id: rec.context.action_id,
                        ..ContextSummary::default()
                    });
                entry.records += 1;
                match rec.violation {
                    Violation::Unallocated => entry.unallocated += 1,
                    Violation::Misaligned => entry.misaligned += 1,
                }
                records.push(DecodedRecord::new(offset, &rec));
            }
            Err(e) => structural_errors.push(SlotError {
                offset,
                error: compact_record_error(e),
                message: e.to_string(),
            }),
        }
    }

    let stored_words = (records.len() + structural_errors.len()) * RECORD_WORDS;
    let records_dropped_estimate = if dump.overflowed() {
        u64::from(dump.written_words()).saturating_sub(stored_words as u64) / RECORD_WORDS as u64
    } else {
        0
    };

    let status = if !structural_errors.is_empty() {
        DecodeStatus::Corrupt
    } else if dump.overflowed() {
        DecodeStatus::Overflowed
    } else {
        DecodeStatus::Clean
    };

    DecodeReport {
        written_words: dump.written_words(),
        capacity_words: dump.capacity_words(),
        overflowed: dump.overflowed(),
        records_decoded: records.len(),
        records_dropped_estimate,
        structural_errors,
        contexts: by_context.into_values().collect(),
        records,
        status,
    }
}

fn compact_record_error(e: RecordDecodeError) -> &'static str {
    match e {
        RecordDecodeError::Truncated { .. } => "truncated",
        RecordDecodeError::BadSize { .. } => "bad_size",
        RecordDecodeError::UnknownGroup { .. } => "unknown_group",
        RecordDecodeError::UnknownSubcode { .. } => "unknown_subcode",
    }
}
