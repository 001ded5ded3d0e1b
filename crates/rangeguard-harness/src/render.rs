//! Deterministic plain-text rendering of decoded guard logs.
//!
//! The primary artifact is JSON ([`DecodeReport`]); this render is for human
//! inspection and diffs.

use std::fmt::Write as _;

use rangeguard_membrane::{AccessKind, Violation};

use crate::decode::{DecodeReport, DecodeStatus, DecodedRecord};

/// One-line human description of a decoded diagnostic.
#[must_use]
pub fn describe_record(rec: &DecodedRecord) -> String {
    match rec.violation {
        Violation::Misaligned => format!(
            "Misaligned access: address {} is not {}-byte aligned",
            rec.address_hex, rec.detail
        ),
        Violation::Unallocated => {
            let verb = match rec.access_kind {
                AccessKind::Write => "written",
                AccessKind::Read => "read",
            };
            format!(
                "Out of bounds access: {} bytes {verb} at address {}",
                rec.detail, rec.address_hex
            )
        }
    }
}

#[must_use]
pub fn render_plain(report: &DecodeReport) -> String {
    let mut out = String::new();

    let status = match report.status {
        DecodeStatus::Clean => "OK",
        DecodeStatus::Overflowed => "OVERFLOW",
        DecodeStatus::Corrupt => "CORRUPT",
    };
    writeln!(
        out,
        "rangeguard log: status={status} written_words={} capacity_words={} records={} dropped>={}",
        report.written_words,
        report.capacity_words,
        report.records_decoded,
        report.records_dropped_estimate,
    )
    .ok();

    if !report.contexts.is_empty() {
        writeln!(out).ok();
        writeln!(out, "{:<8} {:>8} {:>12} {:>11}", "action", "records", "unallocated", "misaligned").ok();
        writeln!(out, "{}", "-".repeat(42)).ok();
        for ctx in &report.contexts {
            writeln!(
                out,
                "{:<8} {:>8} {:>12} {:>11}",
                ctx.action_id, ctx.records, ctx.unallocated, ctx.misaligned
            )
            .ok();
        }
    }

    if !report.records.is_empty() {
        writeln!(out).ok();
        for rec in &report.records {
            writeln!(
                out,
                "[{:>5}] {} (module {}, site {}, stage {}, action {}, resource {})",
                rec.offset,
                describe_record(rec),
                rec.module_id,
                rec.site_id,
                rec.stage_id,
                rec.action_id,
                rec.resource_id,
            )
            .ok();
        }
    }

    for err in &report.structural_errors {
        writeln!(out, "[{:>5}] undecodable record: {}", err.offset, err.message).ok();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_dump;
    use rangeguard_membrane::{Access, BoundedErrorLog, ErrorContext, ErrorRecord};

    #[test]
    fn renders_both_violation_kinds() {
        let log = BoundedErrorLog::new(64, 4, 6);
        let ctx = ErrorContext::for_action(2).with_site(5, 11);
        for (violation, access) in [
            (Violation::Unallocated, Access::read(0x1f4, 8)),
            (Violation::Misaligned, Access::write(0x68, 4).aligned_to(8)),
        ] {
            let _ = log.record_for_context(&ErrorRecord::for_violation(ctx, violation, access));
        }
        let text = render_plain(&decode_dump(&log.dump()));
        assert!(text.starts_with("rangeguard log: status=OK"));
        assert!(text.contains("Out of bounds access: 8 bytes read at address 0x1f4"));
        assert!(text.contains("Misaligned access: address 0x68 is not 8-byte aligned"));
        assert!(text.contains("(module 5, site 11, stage 0, action 2, resource 0)"));
    }

    #[test]
    fn write_verb() {
        let log = BoundedErrorLog::new(16, 1, 1);
        let rec = ErrorRecord::for_violation(
            ErrorContext::for_action(0),
            Violation::Unallocated,
            Access::write(0x10, 2),
        );
        let _ = log.record_for_context(&rec);
        let report = decode_dump(&log.dump());
        assert_eq!(
            describe_record(&report.records[0]),
            "Out of bounds access: 2 bytes written at address 0x10"
        );
    }
}
