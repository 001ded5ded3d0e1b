//! Fixed-layout diagnostic record for a failed access.
//!
//! One record is [`RECORD_WORDS`] little-endian `u32` words:
//!
//! | word | content |
//! |------|---------|
//! | 0    | record size in words |
//! | 1    | `module_id` (18 bits) \| `group << 18` (5 bits) \| `subcode << 23` (9 bits) |
//! | 2    | `site_id` (27 bits) \| `stage_id << 27` (5 bits) |
//! | 3..6 | stage-info triple |
//! | 6    | `action_id << 16` \| `resource_id` |
//! | 7    | faulting address, low 32 bits |
//! | 8    | faulting address, high 32 bits |
//! | 9    | bit 31 = write \| low 31 bits = alignment (alignment subcode) or size |
//!
//! This layout is the contract with the offline decoder. All offsets live in
//! this file; [`ErrorRecord::encode`] and [`ErrorRecord::decode`] are the only
//! code that touches them.

use thiserror::Error;

use crate::range_validator::{Access, AccessKind, Violation};

/// Record length in 32-bit words.
pub const RECORD_WORDS: usize = 10;

const OFF_SIZE: usize = 0;
const OFF_IDENTITY: usize = 1;
const OFF_SITE_STAGE: usize = 2;
const OFF_STAGE_INFO: usize = 3; // 3 words
const OFF_ACTION_RESOURCE: usize = 6;
const OFF_ADDR_LO: usize = 7;
const OFF_ADDR_HI: usize = 8;
const OFF_PAYLOAD: usize = 9;

pub const MODULE_ID_MASK: u32 = 0x0003_FFFF;
pub const ERROR_GROUP_SHIFT: u32 = 18;
pub const ERROR_GROUP_MASK: u32 = 0x1F;
pub const ERROR_SUBCODE_SHIFT: u32 = 23;
pub const ERROR_SUBCODE_MASK: u32 = 0x1FF;

pub const SITE_ID_MASK: u32 = 0x07FF_FFFF;
pub const STAGE_ID_SHIFT: u32 = 27;
pub const STAGE_ID_MASK: u32 = 0x1F;

pub const ACTION_ID_SHIFT: u32 = 16;
pub const RESOURCE_ID_MASK: u32 = 0xFFFF;

pub const PAYLOAD_WRITE_BIT: u32 = 1 << 31;
pub const PAYLOAD_DETAIL_MASK: u32 = 0x7FFF_FFFF;

/// Error group for device-address range validation.
pub const ERROR_GROUP_DEVICE_ADDRESS: u32 = 3;
/// Span not contained in any allocation. Payload detail = access size.
pub const SUBCODE_UNALLOCATED_REF: u32 = 1;
/// Address misaligned. Payload detail = required alignment.
pub const SUBCODE_ALIGNMENT: u32 = 2;

/// Identifies the invocation a diagnostic came from. Opaque to this crate;
/// passed through verbatim (masked to field widths) into the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ErrorContext {
    /// Source module tag (18 bits on the wire).
    pub module_id: u32,
    /// Instruction / site id within the module (27 bits on the wire).
    pub site_id: u32,
    /// Pipeline stage id (5 bits on the wire).
    pub stage_id: u8,
    pub stage_info: [u32; 3],
    /// Owning action; also selects the per-context error counter.
    pub action_id: u16,
    pub resource_id: u16,
}

impl ErrorContext {
    #[must_use]
    pub const fn for_action(action_id: u16) -> Self {
        Self {
            module_id: 0,
            site_id: 0,
            stage_id: 0,
            stage_info: [0; 3],
            action_id,
            resource_id: 0,
        }
    }

    #[must_use]
    pub const fn with_site(mut self, module_id: u32, site_id: u32) -> Self {
        self.module_id = module_id;
        self.site_id = site_id;
        self
    }

    #[must_use]
    pub const fn with_stage(mut self, stage_id: u8, stage_info: [u32; 3]) -> Self {
        self.stage_id = stage_id;
        self.stage_info = stage_info;
        self
    }

    #[must_use]
    pub const fn with_resource(mut self, resource_id: u16) -> Self {
        self.resource_id = resource_id;
        self
    }
}

/// Wire decode failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecordDecodeError {
    #[error("record truncated: {len} words, need 10")]
    Truncated { len: usize },
    #[error("record size word is {found}, expected 10")]
    BadSize { found: u32 },
    #[error("unknown error group {group}")]
    UnknownGroup { group: u32 },
    #[error("unknown error subcode {subcode}")]
    UnknownSubcode { subcode: u32 },
}

/// One failed validation, ready to serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorRecord {
    pub context: ErrorContext,
    pub violation: Violation,
    pub address: u64,
    pub kind: AccessKind,
    /// Required alignment for [`Violation::Misaligned`], access size otherwise.
    pub detail: u32,
}

impl ErrorRecord {
    /// Build the record for `access` failing with `violation`.
    #[must_use]
    pub const fn for_violation(context: ErrorContext, violation: Violation, access: Access) -> Self {
        let detail = match violation {
            Violation::Misaligned => access.alignment,
            Violation::Unallocated => access.size,
        };
        Self {
            context,
            violation,
            address: access.addr,
            kind: access.kind,
            detail: detail & PAYLOAD_DETAIL_MASK,
        }
    }

    #[must_use]
    pub const fn subcode(&self) -> u32 {
        match self.violation {
            Violation::Unallocated => SUBCODE_UNALLOCATED_REF,
            Violation::Misaligned => SUBCODE_ALIGNMENT,
        }
    }

    /// Serialize to the fixed word layout.
    #[must_use]
    pub fn encode(&self) -> [u32; RECORD_WORDS] {
        let ctx = &self.context;
        let mut w = [0u32; RECORD_WORDS];
        w[OFF_SIZE] = RECORD_WORDS as u32;
        w[OFF_IDENTITY] = (ctx.module_id & MODULE_ID_MASK)
            | ((ERROR_GROUP_DEVICE_ADDRESS & ERROR_GROUP_MASK) << ERROR_GROUP_SHIFT)
            | ((self.subcode() & ERROR_SUBCODE_MASK) << ERROR_SUBCODE_SHIFT);
        w[OFF_SITE_STAGE] = (ctx.site_id & SITE_ID_MASK)
            | ((u32::from(ctx.stage_id) & STAGE_ID_MASK) << STAGE_ID_SHIFT);
        w[OFF_STAGE_INFO..OFF_STAGE_INFO + 3].copy_from_slice(&ctx.stage_info);
        w[OFF_ACTION_RESOURCE] =
            (u32::from(ctx.action_id) << ACTION_ID_SHIFT) | u32::from(ctx.resource_id);
        w[OFF_ADDR_LO] = self.address as u32;
        w[OFF_ADDR_HI] = (self.address >> 32) as u32;
        let write_bit = match self.kind {
            AccessKind::Write => PAYLOAD_WRITE_BIT,
            AccessKind::Read => 0,
        };
        w[OFF_PAYLOAD] = write_bit | (self.detail & PAYLOAD_DETAIL_MASK);
        w
    }

    /// Parse a record from the start of `words`.
    pub fn decode(words: &[u32]) -> Result<Self, RecordDecodeError> {
        let Some(w) = words.get(..RECORD_WORDS) else {
            return Err(RecordDecodeError::Truncated { len: words.len() });
        };
        if w[OFF_SIZE] != RECORD_WORDS as u32 {
            return Err(RecordDecodeError::BadSize { found: w[OFF_SIZE] });
        }

        let identity = w[OFF_IDENTITY];
        let group = (identity >> ERROR_GROUP_SHIFT) & ERROR_GROUP_MASK;
        if group != ERROR_GROUP_DEVICE_ADDRESS {
            return Err(RecordDecodeError::UnknownGroup { group });
        }
        let subcode = (identity >> ERROR_SUBCODE_SHIFT) & ERROR_SUBCODE_MASK;
        let violation = match subcode {
            SUBCODE_UNALLOCATED_REF => Violation::Unallocated,
            SUBCODE_ALIGNMENT => Violation::Misaligned,
            other => return Err(RecordDecodeError::UnknownSubcode { subcode: other }),
        };

        let site_stage = w[OFF_SITE_STAGE];
        let action_resource = w[OFF_ACTION_RESOURCE];
        let context = ErrorContext {
            module_id: identity & MODULE_ID_MASK,
            site_id: site_stage & SITE_ID_MASK,
            stage_id: ((site_stage >> STAGE_ID_SHIFT) & STAGE_ID_MASK) as u8,
            stage_info: [
                w[OFF_STAGE_INFO],
                w[OFF_STAGE_INFO + 1],
                w[OFF_STAGE_INFO + 2],
            ],
            action_id: (action_resource >> ACTION_ID_SHIFT) as u16,
            resource_id: (action_resource & RESOURCE_ID_MASK) as u16,
        };

        let payload = w[OFF_PAYLOAD];
        let kind = if payload & PAYLOAD_WRITE_BIT != 0 {
            AccessKind::Write
        } else {
            AccessKind::Read
        };

        Ok(Self {
            context,
            violation,
            address: u64::from(w[OFF_ADDR_LO]) | (u64::from(w[OFF_ADDR_HI]) << 32),
            kind,
            detail: payload & PAYLOAD_DETAIL_MASK,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ErrorContext {
        ErrorContext::for_action(7)
            .with_site(0x1_2345, 0x44)
            .with_stage(3, [11, 22, 33])
            .with_resource(9)
    }

    #[test]
    fn word_layout_is_stable() {
        let rec = ErrorRecord::for_violation(
            ctx(),
            Violation::Unallocated,
            Access::write(0x0000_00AB_DEAD_BEE0, 8),
        );
        let w = rec.encode();
        assert_eq!(w[0], 10);
        assert_eq!(w[1], 0x1_2345 | (3 << 18) | (1 << 23));
        assert_eq!(w[2], 0x44 | (3 << 27));
        assert_eq!(&w[3..6], &[11, 22, 33]);
        assert_eq!(w[6], (7 << 16) | 9);
        assert_eq!(w[7], 0xDEAD_BEE0);
        assert_eq!(w[8], 0xAB);
        assert_eq!(w[9], PAYLOAD_WRITE_BIT | 8);
    }

    #[test]
    fn payload_carries_alignment_for_misaligned() {
        let rec = ErrorRecord::for_violation(
            ctx(),
            Violation::Misaligned,
            Access::read(104, 4).aligned_to(8),
        );
        let w = rec.encode();
        assert_eq!(w[9], 8);
        assert_eq!((w[1] >> ERROR_SUBCODE_SHIFT) & ERROR_SUBCODE_MASK, SUBCODE_ALIGNMENT);
        let back = ErrorRecord::decode(&w).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn oversized_ids_are_masked() {
        let wide = ErrorContext {
            module_id: u32::MAX,
            site_id: u32::MAX,
            stage_id: u8::MAX,
            ..ErrorContext::default()
        };
        let rec = ErrorRecord::for_violation(wide, Violation::Unallocated, Access::read(0, 1));
        let back = ErrorRecord::decode(&rec.encode()).unwrap();
        assert_eq!(back.context.module_id, MODULE_ID_MASK);
        assert_eq!(back.context.site_id, SITE_ID_MASK);
        assert_eq!(u32::from(back.context.stage_id), STAGE_ID_MASK);
    }

    #[test]
    fn decode_rejects_bad_input() {
        assert_eq!(
            ErrorRecord::decode(&[10, 0, 0]),
            Err(RecordDecodeError::Truncated { len: 3 })
        );
        let mut w = ErrorRecord::for_violation(ctx(), Violation::Unallocated, Access::read(0, 1))
            .encode();
        w[0] = 0;
        assert_eq!(ErrorRecord::decode(&w), Err(RecordDecodeError::BadSize { found: 0 }));
        w[0] = 10;
        w[1] = 1 << ERROR_GROUP_SHIFT;
        assert_eq!(
            ErrorRecord::decode(&w),
            Err(RecordDecodeError::UnknownGroup { group: 1 })
        );
        w[1] = (ERROR_GROUP_DEVICE_ADDRESS << ERROR_GROUP_SHIFT) | (5 << ERROR_SUBCODE_SHIFT);
        assert_eq!(
            ErrorRecord::decode(&w),
            Err(RecordDecodeError::UnknownSubcode { subcode: 5 })
        );
    }
}
