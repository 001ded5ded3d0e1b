//! Bounded, append-only, concurrently written diagnostic log.
//!
//! Writer protocol (single record):
//! 1. bump the owning context's counter; give up if it was already at the cap
//! 2. reserve `RECORD_WORDS` words on the global cursor (one `fetch_add`)
//! 3. give up if the reservation ends past capacity (cursor stays advanced)
//! 4. store the encoded words into the reserved span
//!
//! Every give-up is silent. There are no locks, retries, or CAS loops; the two
//! `fetch_add`s are the only coordination between lanes.
//!
//! ## Read-after-complete
//! Step 4 is a sequence of independent relaxed word stores, not one atomic
//! publication. Readers ([`BoundedErrorLog::records`], [`BoundedErrorLog::dump`])
//! must run only after every writer has finished and been joined. A reader
//! that can overlap writers needs a per-record completion marker, which this
//! log deliberately does not carry.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::config::GuardConfig;
use crate::error_record::{ErrorRecord, RECORD_WORDS, RecordDecodeError};

/// Global "words written" cursor. Monotonic within a unit of work; keeps
/// growing past capacity so overflow is observable afterwards.
#[derive(Debug, Default)]
pub struct WriteCursor(AtomicU64);

impl WriteCursor {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Claim `words` words; returns this caller's exclusive start offset.
    #[inline]
    pub fn reserve(&self, words: u64) -> u64 {
        self.0.fetch_add(words, Ordering::Relaxed)
    }

    #[must_use]
    pub fn load(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&mut self) {
        *self.0.get_mut() = 0;
    }
}

/// Failures seen for one context in the current unit of work.
#[derive(Debug, Default)]
pub struct ContextErrorCounter(AtomicU64);

impl ContextErrorCounter {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Count one failure; true if the count before it was below `cap`.
    ///
    /// Always increments, so the counter keeps tallying attempts past the cap.
    #[inline]
    pub fn increment_if_below(&self, cap: u32) -> bool {
        self.0.fetch_add(1, Ordering::Relaxed) < u64::from(cap)
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&mut self) {
        *self.0.get_mut() = 0;
    }
}

/// What happened to one attempted record. Advisory; callers may ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Record stored at this word offset.
    Written { offset: usize },
    /// Context already at its cap; neither cursor nor buffer touched.
    CapReached,
    /// Reserved past capacity; nothing stored.
    Overflowed { offset: u64 },
}

/// Fixed-capacity error log plus its per-context counters.
pub struct BoundedErrorLog {
    words: Box<[AtomicU32]>,
    cursor: WriteCursor,
    counters: Box<[ContextErrorCounter]>,
    max_per_context: u32,
}

impl std::fmt::Debug for BoundedErrorLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedErrorLog")
            .field("capacity_words", &self.words.len())
            .field("written_words", &self.cursor.load())
            .field("context_slots", &self.counters.len())
            .field("max_per_context", &self.max_per_context)
            .finish_non_exhaustive()
    }
}

impl BoundedErrorLog {
    /// Allocate the buffer and counters up front; recording never allocates.
    #[must_use]
    pub fn new(capacity_words: usize, context_slots: usize, max_per_context: u32) -> Self {
        let words: Vec<AtomicU32> = (0..capacity_words).map(|_| AtomicU32::new(0)).collect();
        let counters: Vec<ContextErrorCounter> =
            (0..context_slots).map(|_| ContextErrorCounter::new()).collect();
        Self {
            words: words.into_boxed_slice(),
            cursor: WriteCursor::new(),
            counters: counters.into_boxed_slice(),
            max_per_context,
        }
    }

    #[must_use]
    pub fn from_config(config: &GuardConfig) -> Self {
        Self::new(
            config.log_capacity_words,
            config.context_slots,
            config.max_errors_per_context,
        )
    }

    /// Counter for `action_id`, or `None` if the id has no slot.
    #[inline]
    #[must_use]
    pub fn counter(&self, action_id: u16) -> Option<&ContextErrorCounter> {
        self.counters.get(usize::from(action_id))
    }

    /// Attempt to append `record`, charging it to `counter`.
    pub fn record(&self, counter: &ContextErrorCounter, record: &ErrorRecord) -> RecordOutcome {
        if !counter.increment_if_below(self.max_per_context) {
            return RecordOutcome::CapReached;
        }

        let offset = self.cursor.reserve(RECORD_WORDS as u64);
        let capacity = self.words.len() as u64;
        if offset.saturating_add(RECORD_WORDS as u64) > capacity {
            return RecordOutcome::Overflowed { offset };
        }

        let base = offset as usize;
        let Some(slot) = self.words.get(base..base + RECORD_WORDS) else {
            return RecordOutcome::Overflowed { offset };
        };
        for (dst, word) in slot.iter().zip(record.encode()) {
            dst.store(word, Ordering::Relaxed);
        }
        RecordOutcome::Written { offset: base }
    }

    /// Append `record` under the counter its context's action id selects.
    ///
    /// Returns `None` when the action id has no counter slot; the record is
    /// dropped without touching the log.
    pub fn record_for_context(&self, record: &ErrorRecord) -> Option<RecordOutcome> {
        let counter = self.counter(record.context.action_id)?;
        Some(self.record(counter, record))
    }

    #[must_use]
    pub fn capacity_words(&self) -> usize {
        self.words.len()
    }

    #[must_use]
    pub fn context_slots(&self) -> usize {
        self.counters.len()
    }

    #[must_use]
    pub fn max_per_context(&self) -> u32 {
        self.max_per_context
    }

    /// Raw cursor value; may exceed capacity.
    #[must_use]
    pub fn written_words(&self) -> u64 {
        self.cursor.load()
    }

    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.written_words() > self.words.len() as u64
    }

    /// Number of records actually stored.
    #[must_use]
    pub fn stored_records(&self) -> usize {
        stored_record_count(self.written_words(), self.words.len())
    }

    /// Decode every stored record, in buffer order. Read-after-complete only.
    pub fn records(&self) -> impl Iterator<Item = Result<ErrorRecord, RecordDecodeError>> + '_ {
        (0..self.stored_records()).map(move |i| {
            let base = i * RECORD_WORDS;
            let mut words = [0u32; RECORD_WORDS];
            for (dst, src) in words.iter_mut().zip(&self.words[base..base + RECORD_WORDS]) {
                *dst = src.load(Ordering::Relaxed);
            }
            ErrorRecord::decode(&words)
        })
    }

    /// Snapshot cursor + buffer in the export format. Read-after-complete only.
    #[must_use]
    pub fn dump(&self) -> LogDump {
        let mut words = Vec::with_capacity(self.words.len() + 1);
        words.push(u32::try_from(self.written_words()).unwrap_or(u32::MAX));
        words.extend(self.words.iter().map(|w| w.load(Ordering::Relaxed)));
        LogDump { words }
    }

    /// Empty the log for the next unit of work. Exclusive access proves no
    /// writer is live.
    pub fn reset(&mut self) {
        self.cursor.reset();
        for w in self.words.iter_mut() {
            *w.get_mut() = 0;
        }
        for c in self.counters.iter_mut() {
            c.reset();
        }
    }
}

fn stored_record_count(written_words: u64, capacity_words: usize) -> usize {
    let filled = written_words.min(capacity_words as u64) as usize;
    filled / RECORD_WORDS
}

/// Exported log contents: word 0 is the written cursor (saturated to `u32`),
/// followed by every buffer word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDump {
    words: Vec<u32>,
}

impl LogDump {
    /// Wrap words in the export format. `None` if the cursor word is missing.
    #[must_use]
    pub fn from_words(words: Vec<u32>) -> Option<Self> {
        if words.is_empty() {
            return None;
        }
        Some(Self { words })
    }

    /// Parse little-endian bytes. `None` unless the length is a non-zero
    /// multiple of four.
    #[must_use]
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() % 4 != 0 {
            return None;
        }
        let words = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Some(Self { words })
    }

    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.words.len() * 4);
        for w in &self.words {
            out.extend_from_slice(&w.to_le_bytes());
        }
        out
    }

    #[must_use]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    #[must_use]
    pub fn written_words(&self) -> u32 {
        self.words[0]
    }

    #[must_use]
    pub fn capacity_words(&self) -> usize {
        self.words.len() - 1
    }

    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.written_words() as usize > self.capacity_words()
    }

    #[must_use]
    pub fn buffer(&self) -> &[u32] {
        &self.words[1..]
    }

    /// `(word_offset, words)` for every record slot the cursor says was stored.
    pub fn record_slots(&self) -> impl Iterator<Item = (usize, &[u32])> + '_ {
        let count = stored_record_count(u64::from(self.written_words()), self.capacity_words());
        let buffer = self.buffer();
        (0..count).map(move |i| {
            let base = i * RECORD_WORDS;
            (base, &buffer[base..base + RECORD_WORDS])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_record::ErrorContext;
    use crate::range_validator::{Access, Violation};

    fn rec(action_id: u16, addr: u64) -> ErrorRecord {
        ErrorRecord::for_violation(
            ErrorContext::for_action(action_id),
            Violation::Unallocated,
            Access::read(addr, 4),
        )
    }

    #[test]
    fn first_record_lands_at_zero() {
        let log = BoundedErrorLog::new(RECORD_WORDS * 4, 4, 6);
        let out = log.record_for_context(&rec(1, 0x10));
        assert_eq!(out, Some(RecordOutcome::Written { offset: 0 }));
        assert_eq!(log.written_words(), RECORD_WORDS as u64);
        let decoded: Vec<_> = log.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(decoded, vec![rec(1, 0x10)]);
    }

    #[test]
    fn cap_stops_before_reservation() {
        let log = BoundedErrorLog::new(RECORD_WORDS * 16, 4, 2);
        let counter = log.counter(3).unwrap();
        assert!(matches!(log.record(counter, &rec(3, 1)), RecordOutcome::Written { .. }));
        assert!(matches!(log.record(counter, &rec(3, 2)), RecordOutcome::Written { .. }));
        let cursor_at_cap = log.written_words();
        assert_eq!(log.record(counter, &rec(3, 3)), RecordOutcome::CapReached);
        assert_eq!(log.record(counter, &rec(3, 4)), RecordOutcome::CapReached);
        assert_eq!(log.written_words(), cursor_at_cap);
        assert_eq!(counter.count(), 4);
        // Another context is unaffected.
        assert!(matches!(
            log.record_for_context(&rec(2, 5)),
            Some(RecordOutcome::Written { .. })
        ));
    }

    #[test]
    fn overflow_leaves_tail_untouched() {
        // Room for one record plus a partial tail.
        let log = BoundedErrorLog::new(RECORD_WORDS + 3, 4, 10);
        assert_eq!(
            log.record_for_context(&rec(0, 1)),
            Some(RecordOutcome::Written { offset: 0 })
        );
        assert_eq!(
            log.record_for_context(&rec(0, 2)),
            Some(RecordOutcome::Overflowed {
                offset: RECORD_WORDS as u64
            })
        );
        assert!(log.overflowed());
        assert_eq!(log.stored_records(), 1);
        let dump = log.dump();
        assert!(dump.buffer()[RECORD_WORDS..].iter().all(|&w| w == 0));
        assert_eq!(dump.written_words() as usize, RECORD_WORDS * 2);
    }

    #[test]
    fn unscoped_action_is_dropped() {
        let log = BoundedErrorLog::new(RECORD_WORDS * 2, 2, 6);
        assert_eq!(log.record_for_context(&rec(5, 1)), None);
        assert_eq!(log.written_words(), 0);
    }

    #[test]
    fn reset_clears_everything() {
        let mut log = BoundedErrorLog::new(RECORD_WORDS * 2, 2, 1);
        let _ = log.record_for_context(&rec(1, 1));
        let _ = log.record_for_context(&rec(1, 2));
        log.reset();
        assert_eq!(log.written_words(), 0);
        assert_eq!(log.counter(1).unwrap().count(), 0);
        assert!(log.dump().buffer().iter().all(|&w| w == 0));
        assert!(matches!(
            log.record_for_context(&rec(1, 3)),
            Some(RecordOutcome::Written { offset: 0 })
        ));
    }

    #[test]
    fn dump_bytes_roundtrip_keeps_slots() {
        let log = BoundedErrorLog::new(RECORD_WORDS * 3, 2, 6);
        let _ = log.record_for_context(&rec(0, 0xAA));
        let _ = log.record_for_context(&rec(1, 0xBB));
        let dump = log.dump();
        let parsed = LogDump::from_le_bytes(&dump.to_le_bytes()).unwrap();
        assert_eq!(parsed, dump);
        let offsets: Vec<usize> = parsed.record_slots().map(|(off, _)| off).collect();
        assert_eq!(offsets, vec![0, RECORD_WORDS]);
        assert!(LogDump::from_le_bytes(&[1, 2, 3]).is_none());
        assert!(LogDump::from_words(Vec::new()).is_none());
    }

    #[test]
    fn cursor_reserve_returns_previous_value() {
        let cursor = WriteCursor::new();
        assert_eq!(cursor.reserve(10), 0);
        assert_eq!(cursor.reserve(10), 10);
        assert_eq!(cursor.load(), 20);
    }
}
