// AMIGrid - AMI smart-meter telemetry core
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Dead-letter routing for rejected records.
//!
//! Validation failures never abort the stream. The offending payload is
//! quarantined in a [`DeadLetterSink`] together with the reason and the
//! time of failure, and processing continues with the next record.

use crate::error::ValidationError;
use crate::reading::RawRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// A quarantined record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Payload exactly as received.
    pub original_payload: String,
    /// Human-readable rejection reason.
    pub error_reason: String,
    /// Machine-readable error kind (`schema_error`, `range_error`, ...).
    pub error_kind: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(raw: &RawRecord, error: &ValidationError, failed_at: DateTime<Utc>) -> Self {
        Self {
            original_payload: raw.payload.clone(),
            error_reason: error.to_string(),
            error_kind: error.kind().to_string(),
            failed_at,
        }
    }
}

/// Destination for dead letters.
pub trait DeadLetterSink {
    /// Accept a dead letter.
    fn send(&mut self, letter: DeadLetter);

    /// Flush pending letters, if buffered.
    fn flush(&mut self) {}
}

impl<S: DeadLetterSink + ?Sized> DeadLetterSink for Box<S> {
    fn send(&mut self, letter: DeadLetter) {
        (**self).send(letter)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}

/// Bounded in-memory dead-letter queue.
///
/// When full, the oldest letter is evicted. Evictions are counted so a
/// full queue never hides loss.
#[derive(Debug)]
pub struct MemoryDeadLetterQueue {
    letters: VecDeque<DeadLetter>,
    max_letters: usize,
    total: u64,
    evicted: u64,
    by_kind: BTreeMap<String, u64>,
}

impl Default for MemoryDeadLetterQueue {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl MemoryDeadLetterQueue {
    /// Create a queue holding at most `max_letters`.
    pub fn new(max_letters: usize) -> Self {
        Self {
            letters: VecDeque::with_capacity(max_letters.min(1024)),
            max_letters: max_letters.max(1),
            total: 0,
            evicted: 0,
            by_kind: BTreeMap::new(),
        }
    }

    /// Currently retained letters, oldest first.
    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters.iter().cloned().collect()
    }

    /// Remove and return all retained letters.
    pub fn drain(&mut self) -> Vec<DeadLetter> {
        self.letters.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.letters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.is_empty()
    }

    /// Letters ever received, including evicted ones.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Count of letters received per error kind.
    pub fn counts_by_kind(&self) -> &BTreeMap<String, u64> {
        &self.by_kind
    }
}

impl DeadLetterSink for MemoryDeadLetterQueue {
    fn send(&mut self, letter: DeadLetter) {
        self.total += 1;
        *self.by_kind.entry(letter.error_kind.clone()).or_insert(0) += 1;
        if self.letters.len() >= self.max_letters {
            self.letters.pop_front();
            self.evicted += 1;
        }
        self.letters.push_back(letter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn letter(kind_err: ValidationError, payload: &str) -> DeadLetter {
        DeadLetter::new(
            &RawRecord::new(payload),
            &kind_err,
            Utc.with_ymd_and_hms(2025, 12, 26, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_dead_letter_fields() {
        let dl = letter(ValidationError::missing("voltage"), "{}");
        assert_eq!(dl.original_payload, "{}");
        assert_eq!(dl.error_kind, "schema_error");
        assert!(dl.error_reason.contains("voltage"));

        let json = serde_json::to_value(&dl).unwrap();
        assert_eq!(json["failed_at"], "2025-12-26T00:00:00Z");
    }

    #[test]
    fn test_queue_bounded() {
        let mut q = MemoryDeadLetterQueue::new(2);
        q.send(letter(ValidationError::Malformed("a".into()), "a"));
        q.send(letter(ValidationError::missing("device_id"), "b"));
        q.send(letter(ValidationError::missing("group_id"), "c"));

        assert_eq!(q.len(), 2);
        assert_eq!(q.total(), 3);
        assert_eq!(q.evicted(), 1);
        assert_eq!(q.letters()[0].original_payload, "b");
        assert_eq!(q.counts_by_kind().get("schema_error"), Some(&2));
        assert_eq!(q.counts_by_kind().get("json_decode_error"), Some(&1));
    }

    #[test]
    fn test_boxed_sink() {
        let mut sink: Box<dyn DeadLetterSink> = Box::new(MemoryDeadLetterQueue::new(4));
        sink.send(letter(ValidationError::missing("current"), "x"));
        sink.flush();
    }

    #[test]
    fn test_drain() {
        let mut q = MemoryDeadLetterQueue::default();
        q.send(letter(ValidationError::missing("current"), "x"));
        assert_eq!(q.drain().len(), 1);
        assert!(q.is_empty());
        assert_eq!(q.total(), 1);
    }
}
