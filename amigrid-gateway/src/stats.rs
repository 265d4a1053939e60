// AMIGrid Gateway - Per-pole batching relay
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Relay counters

use serde::Serialize;

/// Observability counters for one relay
///
/// Every received reading ends up in exactly one of `dropped_count`,
/// `published_count`, `lost_record_count` or the relay's pending buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    /// Delivery events ingested
    pub received_count: u64,
    /// Readings lost on the backhaul
    pub dropped_count: u64,
    /// Readings accepted by the transport
    pub published_count: u64,
    pub published_batches: u64,
    /// Publish retries beyond the first attempt
    pub retry_count: u64,
    /// Batches that exhausted their retries
    pub permanent_failure_count: u64,
    /// Readings inside permanently failed batches
    pub lost_record_count: u64,
    /// Readings released after a later reading from the same device
    pub reordered_count: u64,
    /// Flushes forced by the hard cap
    pub forced_flush_count: u64,
    /// Simulated or real backoff accumulated, milliseconds
    pub backoff_ms: u64,
}

impl RelayStats {
    /// Share of received readings that reached the transport
    pub fn delivery_ratio(&self) -> f64 {
        if self.received_count == 0 {
            return 0.0;
        }
        self.published_count as f64 / self.received_count as f64
    }

    /// One-line JSON summary
    pub fn summary(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
