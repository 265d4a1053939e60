// AMIGrid Exporter - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for the AMIGrid pipeline.
//!
//! Relay counters are exported per group, validation outcomes per error
//! kind, anomalies per kind and severity.

use amigrid_analytics::{AnomalyEvent, WindowAggregate};
use amigrid_gateway::RelayStats;
use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_gauge_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGaugeVec,
    TextEncoder,
};

lazy_static! {
    // ============================================================
    // Edge (meters, backhaul, relay)
    // ============================================================

    /// Readings generated by simulated meters.
    pub static ref READINGS_GENERATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "amigrid_readings_generated_total",
        "Readings generated by simulated meters",
        &["group"]
    ).unwrap();

    /// Readings lost on the backhaul.
    pub static ref RECORDS_DROPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "amigrid_records_dropped_total",
        "Readings lost on the backhaul before reaching the relay",
        &["group"]
    ).unwrap();

    /// Readings accepted by the transport.
    pub static ref RECORDS_PUBLISHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "amigrid_records_published_total",
        "Readings published by the gateway relay",
        &["group"]
    ).unwrap();

    /// Publish retries.
    pub static ref PUBLISH_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "amigrid_publish_retries_total",
        "Batch publish retries after a transient failure",
        &["group"]
    ).unwrap();

    /// Batches that exhausted retries.
    pub static ref PERMANENT_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "amigrid_batch_permanent_failures_total",
        "Batches that failed after every retry",
        &["group"]
    ).unwrap();

    /// Readings inside permanently failed batches.
    pub static ref RECORDS_LOST_TOTAL: IntCounterVec = register_int_counter_vec!(
        "amigrid_records_lost_total",
        "Readings lost inside permanently failed batches",
        &["group"]
    ).unwrap();

    /// Readings waiting in the relay.
    pub static ref RELAY_PENDING: IntGaugeVec = register_int_gauge_vec!(
        "amigrid_relay_pending",
        "Readings in flight or buffered in the relay",
        &["group"]
    ).unwrap();

    // ============================================================
    // Stream (validator, analytics)
    // ============================================================

    /// Readings that passed validation.
    pub static ref VALIDATED_READINGS_TOTAL: IntCounter = register_int_counter!(
        "amigrid_validated_readings_total",
        "Readings that passed validation"
    ).unwrap();

    /// Dead letters by error kind.
    pub static ref DEAD_LETTERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "amigrid_dead_letters_total",
        "Records routed to the dead-letter sink",
        &["error_kind"]
    ).unwrap();

    /// Readings discarded by the re-sequencer for arriving too late.
    pub static ref LATE_READINGS_TOTAL: IntCounter = register_int_counter!(
        "amigrid_late_readings_total",
        "Readings too late to be placed in order"
    ).unwrap();

    /// Anomaly events by kind and severity.
    pub static ref ANOMALY_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "amigrid_anomaly_events_total",
        "Voltage anomaly events detected",
        &["kind", "severity"]
    ).unwrap();

    /// Devices with an island in progress.
    pub static ref OPEN_ISLANDS: Gauge = register_gauge!(
        "amigrid_open_islands",
        "Devices with an open violating run"
    ).unwrap();

    /// Buckets in the current baseline table.
    pub static ref BASELINE_BUCKETS: Gauge = register_gauge!(
        "amigrid_baseline_buckets",
        "Buckets in the current baseline table"
    ).unwrap();

    /// Average voltage of the last closed window per group.
    pub static ref WINDOW_AVG_VOLTAGE: GaugeVec = register_gauge_vec!(
        "amigrid_window_avg_voltage_volts",
        "Average voltage of the last closed window",
        &["group"]
    ).unwrap();

    /// Total power of the last closed window per group.
    pub static ref WINDOW_TOTAL_POWER: GaugeVec = register_gauge_vec!(
        "amigrid_window_total_power_watts",
        "Summed active power of the last closed window",
        &["group"]
    ).unwrap();

    /// Simulated clock, Unix seconds.
    pub static ref SIMULATED_TIME: Gauge = register_gauge!(
        "amigrid_simulated_time_seconds",
        "Simulated clock as Unix time"
    ).unwrap();
}

/// Increment a counter by the growth between two cumulative values.
fn inc_delta(counter: &IntCounterVec, group: &str, before: u64, after: u64) {
    if after > before {
        counter.with_label_values(&[group]).inc_by(after - before);
    }
}

/// Export the growth of relay counters since `before`.
pub fn record_relay_stats(group: &str, before: &RelayStats, after: &RelayStats, pending: usize) {
    inc_delta(&RECORDS_DROPPED_TOTAL, group, before.dropped_count, after.dropped_count);
    inc_delta(&RECORDS_PUBLISHED_TOTAL, group, before.published_count, after.published_count);
    inc_delta(&PUBLISH_RETRIES_TOTAL, group, before.retry_count, after.retry_count);
    inc_delta(
        &PERMANENT_FAILURES_TOTAL,
        group,
        before.permanent_failure_count,
        after.permanent_failure_count,
    );
    inc_delta(&RECORDS_LOST_TOTAL, group, before.lost_record_count, after.lost_record_count);
    RELAY_PENDING.with_label_values(&[group]).set(pending as i64);
}

pub fn record_generated(group: &str) {
    READINGS_GENERATED_TOTAL.with_label_values(&[group]).inc();
}

pub fn record_validated() {
    VALIDATED_READINGS_TOTAL.inc();
}

pub fn record_dead_letter(error_kind: &str) {
    DEAD_LETTERS_TOTAL.with_label_values(&[error_kind]).inc();
}

pub fn record_late(count: u64) {
    LATE_READINGS_TOTAL.inc_by(count);
}

pub fn record_anomaly(event: &AnomalyEvent) {
    ANOMALY_EVENTS_TOTAL
        .with_label_values(&[event.kind.as_str(), event.severity.as_str()])
        .inc();
}

pub fn record_window(window: &WindowAggregate) {
    WINDOW_AVG_VOLTAGE
        .with_label_values(&[&window.group_id])
        .set(window.avg_voltage);
    WINDOW_TOTAL_POWER
        .with_label_values(&[&window.group_id])
        .set(window.total_power);
}

pub fn update_open_islands(open: usize) {
    OPEN_ISLANDS.set(open as f64);
}

pub fn update_baseline_buckets(count: usize) {
    BASELINE_BUCKETS.set(count as f64);
}

pub fn update_simulated_time(unix_secs: i64) {
    SIMULATED_TIME.set(unix_secs as f64);
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
