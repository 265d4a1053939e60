// AMIGrid Analytics - Anomaly detection and baselines
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Group health summary over a time range.

use crate::config::DetectorConfig;
use amigrid::TelemetryReading;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Voltage and load statistics for one group over `[start_time, end_time]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub meter_count: usize,
    pub reading_count: usize,
    pub avg_voltage: f64,
    pub min_voltage: f64,
    pub max_voltage: f64,
    pub voltage_stddev: f64,
    /// Sum of active power over all readings (W).
    pub total_power: f64,
    pub avg_power: f64,
    pub peak_power: f64,
    /// Percentage of readings below the sag threshold, two decimals.
    pub low_voltage_pct: f64,
    /// `(1 - share outside [sag, swell]) * 100`, one decimal.
    pub health_score: f64,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

impl GroupSummary {
    /// Summarize `group_id` readings with `start <= event_time <= end`.
    /// `None` when the range holds no reading for the group.
    pub fn compute<'a, I>(
        readings: I,
        group_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        thresholds: &DetectorConfig,
    ) -> Option<Self>
    where
        I: IntoIterator<Item = &'a TelemetryReading>,
    {
        let mut acc = SummaryAccumulator::new(group_id, thresholds);
        for r in readings
            .into_iter()
            .filter(|r| r.event_time >= start && r.event_time <= end)
        {
            acc.add(r);
        }
        acc.summarize(start, end)
    }
}

/// Running [`GroupSummary`] inputs, fed one reading at a time.
///
/// Holds the distinct meter ids and a handful of scalars, never the
/// readings themselves. Voltage variance uses Welford's update.
#[derive(Debug, Clone)]
pub struct SummaryAccumulator {
    group_id: String,
    sag_threshold: f64,
    swell_threshold: f64,
    meters: BTreeSet<String>,
    count: u64,
    first: Option<DateTime<Utc>>,
    last: Option<DateTime<Utc>>,
    voltage_mean: f64,
    voltage_m2: f64,
    min_voltage: f64,
    max_voltage: f64,
    total_power: f64,
    peak_power: f64,
    low: u64,
    outside: u64,
}

impl SummaryAccumulator {
    pub fn new(group_id: impl Into<String>, thresholds: &DetectorConfig) -> Self {
        Self {
            group_id: group_id.into(),
            sag_threshold: thresholds.sag_threshold,
            swell_threshold: thresholds.swell_threshold,
            meters: BTreeSet::new(),
            count: 0,
            first: None,
            last: None,
            voltage_mean: 0.0,
            voltage_m2: 0.0,
            min_voltage: f64::INFINITY,
            max_voltage: f64::NEG_INFINITY,
            total_power: 0.0,
            peak_power: f64::NEG_INFINITY,
            low: 0,
            outside: 0,
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Fold one reading in. Readings of other groups are ignored.
    pub fn add(&mut self, r: &TelemetryReading) {
        if r.group_id != self.group_id {
            return;
        }
        if !self.meters.contains(&r.device_id) {
            self.meters.insert(r.device_id.clone());
        }
        self.count += 1;
        self.first = Some(self.first.map_or(r.event_time, |t| t.min(r.event_time)));
        self.last = Some(self.last.map_or(r.event_time, |t| t.max(r.event_time)));

        let v = r.voltage;
        let delta = v - self.voltage_mean;
        self.voltage_mean += delta / self.count as f64;
        self.voltage_m2 += delta * (v - self.voltage_mean);
        self.min_voltage = self.min_voltage.min(v);
        self.max_voltage = self.max_voltage.max(v);
        if v < self.sag_threshold {
            self.low += 1;
        }
        if v < self.sag_threshold || v > self.swell_threshold {
            self.outside += 1;
        }

        self.total_power += r.active_power;
        self.peak_power = self.peak_power.max(r.active_power);
    }

    pub fn reading_count(&self) -> u64 {
        self.count
    }

    /// Summary spanning the first to the last event time seen.
    pub fn finish(&self) -> Option<GroupSummary> {
        self.summarize(self.first?, self.last?)
    }

    fn summarize(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<GroupSummary> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        let variance = if self.count < 2 {
            0.0
        } else {
            self.voltage_m2 / (n - 1.0)
        };
        Some(GroupSummary {
            group_id: self.group_id.clone(),
            start_time: start,
            end_time: end,
            meter_count: self.meters.len(),
            reading_count: self.count as usize,
            avg_voltage: self.voltage_mean,
            min_voltage: self.min_voltage,
            max_voltage: self.max_voltage,
            voltage_stddev: variance.max(0.0).sqrt(),
            total_power: self.total_power,
            avg_power: self.total_power / n,
            peak_power: self.peak_power,
            low_voltage_pct: round_to(self.low as f64 / n * 100.0, 2),
            health_score: round_to((1.0 - self.outside as f64 / n) * 100.0, 1),
        })
    }
}
