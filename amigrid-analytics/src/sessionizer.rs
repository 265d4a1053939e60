// AMIGrid Analytics - Anomaly detection and baselines
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Gap-and-island sessionizer.
//!
//! Each device's readings are classified as normal, sag or swell. A
//! maximal run of one violating class is an island; it closes when the
//! class changes or on [`AnomalyDetector::close_all`], and is emitted
//! if either duration rule admits it. Islands are formed by adjacency in
//! the order readings are observed, so a skipped sequence number does not
//! split one.

use crate::config::DetectorConfig;
use crate::error::Result;
use crate::event::{AnomalyEvent, AnomalyKind, DetectionRule, Severity};
use amigrid::TelemetryReading;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use std::collections::HashMap;

/// Open run of violating samples.
#[derive(Debug, Clone)]
struct Island {
    kind: AnomalyKind,
    group_id: String,
    first_time: DateTime<Utc>,
    last_time: DateTime<Utc>,
    first_sequence: u64,
    last_sequence: u64,
    min: f64,
    max: f64,
    sum: f64,
    count: u64,
    missing: u64,
    /// Start of the current run past the critical voltage, if any.
    critical_start: Option<DateTime<Utc>>,
    /// Longest critical run seen so far, inclusive.
    longest_critical: Duration,
}

impl Island {
    fn open(kind: AnomalyKind, reading: &TelemetryReading) -> Self {
        Self {
            kind,
            group_id: reading.group_id.clone(),
            first_time: reading.event_time,
            last_time: reading.event_time,
            first_sequence: reading.sequence,
            last_sequence: reading.sequence,
            min: reading.voltage,
            max: reading.voltage,
            sum: 0.0,
            count: 0,
            missing: 0,
            critical_start: None,
            longest_critical: Duration::zero(),
        }
    }

    fn push(&mut self, reading: &TelemetryReading, config: &DetectorConfig) {
        let v = reading.voltage;
        if self.count > 0 && reading.sequence > self.last_sequence.saturating_add(1) {
            self.missing += reading.sequence - self.last_sequence - 1;
        }
        self.last_time = reading.event_time;
        self.last_sequence = reading.sequence;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        self.sum += v;
        self.count += 1;

        let critical = match self.kind {
            AnomalyKind::Sag => v < config.critical_sag_voltage,
            AnomalyKind::Swell => v > config.critical_swell_voltage,
        };
        if critical {
            let start = *self.critical_start.get_or_insert(reading.event_time);
            let run = reading.event_time - start + config.sample_period();
            if run > self.longest_critical {
                self.longest_critical = run;
            }
        } else {
            self.critical_start = None;
        }
    }

    fn duration(&self, config: &DetectorConfig) -> Duration {
        self.last_time - self.first_time + config.sample_period()
    }

    /// Apply both duration rules; `None` if neither admits the island.
    fn close(self, device_id: &str, config: &DetectorConfig) -> Option<AnomalyEvent> {
        let severity = match self.kind {
            AnomalyKind::Sag => Severity::for_sag(self.min, config),
            AnomalyKind::Swell => Severity::for_swell(self.max, config),
        };
        let (rule, severity) = if self.duration(config) >= config.minimum_duration() {
            (DetectionRule::Sustained, severity)
        } else if self.longest_critical >= config.critical_duration() {
            (DetectionRule::CriticalShort, Severity::Critical)
        } else {
            debug!(
                "Discarded {} island on {}: {} samples",
                self.kind.as_str(),
                device_id,
                self.count
            );
            return None;
        };

        Some(AnomalyEvent {
            device_id: device_id.to_string(),
            group_id: self.group_id,
            kind: self.kind,
            severity,
            rule,
            start_time: self.first_time,
            end_time: self.last_time + config.sample_period(),
            min_value: self.min,
            max_value: self.max,
            avg_value: self.sum / self.count as f64,
            sample_count: self.count,
            first_sequence: self.first_sequence,
            last_sequence: self.last_sequence,
            missing_samples: self.missing,
        })
    }
}

#[derive(Debug, Clone, Default)]
struct DeviceState {
    island: Option<Island>,
    last_time: Option<DateTime<Utc>>,
}

/// Per-device voltage anomaly detector.
///
/// Expects readings in `event_time` order per device; wrap the input in
/// [`OrderedIngest`](crate::OrderedIngest) when the upstream may reorder.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    config: DetectorConfig,
    devices: HashMap<String, DeviceState>,
    readings_observed: u64,
    out_of_order: u64,
    events_emitted: u64,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            devices: HashMap::new(),
            readings_observed: 0,
            out_of_order: 0,
            events_emitted: 0,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Violation class of a voltage, `None` when normal.
    pub fn classify(&self, voltage: f64) -> Option<AnomalyKind> {
        if voltage < self.config.sag_threshold {
            Some(AnomalyKind::Sag)
        } else if voltage > self.config.swell_threshold {
            Some(AnomalyKind::Swell)
        } else {
            None
        }
    }

    /// Feed one reading. Returns the event for an island this reading
    /// closed, if that island qualified.
    pub fn observe(&mut self, reading: &TelemetryReading) -> Option<AnomalyEvent> {
        self.readings_observed += 1;
        let class = self.classify(reading.voltage);
        let state = self.devices.entry(reading.device_id.clone()).or_default();

        if matches!(state.last_time, Some(last) if reading.event_time < last) {
            self.out_of_order += 1;
            debug!(
                "Out-of-order reading {}#{} fed to detector",
                reading.device_id, reading.sequence
            );
        }
        state.last_time = Some(reading.event_time);

        let continues = matches!((&state.island, class), (Some(island), Some(kind)) if island.kind == kind);
        let closed = if continues {
            None
        } else {
            state.island.take()
        };

        if let Some(kind) = class {
            let island = state
                .island
                .get_or_insert_with(|| Island::open(kind, reading));
            island.push(reading, &self.config);
        }

        let event = closed.and_then(|island| island.close(&reading.device_id, &self.config));
        if let Some(ev) = &event {
            self.record(ev);
        }
        event
    }

    /// Feed a slice of readings, collecting emitted events.
    pub fn observe_all<'a, I>(&mut self, readings: I) -> Vec<AnomalyEvent>
    where
        I: IntoIterator<Item = &'a TelemetryReading>,
    {
        readings
            .into_iter()
            .filter_map(|r| self.observe(r))
            .collect()
    }

    /// Close every open island (end of batch or shutdown). Events are
    /// ordered by device id.
    pub fn close_all(&mut self) -> Vec<AnomalyEvent> {
        let mut devices: Vec<_> = self
            .devices
            .iter_mut()
            .filter_map(|(id, state)| state.island.take().map(|island| (id.clone(), island)))
            .collect();
        devices.sort_by(|a, b| a.0.cmp(&b.0));

        let events: Vec<_> = devices
            .into_iter()
            .filter_map(|(id, island)| island.close(&id, &self.config))
            .collect();
        for ev in &events {
            self.record(ev);
        }
        events
    }

    /// Number of devices with an island in progress.
    pub fn open_islands(&self) -> usize {
        self.devices.values().filter(|s| s.island.is_some()).count()
    }

    pub fn readings_observed(&self) -> u64 {
        self.readings_observed
    }

    pub fn out_of_order(&self) -> u64 {
        self.out_of_order
    }

    pub fn events_emitted(&self) -> u64 {
        self.events_emitted
    }

    fn record(&mut self, event: &AnomalyEvent) {
        self.events_emitted += 1;
        info!(
            "{} {} on {} ({}): {:.1}s, min={:.1}V max={:.1}V",
            event.severity.as_str(),
            event.kind.as_str(),
            event.device_id,
            event.group_id,
            event.duration_secs(),
            event.min_value,
            event.max_value
        );
    }
}
