// AMIGrid Analytics - Anomaly detection and baselines
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Bounded per-device re-sequencing in front of the sessionizer.

use amigrid::TelemetryReading;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::{BTreeMap, HashMap};

type OrderKey = (DateTime<Utc>, u64);

fn key(reading: &TelemetryReading) -> OrderKey {
    (reading.event_time, reading.sequence)
}

#[derive(Debug, Clone, Default)]
struct DeviceWindow {
    pending: BTreeMap<OrderKey, TelemetryReading>,
    last_released: Option<OrderKey>,
}

impl DeviceWindow {
    fn pop_first(&mut self) -> Option<TelemetryReading> {
        let first = *self.pending.keys().next()?;
        let reading = self.pending.remove(&first)?;
        self.last_released = Some(first);
        Some(reading)
    }
}

/// Holds up to `depth` readings per device and releases them in
/// `(event_time, sequence)` order.
///
/// A reading that sorts at or before the last one released for its device
/// is too late to be placed; it is counted and discarded.
#[derive(Debug, Clone)]
pub struct OrderedIngest {
    depth: usize,
    devices: HashMap<String, DeviceWindow>,
    late: u64,
}

impl OrderedIngest {
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            devices: HashMap::new(),
            late: 0,
        }
    }

    /// Accept a reading; returns whatever is now safe to release.
    pub fn push(&mut self, reading: TelemetryReading) -> Vec<TelemetryReading> {
        let k = key(&reading);
        let window = self.devices.entry(reading.device_id.clone()).or_default();

        if matches!(window.last_released, Some(last) if k <= last) {
            self.late += 1;
            debug!(
                "Discarded late reading {}#{} ({})",
                reading.device_id, reading.sequence, reading.event_time
            );
            return Vec::new();
        }

        window.pending.insert(k, reading);
        let mut released = Vec::new();
        while window.pending.len() > self.depth {
            match window.pop_first() {
                Some(r) => released.push(r),
                None => break,
            }
        }
        released
    }

    /// Release everything held, device by device.
    pub fn flush(&mut self) -> Vec<TelemetryReading> {
        let mut ids: Vec<_> = self.devices.keys().cloned().collect();
        ids.sort();
        let mut out = Vec::new();
        for id in ids {
            if let Some(window) = self.devices.get_mut(&id) {
                while let Some(r) = window.pop_first() {
                    out.push(r);
                }
            }
        }
        out
    }

    /// Readings currently held across all devices.
    pub fn pending(&self) -> usize {
        self.devices.values().map(|w| w.pending.len()).sum()
    }

    /// Readings discarded for arriving too late.
    pub fn late_count(&self) -> u64 {
        self.late
    }
}
