// AMIGrid Analytics - Anomaly detection and baselines
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Fixed-window aggregation per group.

use crate::error::{AnalyticsError, Result};
use amigrid::TelemetryReading;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Default window width, seconds.
pub const DEFAULT_WINDOW_SECS: u64 = 60;

/// Per-group statistics for one `[window_start, window_end)` window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowAggregate {
    pub group_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub reading_count: u64,
    pub meter_count: usize,
    pub avg_voltage: f64,
    pub min_voltage: f64,
    pub max_voltage: f64,
    pub total_power: f64,
    pub avg_power: f64,
}

#[derive(Debug, Clone, Default)]
struct Accumulator {
    devices: HashSet<String>,
    count: u64,
    voltage_sum: f64,
    voltage_min: f64,
    voltage_max: f64,
    power_sum: f64,
}

impl Accumulator {
    fn add(&mut self, r: &TelemetryReading) {
        if self.count == 0 {
            self.voltage_min = r.voltage;
            self.voltage_max = r.voltage;
        } else {
            self.voltage_min = self.voltage_min.min(r.voltage);
            self.voltage_max = self.voltage_max.max(r.voltage);
        }
        self.devices.insert(r.device_id.clone());
        self.count += 1;
        self.voltage_sum += r.voltage;
        self.power_sum += r.active_power;
    }

    fn finish(self, group_id: String, start: DateTime<Utc>, width: Duration) -> WindowAggregate {
        let n = self.count as f64;
        WindowAggregate {
            group_id,
            window_start: start,
            window_end: start + width,
            reading_count: self.count,
            meter_count: self.devices.len(),
            avg_voltage: self.voltage_sum / n,
            min_voltage: self.voltage_min,
            max_voltage: self.voltage_max,
            total_power: self.power_sum,
            avg_power: self.power_sum / n,
        }
    }
}

/// Tumbling-window aggregator keyed by `(window_start, group_id)`.
///
/// Windows are aligned to the Unix epoch. A window is emitted by
/// [`drain_closed`](Self::drain_closed) once the watermark reaches its end.
#[derive(Debug, Clone)]
pub struct WindowAggregator {
    width: Duration,
    open: BTreeMap<(DateTime<Utc>, String), Accumulator>,
}

impl WindowAggregator {
    pub fn new(window_secs: u64) -> Result<Self> {
        if window_secs == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "window_secs must be positive".to_string(),
            ));
        }
        Ok(Self {
            width: Duration::seconds(window_secs as i64),
            open: BTreeMap::new(),
        })
    }

    /// Start of the window containing `t`.
    pub fn window_start(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let width = self.width.num_milliseconds();
        let ms = t.timestamp_millis();
        let start = ms - ms.rem_euclid(width);
        Utc.timestamp_millis_opt(start).single().unwrap_or(t)
    }

    pub fn add(&mut self, reading: &TelemetryReading) {
        let start = self.window_start(reading.event_time);
        self.open
            .entry((start, reading.group_id.clone()))
            .or_default()
            .add(reading);
    }

    /// Emit windows ending at or before `watermark`, oldest first.
    pub fn drain_closed(&mut self, watermark: DateTime<Utc>) -> Vec<WindowAggregate> {
        let closed: Vec<_> = self
            .open
            .keys()
            .filter(|(start, _)| *start + self.width <= watermark)
            .cloned()
            .collect();
        closed
            .into_iter()
            .filter_map(|key| {
                let acc = self.open.remove(&key)?;
                Some(acc.finish(key.1, key.0, self.width))
            })
            .collect()
    }

    /// Emit every window still open.
    pub fn flush(&mut self) -> Vec<WindowAggregate> {
        let width = self.width;
        std::mem::take(&mut self.open)
            .into_iter()
            .map(|((start, group), acc)| acc.finish(group, start, width))
            .collect()
    }

    pub fn open_windows(&self) -> usize {
        self.open.len()
    }
}

/// Aggregate a finished set of readings in one pass.
pub fn aggregate_windows<'a, I>(readings: I, window_secs: u64) -> Result<Vec<WindowAggregate>>
where
    I: IntoIterator<Item = &'a TelemetryReading>,
{
    let mut agg = WindowAggregator::new(window_secs)?;
    for r in readings {
        agg.add(r);
    }
    Ok(agg.flush())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 26, 14, 0, 0).unwrap()
    }

    fn reading(device: &str, group: &str, sec: i64, voltage: f64, power: f64) -> TelemetryReading {
        TelemetryReading::new(
            t0() + Duration::seconds(sec),
            device,
            group,
            1,
            voltage,
            power / voltage,
            power,
        )
    }

    #[test]
    fn test_alignment() {
        let agg = WindowAggregator::new(60).unwrap();
        assert_eq!(agg.window_start(t0() + Duration::seconds(59)), t0());
        assert_eq!(
            agg.window_start(t0() + Duration::seconds(61)),
            t0() + Duration::seconds(60)
        );
        assert!(WindowAggregator::new(0).is_err());
    }

    #[test]
    fn test_batch_aggregation() {
        let readings = vec![
            reading("m1", "pole_A", 0, 230.0, 1000.0),
            reading("m2", "pole_A", 30, 250.0, 3000.0),
            reading("m1", "pole_A", 60, 240.0, 500.0),
            reading("m9", "pole_B", 10, 240.0, 700.0),
        ];
        let windows = aggregate_windows(&readings, DEFAULT_WINDOW_SECS).unwrap();
        assert_eq!(windows.len(), 3);

        let first = &windows[0];
        assert_eq!(first.group_id, "pole_A");
        assert_eq!(first.window_start, t0());
        assert_eq!(first.window_end, t0() + Duration::seconds(60));
        assert_eq!(first.reading_count, 2);
        assert_eq!(first.meter_count, 2);
        assert_relative_eq!(first.avg_voltage, 240.0);
        assert_relative_eq!(first.min_voltage, 230.0);
        assert_relative_eq!(first.max_voltage, 250.0);
        assert_relative_eq!(first.total_power, 4000.0);
        assert_relative_eq!(first.avg_power, 2000.0);

        assert_eq!(windows[1].group_id, "pole_B");
        assert_eq!(windows[2].window_start, t0() + Duration::seconds(60));
    }

    #[test]
    fn test_watermark_drain() {
        let mut agg = WindowAggregator::new(60).unwrap();
        agg.add(&reading("m1", "pole_A", 5, 240.0, 100.0));
        agg.add(&reading("m1", "pole_A", 65, 240.0, 100.0));
        assert!(agg.drain_closed(t0() + Duration::seconds(59)).is_empty());
        let closed = agg.drain_closed(t0() + Duration::seconds(60));
        assert_eq!(closed.len(), 1);
        assert_eq!(agg.open_windows(), 1);
        assert_eq!(agg.flush().len(), 1);
        assert_eq!(agg.open_windows(), 0);
    }
}
