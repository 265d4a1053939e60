// AMIGrid Analytics - Anomaly detection and baselines
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Demand-response event performance against the baseline table.

use crate::baseline::{daily_slot_loads, BaselineStore};
use crate::config::BaselineConfig;
use crate::error::{AnalyticsError, Result};
use amigrid::TelemetryReading;
use chrono::{NaiveDate, Timelike};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A curtailment window on one day, `[start_hour, end_hour)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrEvent {
    pub event_date: NaiveDate,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl DrEvent {
    pub fn new(event_date: NaiveDate, start_hour: u32, end_hour: u32) -> Result<Self> {
        if start_hour >= end_hour || end_hour > 24 {
            return Err(AnalyticsError::InvalidConfig(format!(
                "event window {start_hour}:00-{end_hour}:00 is empty or past midnight"
            )));
        }
        Ok(Self {
            event_date,
            start_hour,
            end_hour,
        })
    }

    fn covers(&self, reading: &TelemetryReading) -> bool {
        let t = reading.event_time;
        t.date_naive() == self.event_date && t.hour() >= self.start_hour && t.hour() < self.end_hour
    }
}

/// Performance of one group during the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrPerformance {
    pub group_id: String,
    /// Slots compared against a baseline bucket.
    pub compared_slots: u32,
    /// Slots with readings but no baseline bucket.
    pub skipped_slots: u32,
    pub avg_actual_w: f64,
    pub avg_baseline_w: f64,
    pub avg_reduction_w: f64,
    /// `None` when the baseline average is zero.
    pub reduction_percent: Option<f64>,
    pub total_reduction_kwh: f64,
}

/// Per-group results, largest energy reduction first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrReport {
    pub event: DrEvent,
    pub groups: Vec<DrPerformance>,
    pub total_reduction_kwh: f64,
    pub skipped_slots: u32,
}

#[derive(Debug, Default)]
struct GroupAcc {
    compared: u32,
    skipped: u32,
    actual: f64,
    baseline: f64,
}

/// Compare actual slot load during `event` with the baseline mean.
///
/// Actual load per slot is computed the same way as the baseline value
/// (sum of device means). Slots with no baseline bucket are skipped and
/// counted, never compared against zero.
pub fn evaluate<'a, I>(
    readings: I,
    store: &BaselineStore,
    config: &BaselineConfig,
    event: &DrEvent,
) -> DrReport
where
    I: IntoIterator<Item = &'a TelemetryReading>,
{
    let loads = daily_slot_loads(readings.into_iter().filter(|r| event.covers(r)), config);

    let mut groups: BTreeMap<String, GroupAcc> = BTreeMap::new();
    for ((slot, _date), load) in loads {
        let acc = groups.entry(slot.group_id.clone()).or_default();
        match store.get(&slot) {
            Some(bucket) => {
                acc.compared += 1;
                acc.actual += load.value;
                acc.baseline += bucket.sample_stats.mean;
            }
            None => {
                acc.skipped += 1;
                debug!(
                    "No baseline for {} {:02}:{:02}, slot skipped",
                    slot.group_id, slot.hour_of_day, slot.minute_bucket
                );
            }
        }
    }

    let slot_hours = config.bucket_minutes as f64 / 60.0;
    let skipped_slots = groups.values().map(|g| g.skipped).sum();
    let mut performances: Vec<DrPerformance> = groups
        .into_iter()
        .filter(|(_, acc)| acc.compared > 0)
        .map(|(group_id, acc)| {
            let n = acc.compared as f64;
            let reduction = acc.baseline - acc.actual;
            let avg_baseline_w = acc.baseline / n;
            DrPerformance {
                group_id,
                compared_slots: acc.compared,
                skipped_slots: acc.skipped,
                avg_actual_w: acc.actual / n,
                avg_baseline_w,
                avg_reduction_w: reduction / n,
                reduction_percent: (avg_baseline_w != 0.0)
                    .then(|| reduction / n / avg_baseline_w * 100.0),
                total_reduction_kwh: reduction / 1000.0 * slot_hours,
            }
        })
        .collect();
    performances.sort_by(|a, b| b.total_reduction_kwh.total_cmp(&a.total_reduction_kwh));

    DrReport {
        event: *event,
        total_reduction_kwh: performances.iter().map(|p| p.total_reduction_kwh).sum(),
        groups: performances,
        skipped_slots,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::BaselineAggregator;
    use approx::assert_relative_eq;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(date: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date.and_hms_opt(h, m, 0).unwrap())
    }

    fn reading(group: &str, t: DateTime<Utc>, power: f64) -> TelemetryReading {
        TelemetryReading::new(t, "m1", group, 1, 240.0, power / 240.0, power)
    }

    #[test]
    fn test_event_window_validation() {
        let d = NaiveDate::from_ymd_opt(2025, 12, 26).unwrap();
        assert!(DrEvent::new(d, 17, 17).is_err());
        assert!(DrEvent::new(d, 17, 25).is_err());
        assert!(DrEvent::new(d, 17, 24).is_ok());
    }

    #[test]
    fn test_reduction_against_baseline() {
        let config = BaselineConfig::default().with_exclude_weekends(false);
        let event_day = NaiveDate::from_ymd_opt(2025, 12, 26).unwrap();

        // Baseline: 2 kW in both 17:00 and 17:05 slots on each prior day
        let mut history = Vec::new();
        for back in 1..=3 {
            let d = event_day - Duration::days(back);
            history.push(reading("pole_A", at(d, 17, 0), 2000.0));
            history.push(reading("pole_A", at(d, 17, 5), 2000.0));
        }
        let mut store = BaselineStore::new();
        store.replace(
            BaselineAggregator::new(config.clone())
                .unwrap()
                .compute(&history, event_day, at(event_day, 0, 0)),
        );

        // Event day: load cut to 1.5 kW, plus one slot with no baseline
        let actual = vec![
            reading("pole_A", at(event_day, 17, 0), 1500.0),
            reading("pole_A", at(event_day, 17, 5), 1500.0),
            reading("pole_A", at(event_day, 17, 10), 1500.0),
            reading("pole_A", at(event_day, 19, 0), 100.0),
        ];
        let event = DrEvent::new(event_day, 17, 18).unwrap();
        let report = evaluate(&actual, &store, &config, &event);

        assert_eq!(report.groups.len(), 1);
        let p = &report.groups[0];
        assert_eq!(p.compared_slots, 2);
        assert_eq!(p.skipped_slots, 1);
        assert_relative_eq!(p.avg_actual_w, 1500.0);
        assert_relative_eq!(p.avg_baseline_w, 2000.0);
        assert_relative_eq!(p.avg_reduction_w, 500.0);
        assert_relative_eq!(p.reduction_percent.unwrap(), 25.0);
        // 2 slots * 500 W * 5 min
        assert_relative_eq!(p.total_reduction_kwh, 2.0 * 0.5 * 5.0 / 60.0, epsilon = 1e-12);
        assert_eq!(report.skipped_slots, 1);
    }

    #[test]
    fn test_zero_baseline_has_no_percent() {
        let config = BaselineConfig::default().with_exclude_weekends(false);
        let event_day = NaiveDate::from_ymd_opt(2025, 12, 26).unwrap();
        let history = vec![reading("pole_A", at(event_day - Duration::days(1), 12, 0), 0.0)];
        let mut store = BaselineStore::new();
        store.replace(
            BaselineAggregator::new(config.clone())
                .unwrap()
                .compute(&history, event_day, at(event_day, 0, 0)),
        );

        let actual = vec![reading("pole_A", at(event_day, 12, 0), 300.0)];
        let event = DrEvent::new(event_day, 12, 13).unwrap();
        let report = evaluate(&actual, &store, &config, &event);
        assert_eq!(report.groups[0].reduction_percent, None);
        assert_relative_eq!(report.groups[0].avg_reduction_w, -300.0);
    }

    #[test]
    fn test_no_baseline_means_no_comparison() {
        let config = BaselineConfig::default();
        let event_day = NaiveDate::from_ymd_opt(2025, 12, 26).unwrap();
        let actual = vec![reading("pole_A", at(event_day, 12, 0), 300.0)];
        let event = DrEvent::new(event_day, 12, 13).unwrap();
        let report = evaluate(&actual, &BaselineStore::new(), &config, &event);
        assert!(report.groups.is_empty());
        assert_eq!(report.skipped_slots, 1);
        assert_eq!(report.total_reduction_kwh, 0.0);
    }
}
