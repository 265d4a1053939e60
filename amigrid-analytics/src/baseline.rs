// AMIGrid Analytics - Anomaly detection and baselines
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Historical load baselines per time-of-day slot.
//!
//! A slot is `(group_id, hour_of_day, minute_bucket)`. For every calendar
//! day in the trailing window, the slot's group load is the sum over
//! devices of each device's mean `active_power` inside the slot. The
//! baseline is the distribution of that daily value across the days that
//! have any reading in the slot.
//!
//! Baselines are recomputed wholesale from the window; nothing is merged
//! into a previous table.

use crate::config::BaselineConfig;
use crate::error::{AnalyticsError, Result};
use crate::stats::SampleStats;
use amigrid::TelemetryReading;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Time-of-day slot within a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub group_id: String,
    pub hour_of_day: u32,
    pub minute_bucket: u32,
}

impl SlotKey {
    pub fn new(group_id: impl Into<String>, hour_of_day: u32, minute_bucket: u32) -> Self {
        Self {
            group_id: group_id.into(),
            hour_of_day,
            minute_bucket,
        }
    }
}

/// Group load in one slot on one day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SlotLoad {
    /// Watts.
    pub value: f64,
    pub device_count: usize,
}

/// Group load per `(slot, date)`: sum over devices of each device's mean
/// active power in the slot.
pub(crate) fn daily_slot_loads<'a, I>(
    readings: I,
    config: &BaselineConfig,
) -> BTreeMap<(SlotKey, NaiveDate), SlotLoad>
where
    I: IntoIterator<Item = &'a TelemetryReading>,
{
    let mut per_device: HashMap<(SlotKey, NaiveDate), BTreeMap<&'a str, (f64, u64)>> =
        HashMap::new();
    for r in readings {
        let t = r.event_time;
        let slot = SlotKey::new(r.group_id.as_str(), t.hour(), config.minute_bucket(t.minute()));
        let acc = per_device
            .entry((slot, t.date_naive()))
            .or_default()
            .entry(r.device_id.as_str())
            .or_insert((0.0, 0));
        acc.0 += r.active_power;
        acc.1 += 1;
    }

    per_device
        .into_iter()
        .map(|(key, devices)| {
            let value: f64 = devices.values().map(|(sum, n)| sum / *n as f64).sum();
            let load = SlotLoad {
                value,
                device_count: devices.len(),
            };
            (key, load)
        })
        .collect()
}

/// Baseline statistics for one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineBucket {
    pub group_id: String,
    pub hour_of_day: u32,
    pub minute_bucket: u32,
    /// Over the per-day group load (W).
    pub sample_stats: SampleStats,
    /// Days in the window with at least one reading in this slot.
    pub contributing_day_count: u32,
    pub average_device_count: f64,
    pub computed_at: DateTime<Utc>,
}

impl BaselineBucket {
    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.group_id.clone(), self.hour_of_day, self.minute_bucket)
    }
}

/// Batch job computing a baseline table from validated readings.
#[derive(Debug, Clone)]
pub struct BaselineAggregator {
    config: BaselineConfig,
}

impl BaselineAggregator {
    pub fn new(config: BaselineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BaselineConfig {
        &self.config
    }

    /// Whether `date` falls in the trailing window ending before `as_of`.
    pub fn in_window(&self, date: NaiveDate, as_of: NaiveDate) -> bool {
        let first = as_of - Duration::days(self.config.lookback_days as i64);
        if date < first || date >= as_of {
            return false;
        }
        !(self.config.exclude_weekends && matches!(date.weekday(), Weekday::Sat | Weekday::Sun))
    }

    /// Compute buckets for the window `[as_of - lookback_days, as_of)`.
    ///
    /// Slots with no contributing day are absent from the output. The
    /// result is sorted by slot and depends only on the readings in the
    /// window, so recomputing it is idempotent.
    pub fn compute<'a, I>(
        &self,
        readings: I,
        as_of: NaiveDate,
        computed_at: DateTime<Utc>,
    ) -> Vec<BaselineBucket>
    where
        I: IntoIterator<Item = &'a TelemetryReading>,
    {
        let in_window = readings
            .into_iter()
            .filter(|r| self.in_window(r.event_time.date_naive(), as_of));
        let loads = daily_slot_loads(in_window, &self.config);

        let mut per_slot: BTreeMap<SlotKey, Vec<SlotLoad>> = BTreeMap::new();
        for ((slot, _date), load) in loads {
            per_slot.entry(slot).or_default().push(load);
        }

        let buckets: Vec<_> = per_slot
            .into_iter()
            .filter_map(|(slot, days)| {
                let values: Vec<f64> = days.iter().map(|d| d.value).collect();
                let sample_stats = SampleStats::from_values(&values)?;
                let devices: usize = days.iter().map(|d| d.device_count).sum();
                Some(BaselineBucket {
                    group_id: slot.group_id,
                    hour_of_day: slot.hour_of_day,
                    minute_bucket: slot.minute_bucket,
                    sample_stats,
                    contributing_day_count: days.len() as u32,
                    average_device_count: devices as f64 / days.len() as f64,
                    computed_at,
                })
            })
            .collect();

        info!(
            "Computed {} baseline buckets for window ending {} ({} days)",
            buckets.len(),
            as_of,
            self.config.lookback_days
        );
        buckets
    }
}

/// Current baseline table, swapped as a whole.
#[derive(Debug, Clone, Default)]
pub struct BaselineStore {
    buckets: BTreeMap<SlotKey, BaselineBucket>,
    computed_at: Option<DateTime<Utc>>,
}

impl BaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole table. Buckets with no contributing day are
    /// dropped.
    pub fn replace(&mut self, buckets: Vec<BaselineBucket>) {
        self.computed_at = buckets.iter().map(|b| b.computed_at).max();
        self.buckets = buckets
            .into_iter()
            .filter(|b| b.contributing_day_count > 0)
            .map(|b| (b.key(), b))
            .collect();
        debug!("Baseline table replaced: {} buckets", self.buckets.len());
    }

    /// Bucket for a slot, or `InsufficientHistory` if none exists.
    pub fn lookup(
        &self,
        group_id: &str,
        hour_of_day: u32,
        minute_bucket: u32,
    ) -> Result<&BaselineBucket> {
        let key = SlotKey::new(group_id, hour_of_day, minute_bucket);
        self.buckets
            .get(&key)
            .ok_or_else(|| AnalyticsError::InsufficientHistory {
                group_id: group_id.to_string(),
                hour_of_day,
                minute_bucket,
            })
    }

    pub fn get(&self, key: &SlotKey) -> Option<&BaselineBucket> {
        self.buckets.get(key)
    }

    pub fn buckets(&self) -> impl Iterator<Item = &BaselineBucket> {
        self.buckets.values()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn computed_at(&self) -> Option<DateTime<Utc>> {
        self.computed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn at(date: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date.and_hms_opt(h, m, 0).unwrap())
    }

    fn reading(device: &str, t: DateTime<Utc>, power: f64) -> TelemetryReading {
        TelemetryReading::new(t, device, "pole_A", 1, 240.0, power / 240.0, power)
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 15).unwrap()
    }

    #[test]
    fn test_slot_load_sums_device_means() {
        let d = monday();
        let readings = vec![
            reading("m1", at(d, 14, 0), 1000.0),
            reading("m1", at(d, 14, 1), 2000.0),
            reading("m2", at(d, 14, 3), 500.0),
            reading("m2", at(d, 14, 5), 9999.0),
        ];
        let loads = daily_slot_loads(&readings, &BaselineConfig::default());
        let slot = loads.get(&(SlotKey::new("pole_A", 14, 0), d)).unwrap();
        assert_relative_eq!(slot.value, 1500.0 + 500.0);
        assert_eq!(slot.device_count, 2);
        assert!(loads.contains_key(&(SlotKey::new("pole_A", 14, 5), d)));
    }

    #[test]
    fn test_window_bounds_and_weekends() {
        let agg = BaselineAggregator::new(BaselineConfig::default()).unwrap();
        let as_of = NaiveDate::from_ymd_opt(2025, 12, 26).unwrap(); // Friday
        assert!(agg.in_window(NaiveDate::from_ymd_opt(2025, 12, 25).unwrap(), as_of));
        assert!(agg.in_window(NaiveDate::from_ymd_opt(2025, 12, 16).unwrap(), as_of));
        assert!(!agg.in_window(NaiveDate::from_ymd_opt(2025, 12, 15).unwrap(), as_of));
        assert!(!agg.in_window(as_of, as_of));
        // Saturday
        assert!(!agg.in_window(NaiveDate::from_ymd_opt(2025, 12, 20).unwrap(), as_of));

        let agg = BaselineAggregator::new(BaselineConfig::default().with_exclude_weekends(false))
            .unwrap();
        assert!(agg.in_window(NaiveDate::from_ymd_opt(2025, 12, 20).unwrap(), as_of));
    }

    #[test]
    fn test_lookup_missing_is_insufficient_history() {
        let store = BaselineStore::new();
        assert_eq!(
            store.lookup("pole_A", 14, 0),
            Err(AnalyticsError::InsufficientHistory {
                group_id: "pole_A".to_string(),
                hour_of_day: 14,
                minute_bucket: 0,
            })
        );
    }

    #[test]
    fn test_replace_is_wholesale() {
        let agg = BaselineAggregator::new(BaselineConfig::default().with_exclude_weekends(false))
            .unwrap();
        let d = monday();
        let as_of = d + Duration::days(1);
        let computed_at = at(as_of, 0, 0);

        let mut store = BaselineStore::new();
        store.replace(agg.compute(&[reading("m1", at(d, 9, 0), 800.0)], as_of, computed_at));
        assert!(store.lookup("pole_A", 9, 0).is_ok());

        store.replace(agg.compute(&[reading("m1", at(d, 10, 0), 800.0)], as_of, computed_at));
        assert_eq!(store.len(), 1);
        assert!(store.lookup("pole_A", 9, 0).is_err());
        assert_eq!(store.computed_at(), Some(computed_at));
    }
}
