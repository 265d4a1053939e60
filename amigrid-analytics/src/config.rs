// AMIGrid Analytics - Anomaly detection and baselines
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration for the anomaly detector and the baseline job.

use crate::error::{AnalyticsError, Result};
use amigrid::{DEFAULT_SAG_THRESHOLD, DEFAULT_SWELL_THRESHOLD};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Thresholds and duration rules for voltage anomaly detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    /// Voltage strictly below this is a sag sample (V).
    pub sag_threshold: f64,
    /// Voltage strictly above this is a swell sample (V).
    pub swell_threshold: f64,

    /// Alert rule: island must last at least this long.
    pub minimum_duration_ms: u64,

    /// Critical rule: sag samples strictly below this voltage...
    pub critical_sag_voltage: f64,
    /// ...or swell samples strictly above this voltage...
    pub critical_swell_voltage: f64,
    /// ...sustained for at least this long.
    pub critical_duration_ms: u64,

    /// Sag severity band: minimum at or below this is WARNING.
    pub sag_warning_voltage: f64,
    /// Swell severity band: maximum at or above this is WARNING.
    pub swell_warning_voltage: f64,

    /// Coverage of one sample, added to `last - first` for durations.
    pub sample_period_ms: u64,

    /// Per-device reorder depth for [`OrderedIngest`](crate::OrderedIngest).
    pub reorder_depth: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sag_threshold: DEFAULT_SAG_THRESHOLD,
            swell_threshold: DEFAULT_SWELL_THRESHOLD,
            minimum_duration_ms: 5_000,
            critical_sag_voltage: 200.0,
            critical_swell_voltage: 280.0,
            critical_duration_ms: 3_000,
            sag_warning_voltage: 210.0,
            swell_warning_voltage: 270.0,
            sample_period_ms: 1_000,
            reorder_depth: 8,
        }
    }
}

impl DetectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set sag and swell thresholds.
    pub fn with_thresholds(mut self, sag: f64, swell: f64) -> Self {
        self.sag_threshold = sag;
        self.swell_threshold = swell;
        self
    }

    /// Set the alert rule duration.
    pub fn with_minimum_duration_ms(mut self, ms: u64) -> Self {
        self.minimum_duration_ms = ms;
        self
    }

    /// Set the critical rule duration.
    pub fn with_critical_duration_ms(mut self, ms: u64) -> Self {
        self.critical_duration_ms = ms;
        self
    }

    /// Set the sampling period used for inclusive durations.
    pub fn with_sample_period_ms(mut self, ms: u64) -> Self {
        self.sample_period_ms = ms;
        self
    }

    pub fn with_reorder_depth(mut self, depth: usize) -> Self {
        self.reorder_depth = depth;
        self
    }

    pub(crate) fn minimum_duration(&self) -> Duration {
        Duration::milliseconds(self.minimum_duration_ms as i64)
    }

    pub(crate) fn critical_duration(&self) -> Duration {
        Duration::milliseconds(self.critical_duration_ms as i64)
    }

    pub(crate) fn sample_period(&self) -> Duration {
        Duration::milliseconds(self.sample_period_ms as i64)
    }

    pub fn validate(&self) -> Result<()> {
        let volts = [
            ("sag_threshold", self.sag_threshold),
            ("swell_threshold", self.swell_threshold),
            ("critical_sag_voltage", self.critical_sag_voltage),
            ("critical_swell_voltage", self.critical_swell_voltage),
            ("sag_warning_voltage", self.sag_warning_voltage),
            ("swell_warning_voltage", self.swell_warning_voltage),
        ];
        for (name, v) in volts {
            if !v.is_finite() || v < 0.0 {
                return Err(AnalyticsError::InvalidConfig(format!(
                    "{name} must be finite and >= 0, got {v}"
                )));
            }
        }
        if self.sag_threshold >= self.swell_threshold {
            return Err(AnalyticsError::InvalidConfig(
                "sag_threshold must be below swell_threshold".to_string(),
            ));
        }
        if self.critical_sag_voltage > self.sag_warning_voltage
            || self.sag_warning_voltage > self.sag_threshold
        {
            return Err(AnalyticsError::InvalidConfig(
                "sag bands must satisfy critical <= warning <= threshold".to_string(),
            ));
        }
        if self.critical_swell_voltage < self.swell_warning_voltage
            || self.swell_warning_voltage < self.swell_threshold
        {
            return Err(AnalyticsError::InvalidConfig(
                "swell bands must satisfy threshold <= warning <= critical".to_string(),
            ));
        }
        if self.sample_period_ms == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "sample_period_ms must be positive".to_string(),
            ));
        }
        if self.reorder_depth == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "reorder_depth must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trailing-window settings for the baseline job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BaselineConfig {
    /// Calendar days before the as-of date included in the window.
    pub lookback_days: u32,
    /// Slot width in minutes; must divide 60.
    pub bucket_minutes: u32,
    /// Leave Saturdays and Sundays out of the window.
    pub exclude_weekends: bool,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            lookback_days: 10,
            bucket_minutes: 5,
            exclude_weekends: true,
        }
    }
}

impl BaselineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    pub fn with_bucket_minutes(mut self, minutes: u32) -> Self {
        self.bucket_minutes = minutes;
        self
    }

    pub fn with_exclude_weekends(mut self, exclude: bool) -> Self {
        self.exclude_weekends = exclude;
        self
    }

    /// Start minute of the slot containing `minute`.
    pub fn minute_bucket(&self, minute: u32) -> u32 {
        (minute / self.bucket_minutes) * self.bucket_minutes
    }

    pub fn validate(&self) -> Result<()> {
        if self.lookback_days == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "lookback_days must be positive".to_string(),
            ));
        }
        if self.bucket_minutes == 0 || 60 % self.bucket_minutes != 0 {
            return Err(AnalyticsError::InvalidConfig(format!(
                "bucket_minutes must divide 60, got {}",
                self.bucket_minutes
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        assert!(DetectorConfig::default().validate().is_ok());
        assert!(BaselineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_detector_rejects_crossed_thresholds() {
        let cfg = DetectorConfig::default().with_thresholds(260.0, 220.0);
        assert!(cfg.validate().is_err());

        let mut cfg = DetectorConfig::default();
        cfg.sag_warning_voltage = 190.0;
        assert!(cfg.validate().is_err());

        let cfg = DetectorConfig::default().with_sample_period_ms(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_bucket_minutes() {
        let cfg = BaselineConfig::default();
        assert_eq!(cfg.minute_bucket(0), 0);
        assert_eq!(cfg.minute_bucket(4), 0);
        assert_eq!(cfg.minute_bucket(37), 35);
        assert!(BaselineConfig::default()
            .with_bucket_minutes(7)
            .validate()
            .is_err());
        assert!(BaselineConfig::default()
            .with_lookback_days(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(serde_json::from_str::<DetectorConfig>(r#"{"sag":200}"#).is_err());
        let cfg: BaselineConfig = serde_json::from_str(r#"{"lookback_days":20}"#).unwrap();
        assert_eq!(cfg.lookback_days, 20);
        assert_eq!(cfg.bucket_minutes, 5);
    }
}
