// AMIGrid Analytics - Anomaly detection and baselines
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Anomaly event types and definitions.

use crate::config::DetectorConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a voltage excursion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyKind {
    /// Voltage below the sag threshold.
    Sag,
    /// Voltage above the swell threshold.
    Swell,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::Sag => "sag",
            AnomalyKind::Swell => "swell",
        }
    }
}

/// Severity level of an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Minor,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Minor => "MINOR",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Band lookup for a sag, keyed on the island minimum.
    pub fn for_sag(min_value: f64, config: &DetectorConfig) -> Self {
        if min_value < config.critical_sag_voltage {
            Severity::Critical
        } else if min_value <= config.sag_warning_voltage {
            Severity::Warning
        } else {
            Severity::Minor
        }
    }

    /// Band lookup for a swell, keyed on the island maximum.
    pub fn for_swell(max_value: f64, config: &DetectorConfig) -> Self {
        if max_value > config.critical_swell_voltage {
            Severity::Critical
        } else if max_value >= config.swell_warning_voltage {
            Severity::Warning
        } else {
            Severity::Minor
        }
    }
}

/// Which duration rule admitted the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionRule {
    /// Whole island lasted at least `minimum_duration`.
    Sustained,
    /// Shorter island with a deep enough excursion held for
    /// `critical_duration`.
    CriticalShort,
}

impl DetectionRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionRule::Sustained => "SUSTAINED",
            DetectionRule::CriticalShort => "CRITICAL_SHORT",
        }
    }
}

/// A closed run of violating readings from one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub device_id: String,
    pub group_id: String,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub rule: DetectionRule,
    /// Time of the first violating reading.
    pub start_time: DateTime<Utc>,
    /// Time of the last violating reading plus one sample period.
    pub end_time: DateTime<Utc>,
    pub min_value: f64,
    pub max_value: f64,
    pub avg_value: f64,
    pub sample_count: u64,
    pub first_sequence: u64,
    pub last_sequence: u64,
    /// Sequence numbers skipped inside the island. Gaps never split an
    /// island; they are only reported here.
    pub missing_samples: u64,
}

impl AnomalyEvent {
    /// Inclusive duration, `end_time - start_time`.
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration().num_milliseconds() as f64 / 1000.0
    }

    /// Convert to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sag_bands() {
        let cfg = DetectorConfig::default();
        assert_eq!(Severity::for_sag(195.0, &cfg), Severity::Critical);
        assert_eq!(Severity::for_sag(200.0, &cfg), Severity::Warning);
        assert_eq!(Severity::for_sag(210.0, &cfg), Severity::Warning);
        assert_eq!(Severity::for_sag(215.0, &cfg), Severity::Minor);
    }

    #[test]
    fn test_swell_bands() {
        let cfg = DetectorConfig::default();
        assert_eq!(Severity::for_swell(285.0, &cfg), Severity::Critical);
        assert_eq!(Severity::for_swell(280.0, &cfg), Severity::Warning);
        assert_eq!(Severity::for_swell(270.0, &cfg), Severity::Warning);
        assert_eq!(Severity::for_swell(265.0, &cfg), Severity::Minor);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&AnomalyKind::Sag).unwrap(), "\"sag\"");
        assert_eq!(
            serde_json::to_string(&Severity::Warning).unwrap(),
            "\"WARNING\""
        );
        assert_eq!(Severity::Critical.as_str(), "CRITICAL");
        assert!(Severity::Critical > Severity::Minor);
        assert_eq!(DetectionRule::CriticalShort.as_str(), "CRITICAL_SHORT");
    }
}
