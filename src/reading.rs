// AMIGrid - AMI smart-meter telemetry core
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Telemetry data model and wire format.
//!
//! A [`TelemetryReading`] is created by a meter, carried unchanged through
//! the backhaul and the gateway, and annotated exactly once by the
//! validator. On the wire it is a single JSON object per reading.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Generated voltage below the sag threshold.
pub const FLAG_VOLTAGE_SAG: &str = "voltage_sag";
/// Generated voltage above the swell threshold.
pub const FLAG_VOLTAGE_SWELL: &str = "voltage_swell";
/// Value was estimated rather than measured.
pub const FLAG_ESTIMATED: &str = "estimated";
/// Value outside the meter's rated range.
pub const FLAG_OUT_OF_RANGE: &str = "out_of_range";
/// Record arrived without a sequence number.
pub const FLAG_MISSING_SEQUENCE: &str = "missing_sequence";

/// Attribute key carrying the backhaul profile name.
pub const ATTR_NETWORK_PROFILE: &str = "network_profile";

/// One point-in-time measurement from a single meter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    /// Measurement time (UTC).
    pub event_time: DateTime<Utc>,
    /// Unique meter identifier.
    pub device_id: String,
    /// Aggregation point (pole / gateway) the meter reports through.
    pub group_id: String,
    /// Strictly increasing per device; used for loss detection.
    pub sequence: u64,
    /// Volts.
    pub voltage: f64,
    /// Amperes.
    pub current: f64,
    /// Watts.
    pub active_power: f64,
    /// Volt-amperes reactive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reactive_power: Option<f64>,
    /// Hertz.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(default)]
    pub quality_flags: BTreeSet<String>,
    /// Set by the validator, never by the generator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest_time: Option<DateTime<Utc>>,
    /// Backhaul profile the record travelled over (enrichment).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_profile: Option<String>,
}

impl TelemetryReading {
    /// Create a reading with the required fields only.
    pub fn new(
        event_time: DateTime<Utc>,
        device_id: impl Into<String>,
        group_id: impl Into<String>,
        sequence: u64,
        voltage: f64,
        current: f64,
        active_power: f64,
    ) -> Self {
        Self {
            event_time,
            device_id: device_id.into(),
            group_id: group_id.into(),
            sequence,
            voltage,
            current,
            active_power,
            reactive_power: None,
            frequency: None,
            quality_flags: BTreeSet::new(),
            ingest_time: None,
            network_profile: None,
        }
    }

    /// Set reactive power.
    pub fn with_reactive_power(mut self, var: f64) -> Self {
        self.reactive_power = Some(var);
        self
    }

    /// Set frequency.
    pub fn with_frequency(mut self, hz: f64) -> Self {
        self.frequency = Some(hz);
        self
    }

    /// Add a quality flag.
    pub fn with_flag(mut self, flag: &str) -> Self {
        self.quality_flags.insert(flag.to_string());
        self
    }

    /// Check for a quality flag.
    pub fn has_flag(&self, flag: &str) -> bool {
        self.quality_flags.contains(flag)
    }

    /// Serialize to the JSON wire payload.
    pub fn to_payload(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A raw record as received from the transport, before validation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawRecord {
    /// Opaque payload, expected to be a JSON object.
    pub payload: String,
    /// Transport attributes (device, group, network profile).
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl RawRecord {
    /// Wrap a payload without attributes.
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Build the raw record a publisher would emit for a reading.
    pub fn from_reading(reading: &TelemetryReading) -> Result<Self> {
        Ok(Self::new(reading.to_payload()?)
            .with_attribute("device_id", &reading.device_id)
            .with_attribute("group_id", &reading.group_id))
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    /// Get an attribute.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Transport outcome for one reading crossing the backhaul.
///
/// Produced by the backhaul model and consumed immediately by the gateway
/// relay; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryEvent {
    pub reading: TelemetryReading,
    pub delivered: bool,
    pub dropped: bool,
    /// Time between `event_time` and arrival at the gateway.
    pub delay: Duration,
}

impl DeliveryEvent {
    /// A reading that made it across after `delay`.
    pub fn delivered(reading: TelemetryReading, delay: Duration) -> Self {
        Self {
            reading,
            delivered: true,
            dropped: false,
            delay,
        }
    }

    /// A reading lost on the physical layer.
    pub fn dropped(reading: TelemetryReading) -> Self {
        Self {
            reading,
            delivered: false,
            dropped: true,
            delay: Duration::ZERO,
        }
    }

    /// Arrival time at the gateway, if delivered.
    pub fn arrival_time(&self) -> Option<DateTime<Utc>> {
        if self.dropped {
            return None;
        }
        let delay = chrono::Duration::from_std(self.delay).ok()?;
        self.reading.event_time.checked_add_signed(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> TelemetryReading {
        TelemetryReading::new(
            Utc.with_ymd_and_hms(2025, 12, 26, 12, 0, 0).unwrap(),
            "m_pole_A_0000",
            "pole_A",
            7,
            239.4,
            4.2,
            955.0,
        )
    }

    #[test]
    fn test_payload_field_names() {
        let reading = sample().with_frequency(60.01).with_flag(FLAG_ESTIMATED);
        let value: serde_json::Value = serde_json::from_str(&reading.to_payload().unwrap()).unwrap();

        assert_eq!(value["event_time"], "2025-12-26T12:00:00Z");
        assert_eq!(value["device_id"], "m_pole_A_0000");
        assert_eq!(value["group_id"], "pole_A");
        assert_eq!(value["sequence"], 7);
        assert_eq!(value["quality_flags"][0], "estimated");
        assert!(value.get("ingest_time").is_none());
        assert!(value.get("reactive_power").is_none());
    }

    #[test]
    fn test_payload_is_never_empty() {
        let raw = RawRecord::from_reading(&sample()).unwrap();
        assert_eq!(raw.payload, sample().to_payload().unwrap());

        // Non-finite values go out as null for the validator to reject
        let mut reading = sample();
        reading.voltage = f64::NAN;
        let payload = reading.to_payload().unwrap();
        assert!(!payload.is_empty());
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert!(value["voltage"].is_null());
        assert_eq!(value["device_id"], "m_pole_A_0000");
    }

    #[test]
    fn test_flags_deduplicate() {
        let reading = sample()
            .with_flag(FLAG_VOLTAGE_SAG)
            .with_flag(FLAG_VOLTAGE_SAG);
        assert_eq!(reading.quality_flags.len(), 1);
        assert!(reading.has_flag(FLAG_VOLTAGE_SAG));
    }

    #[test]
    fn test_raw_record_attributes() {
        let raw = RawRecord::from_reading(&sample()).unwrap();
        assert_eq!(raw.attribute("device_id"), Some("m_pole_A_0000"));
        assert_eq!(raw.attribute("group_id"), Some("pole_A"));
        assert_eq!(raw.attribute(ATTR_NETWORK_PROFILE), None);
    }

    #[test]
    fn test_delivery_arrival_time() {
        let event = DeliveryEvent::delivered(sample(), Duration::from_millis(1500));
        let arrival = event.arrival_time().unwrap();
        assert_eq!(
            arrival,
            Utc.with_ymd_and_hms(2025, 12, 26, 12, 0, 1).unwrap()
                + chrono::Duration::milliseconds(500)
        );

        let lost = DeliveryEvent::dropped(sample());
        assert!(lost.dropped);
        assert!(!lost.delivered);
        assert!(lost.arrival_time().is_none());
    }
}
