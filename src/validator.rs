// AMIGrid - AMI smart-meter telemetry core
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Stream validator and enricher.
//!
//! The gate between raw delivered records and everything that depends on
//! correctness. The validator is stateless: it may run with arbitrary
//! parallelism across records.
//!
//! # Example
//!
//! ```rust
//! use amigrid::{RawRecord, Validator, ValidatorConfig};
//! use chrono::Utc;
//!
//! let validator = Validator::new(ValidatorConfig::default());
//! let raw = RawRecord::new(
//!     r#"{"event_time":"2025-12-26T12:00:00Z","device_id":"m1","group_id":"pole_A",
//!         "sequence":1,"voltage":239.8,"current":4.1,"active_power":950.0}"#,
//! );
//! let reading = validator.validate(&raw, Utc::now()).unwrap();
//! assert!(reading.ingest_time.is_some());
//! ```

use crate::dead_letter::{DeadLetter, DeadLetterSink};
use crate::error::ValidationError;
use crate::reading::{RawRecord, TelemetryReading, ATTR_NETWORK_PROFILE, FLAG_MISSING_SEQUENCE};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

type Fields = Map<String, Value>;

/// Validator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidatorConfig {
    /// Nominal service voltage; readings above twice this are rejected.
    pub nominal_voltage: f64,
    /// Negative active power accepted before rejecting, in watts.
    pub power_tolerance: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            nominal_voltage: 240.0,
            power_tolerance: 1.0,
        }
    }
}

impl ValidatorConfig {
    /// Set nominal voltage.
    pub fn with_nominal_voltage(mut self, volts: f64) -> Self {
        self.nominal_voltage = volts;
        self
    }

    /// Set negative power tolerance.
    pub fn with_power_tolerance(mut self, watts: f64) -> Self {
        self.power_tolerance = watts;
        self
    }
}

/// Stateless schema/range validator.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidatorConfig,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate a raw record and attach `ingest_time = now`.
    ///
    /// Apart from `ingest_time` (and the `network_profile` attribute, when
    /// the transport supplied one) the returned reading carries exactly the
    /// values found in the payload.
    pub fn validate(
        &self,
        raw: &RawRecord,
        now: DateTime<Utc>,
    ) -> Result<TelemetryReading, ValidationError> {
        let fields = parse_object(&raw.payload)?;

        let event_time = required_timestamp(&fields, "event_time")?;
        let device_id = required_str(&fields, "device_id")?;
        let group_id = required_str(&fields, "group_id")?;
        let voltage = required_f64(&fields, "voltage")?;
        let current = required_f64(&fields, "current")?;
        let active_power = required_f64(&fields, "active_power")?;
        let sequence = optional_u64(&fields, "sequence")?;
        let reactive_power = optional_f64(&fields, "reactive_power")?;
        let frequency = optional_f64(&fields, "frequency")?;
        let mut quality_flags = optional_flags(&fields, "quality_flags")?;

        self.check_ranges(voltage, active_power)?;

        if sequence.is_none() {
            quality_flags.insert(FLAG_MISSING_SEQUENCE.to_string());
        }

        let network_profile = raw
            .attribute(ATTR_NETWORK_PROFILE)
            .map(str::to_string)
            .or_else(|| optional_string(&fields, "network_profile"));

        Ok(TelemetryReading {
            event_time,
            device_id,
            group_id,
            sequence: sequence.unwrap_or(0),
            voltage,
            current,
            active_power,
            reactive_power,
            frequency,
            quality_flags,
            ingest_time: Some(now),
            network_profile,
        })
    }

    /// Validate, sending failures to `sink` instead of returning them.
    ///
    /// Never fails: a rejected record yields `None` and the stream moves on.
    pub fn route<S>(&self, raw: &RawRecord, now: DateTime<Utc>, sink: &mut S) -> Option<TelemetryReading>
    where
        S: DeadLetterSink + ?Sized,
    {
        match self.validate(raw, now) {
            Ok(reading) => Some(reading),
            Err(err) => {
                debug!("dead-lettering record: {}", err);
                sink.send(DeadLetter::new(raw, &err, now));
                None
            }
        }
    }

    fn check_ranges(&self, voltage: f64, active_power: f64) -> Result<(), ValidationError> {
        if voltage < 0.0 {
            return Err(ValidationError::Range {
                field: "voltage",
                value: voltage,
                reason: "is below zero".to_string(),
            });
        }
        let ceiling = 2.0 * self.config.nominal_voltage;
        if voltage > ceiling {
            return Err(ValidationError::Range {
                field: "voltage",
                value: voltage,
                reason: format!("exceeds twice nominal ({ceiling} V)"),
            });
        }
        if active_power < -self.config.power_tolerance {
            return Err(ValidationError::Range {
                field: "active_power",
                value: active_power,
                reason: format!(
                    "is negative beyond tolerance ({} W)",
                    self.config.power_tolerance
                ),
            });
        }
        Ok(())
    }
}

fn parse_object(payload: &str) -> Result<Fields, ValidationError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    match value {
        Value::Object(fields) => Ok(fields),
        other => Err(ValidationError::Malformed(format!(
            "expected JSON object, got {}",
            json_type(&other)
        ))),
    }
}

/// Field value, treating explicit `null` as absent.
fn present<'a>(fields: &'a Fields, field: &str) -> Option<&'a Value> {
    fields.get(field).filter(|v| !v.is_null())
}

fn required_str(fields: &Fields, field: &'static str) -> Result<String, ValidationError> {
    match present(fields, field) {
        None => Err(ValidationError::missing(field)),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(ValidationError::schema(field, "is empty")),
        Some(other) => Err(ValidationError::schema(
            field,
            format!("expected string, got {}", json_type(other)),
        )),
    }
}

fn optional_string(fields: &Fields, field: &str) -> Option<String> {
    present(fields, field)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn required_timestamp(
    fields: &Fields,
    field: &'static str,
) -> Result<DateTime<Utc>, ValidationError> {
    let raw = required_str(fields, field)?;
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ValidationError::schema(field, format!("invalid RFC3339 timestamp: {e}")))
}

fn required_f64(fields: &Fields, field: &'static str) -> Result<f64, ValidationError> {
    match present(fields, field) {
        None => Err(ValidationError::missing(field)),
        Some(value) => to_f64(field, value),
    }
}

fn optional_f64(fields: &Fields, field: &'static str) -> Result<Option<f64>, ValidationError> {
    present(fields, field).map(|v| to_f64(field, v)).transpose()
}

fn to_f64(field: &'static str, value: &Value) -> Result<f64, ValidationError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        Some(_) => Err(ValidationError::schema(field, "is not finite")),
        None => Err(ValidationError::schema(
            field,
            format!("expected number, got {}", json_type(value)),
        )),
    }
}

fn optional_u64(fields: &Fields, field: &'static str) -> Result<Option<u64>, ValidationError> {
    let Some(value) = present(fields, field) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| ValidationError::schema(field, "expected unsigned integer"))
}

fn optional_flags(
    fields: &Fields,
    field: &'static str,
) -> Result<BTreeSet<String>, ValidationError> {
    match present(fields, field) {
        None => Ok(BTreeSet::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ValidationError::schema(field, "expected list of strings"))
            })
            .collect(),
        Some(other) => Err(ValidationError::schema(
            field,
            format!("expected list, got {}", json_type(other)),
        )),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dead_letter::MemoryDeadLetterQueue;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 26, 12, 0, 5).unwrap()
    }

    fn payload(overrides: &[(&str, Value)], removes: &[&str]) -> RawRecord {
        let mut base = serde_json::json!({
            "event_time": "2025-12-26T12:00:00Z",
            "device_id": "m_pole_A_0001",
            "group_id": "pole_A",
            "sequence": 42,
            "voltage": 238.5,
            "current": 4.2,
            "active_power": 950.0,
        });
        let map = base.as_object_mut().unwrap();
        for (k, v) in overrides {
            map.insert(k.to_string(), v.clone());
        }
        for k in removes {
            map.remove(*k);
        }
        RawRecord::new(base.to_string())
    }

    #[test]
    fn test_valid_record_enriched() {
        let validator = Validator::default();
        let reading = validator.validate(&payload(&[], &[]), now()).unwrap();
        assert_eq!(reading.device_id, "m_pole_A_0001");
        assert_eq!(reading.sequence, 42);
        assert_eq!(reading.ingest_time, Some(now()));
        assert!(reading.quality_flags.is_empty());
    }

    #[test]
    fn test_missing_required_fields() {
        let validator = Validator::default();
        for field in [
            "event_time",
            "device_id",
            "group_id",
            "voltage",
            "current",
            "active_power",
        ] {
            let err = validator
                .validate(&payload(&[], &[field]), now())
                .unwrap_err();
            assert_eq!(err, ValidationError::missing(field), "field {field}");
        }
    }

    #[test]
    fn test_null_counts_as_missing() {
        let validator = Validator::default();
        let err = validator
            .validate(&payload(&[("voltage", Value::Null)], &[]), now())
            .unwrap_err();
        assert_eq!(err, ValidationError::missing("voltage"));
    }

    #[test]
    fn test_non_numeric_voltage() {
        let validator = Validator::default();
        let err = validator
            .validate(&payload(&[("voltage", "abc".into())], &[]), now())
            .unwrap_err();
        assert_eq!(err.kind(), "schema_error");
    }

    #[test]
    fn test_numeric_string_accepted() {
        let validator = Validator::default();
        let reading = validator
            .validate(&payload(&[("voltage", "231.5".into())], &[]), now())
            .unwrap();
        assert_eq!(reading.voltage, 231.5);
    }

    #[test]
    fn test_bad_timestamp() {
        let validator = Validator::default();
        let err = validator
            .validate(&payload(&[("event_time", "yesterday".into())], &[]), now())
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Schema {
                field: "event_time",
                ..
            }
        ));
    }

    #[test]
    fn test_voltage_range() {
        let validator = Validator::default();
        let low = validator
            .validate(&payload(&[("voltage", (-0.5).into())], &[]), now())
            .unwrap_err();
        assert_eq!(low.kind(), "range_error");

        let high = validator
            .validate(&payload(&[("voltage", 480.1.into())], &[]), now())
            .unwrap_err();
        assert_eq!(high.kind(), "range_error");

        // A deep sag is low but valid
        assert!(validator
            .validate(&payload(&[("voltage", 150.0.into())], &[]), now())
            .is_ok());
    }

    #[test]
    fn test_negative_power_tolerance() {
        let validator = Validator::new(ValidatorConfig::default().with_power_tolerance(1.0));
        assert!(validator
            .validate(&payload(&[("active_power", (-0.5).into())], &[]), now())
            .is_ok());
        let err = validator
            .validate(&payload(&[("active_power", (-5.0).into())], &[]), now())
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Range {
                field: "active_power",
                ..
            }
        ));
    }

    #[test]
    fn test_missing_sequence_flagged() {
        let validator = Validator::default();
        let reading = validator
            .validate(&payload(&[], &["sequence"]), now())
            .unwrap();
        assert_eq!(reading.sequence, 0);
        assert!(reading.has_flag(FLAG_MISSING_SEQUENCE));

        let err = validator
            .validate(&payload(&[("sequence", (-3).into())], &[]), now())
            .unwrap_err();
        assert_eq!(err.kind(), "schema_error");
    }

    #[test]
    fn test_malformed_payloads() {
        let validator = Validator::default();
        let err = validator.validate(&RawRecord::new("{not json"), now()).unwrap_err();
        assert_eq!(err.kind(), "json_decode_error");

        let err = validator.validate(&RawRecord::new("[1,2]"), now()).unwrap_err();
        assert_eq!(err.kind(), "json_decode_error");
    }

    #[test]
    fn test_network_profile_attribute() {
        let validator = Validator::default();
        let raw = payload(&[], &[]).with_attribute(ATTR_NETWORK_PROFILE, "lte_m");
        let reading = validator.validate(&raw, now()).unwrap();
        assert_eq!(reading.network_profile.as_deref(), Some("lte_m"));
    }

    #[test]
    fn test_route_dead_letters() {
        let validator = Validator::default();
        let mut dlq = MemoryDeadLetterQueue::default();

        let bad = payload(&[], &["group_id"]);
        assert!(validator.route(&bad, now(), &mut dlq).is_none());
        assert!(validator.route(&payload(&[], &[]), now(), &mut dlq).is_some());

        let letters = dlq.letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].original_payload, bad.payload);
        assert_eq!(letters[0].error_kind, "schema_error");
        assert_eq!(letters[0].failed_at, now());
    }
}
