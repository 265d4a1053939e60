//! # AMIGrid - AMI smart-meter telemetry core
//!
//! Reading model, wire format and the stream gate for a simulated
//! smart-meter pipeline: meters emit readings, a gateway batches them over
//! a lossy backhaul, and every delivered record is validated here before
//! any analytics sees it.
//!
//! ## Quick Start
//!
//! ```rust
//! use amigrid::{MemoryDeadLetterQueue, RawRecord, TelemetryReading, Validator};
//! use chrono::{TimeZone, Utc};
//!
//! let t = Utc.with_ymd_and_hms(2025, 12, 26, 14, 0, 0).unwrap();
//! let reading = TelemetryReading::new(t, "m_pole_A_0000", "pole_A", 1, 239.9, 4.1, 935.0);
//!
//! // Publisher side: one JSON object per reading
//! let raw = RawRecord::from_reading(&reading).unwrap();
//!
//! // Stream side: validate, dead-letter failures
//! let validator = Validator::default();
//! let mut dlq = MemoryDeadLetterQueue::default();
//! let validated = validator.route(&raw, Utc::now(), &mut dlq).unwrap();
//! assert_eq!(validated.voltage, reading.voltage);
//! assert!(dlq.is_empty());
//! ```
//!
//! ## Modules
//!
//! - [`reading`]: Telemetry reading, raw record and delivery event
//! - [`validator`]: Schema/range validation and enrichment
//! - [`dead_letter`]: Dead-letter sinks
//! - [`recovery`]: Retry policy with exponential backoff
//! - [`sink`]: JSON-lines warehouse rows

// Modules
pub mod dead_letter;
pub mod error;
pub mod reading;
pub mod recovery;
pub mod sink;
pub mod validator;

// Re-exports for convenient access
pub use dead_letter::{DeadLetter, DeadLetterSink, MemoryDeadLetterQueue};
pub use error::{AmiError, Result, ValidationError};
pub use reading::{
    DeliveryEvent, RawRecord, TelemetryReading, ATTR_NETWORK_PROFILE, FLAG_ESTIMATED,
    FLAG_MISSING_SEQUENCE, FLAG_OUT_OF_RANGE, FLAG_VOLTAGE_SAG, FLAG_VOLTAGE_SWELL,
};
pub use recovery::{no_sleep, thread_sleep, with_retry, RetryExhausted, RetryOutcome, RetryPolicy};
pub use sink::JsonLinesWriter;
pub use validator::{Validator, ValidatorConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default nominal service voltage (V)
pub const DEFAULT_NOMINAL_VOLTAGE: f64 = 240.0;

/// Default sag threshold (V)
pub const DEFAULT_SAG_THRESHOLD: f64 = 220.0;

/// Default swell threshold (V)
pub const DEFAULT_SWELL_THRESHOLD: f64 = 260.0;
