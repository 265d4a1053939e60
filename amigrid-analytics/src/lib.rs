// AMIGrid Analytics - Anomaly detection and baselines
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # AMIGrid Analytics
//!
//! Consumers of the validated reading stream.
//!
//! ## Features
//!
//! - **Voltage anomalies**: per-device gap-and-island sessionizer with a
//!   sustained rule and a shorter critical rule
//! - **Re-sequencing**: bounded per-device reorder window in front of the
//!   sessionizer
//! - **Baselines**: per-slot load statistics over a trailing window of
//!   days, replaced wholesale
//! - **Demand response**: actual vs. baseline load during an event window
//! - **Summaries**: group health over a time range, fixed-window
//!   aggregates
//!
//! ## Example
//!
//! ```rust
//! use amigrid::TelemetryReading;
//! use amigrid_analytics::{AnomalyDetector, AnomalyKind, DetectorConfig, Severity};
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let t0 = Utc.with_ymd_and_hms(2025, 12, 26, 14, 0, 0).unwrap();
//! let mut detector = AnomalyDetector::new(DetectorConfig::default()).unwrap();
//!
//! let voltages = [240.0, 210.0, 210.0, 210.0, 210.0, 210.0, 210.0, 240.0];
//! let mut events = Vec::new();
//! for (i, v) in voltages.iter().enumerate() {
//!     let t = t0 + Duration::seconds(i as i64);
//!     let r = TelemetryReading::new(t, "m1", "pole_A", i as u64 + 1, *v, 4.0, 900.0);
//!     events.extend(detector.observe(&r));
//! }
//!
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].kind, AnomalyKind::Sag);
//! assert_eq!(events[0].severity, Severity::Warning);
//! assert_eq!(events[0].sample_count, 6);
//! ```

pub mod baseline;
pub mod config;
pub mod demand_response;
pub mod error;
pub mod event;
pub mod ordering;
pub mod sessionizer;
pub mod stats;
pub mod summary;
pub mod window;

pub use baseline::{BaselineAggregator, BaselineBucket, BaselineStore, SlotKey};
pub use config::{BaselineConfig, DetectorConfig};
pub use demand_response::{evaluate as evaluate_demand_response, DrEvent, DrPerformance, DrReport};
pub use error::{AnalyticsError, Result};
pub use event::{AnomalyEvent, AnomalyKind, DetectionRule, Severity};
pub use ordering::OrderedIngest;
pub use sessionizer::AnomalyDetector;
pub use stats::SampleStats;
pub use summary::{GroupSummary, SummaryAccumulator};
pub use window::{aggregate_windows, WindowAggregate, WindowAggregator, DEFAULT_WINDOW_SECS};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
