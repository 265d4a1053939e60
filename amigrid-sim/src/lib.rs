// AMIGrid Sim - Deterministic meter and backhaul simulators
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # AMIGrid Sim
//!
//! Deterministic simulators for the front of the pipeline:
//!
//! - **Meter model**: one reading per tick from a daily load curve, with
//!   voltage noise, random sags and an optional forced sag window
//! - **Pole fleet**: all meters behind one aggregation point
//! - **Backhaul**: latency, jitter, drop and reorder per network profile
//!
//! Every component owns an explicitly seeded RNG; nothing draws from
//! ambient randomness, so scenarios reproduce exactly.
//!
//! ## Quick Start
//!
//! ```rust
//! use amigrid_sim::{Backhaul, MeterConfig, NetworkProfile, PoleConfig, PoleSimulator};
//! use chrono::{TimeZone, Utc};
//!
//! let start = Utc.with_ymd_and_hms(2025, 12, 26, 0, 0, 0).unwrap();
//! let mut pole = PoleSimulator::new(
//!     PoleConfig::new("pole_A").with_meters(4),
//!     MeterConfig::default(),
//!     42,
//!     start,
//! )
//! .unwrap();
//!
//! let profile = NetworkProfile::by_name("lte_m").unwrap();
//! let mut link = Backhaul::new(7);
//! for reading in pole.generate_batch(pole.tick_time(0)) {
//!     let event = link.relay(reading, &profile);
//!     assert!(event.delivered || event.dropped);
//! }
//! ```

pub mod backhaul;
pub mod config;
pub mod error;
pub mod fleet;
pub mod load_curve;
pub mod meter;

// Re-exports for convenience
pub use backhaul::{Backhaul, BackhaulStats, NetworkProfile, ProfileKind};
pub use config::{MeterConfig, PoleConfig, SamplingPreset};
pub use error::{Result, SimError};
pub use fleet::PoleSimulator;
pub use load_curve::LoadCurve;
pub use meter::Meter;
