// AMIGrid Sim - Network backhaul
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Network backhaul model.
//!
//! Turns a reading into a [`DeliveryEvent`] under a named profile. Drops
//! model physical-layer loss: a dropped reading is gone, no retry can
//! bring it back. Delays are what make reordering observable downstream
//! when several messages are in flight at once.

use crate::error::{Result, SimError};
use amigrid::{DeliveryEvent, TelemetryReading};
use log::debug;
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Backhaul technologies with preset characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProfileKind {
    #[serde(rename = "wired")]
    Wired,
    #[serde(rename = "5g")]
    FiveG,
    #[serde(rename = "lte_m")]
    LteM,
    #[serde(rename = "satellite")]
    Satellite,
}

impl ProfileKind {
    pub const ALL: [ProfileKind; 4] = [Self::Wired, Self::FiveG, Self::LteM, Self::Satellite];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wired => "wired",
            Self::FiveG => "5g",
            Self::LteM => "lte_m",
            Self::Satellite => "satellite",
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SimError::UnknownProfile(s.to_string()))
    }
}

/// Latency, jitter, drop and reorder behaviour of a backhaul link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkProfile {
    pub name: String,
    pub latency_ms_min: u64,
    pub latency_ms_max: u64,
    /// Uniform jitter in `[-jitter_ms, +jitter_ms]`.
    pub jitter_ms: u64,
    /// Probability a reading is lost.
    pub drop_rate: f64,
    /// Probability a reading is held back by `reorder_hold_ms`.
    #[serde(default)]
    pub reorder_rate: f64,
    #[serde(default = "default_reorder_hold_ms")]
    pub reorder_hold_ms: u64,
}

fn default_reorder_hold_ms() -> u64 {
    2_000
}

impl NetworkProfile {
    /// Preset for a backhaul technology.
    pub fn preset(kind: ProfileKind) -> Self {
        let (latency_ms_min, latency_ms_max, jitter_ms, drop_rate, reorder_rate) = match kind {
            ProfileKind::Wired => (5, 20, 5, 0.0001, 0.0),
            ProfileKind::FiveG => (10, 50, 15, 0.001, 0.001),
            ProfileKind::LteM => (50, 300, 50, 0.005, 0.005),
            ProfileKind::Satellite => (500, 800, 100, 0.01, 0.01),
        };
        Self {
            name: kind.as_str().to_string(),
            latency_ms_min,
            latency_ms_max,
            jitter_ms,
            drop_rate,
            reorder_rate,
            reorder_hold_ms: default_reorder_hold_ms(),
        }
    }

    /// Preset by name (`wired`, `5g`, `lte_m`, `satellite`).
    pub fn by_name(name: &str) -> Result<Self> {
        Ok(Self::preset(name.parse()?))
    }

    /// Set drop probability.
    pub fn with_drop_rate(mut self, rate: f64) -> Self {
        self.drop_rate = rate;
        self
    }

    /// Set reorder probability.
    pub fn with_reorder_rate(mut self, rate: f64) -> Self {
        self.reorder_rate = rate;
        self
    }

    /// Set latency range.
    pub fn with_latency_ms(mut self, min: u64, max: u64) -> Self {
        self.latency_ms_min = min;
        self.latency_ms_max = max;
        self
    }

    /// Set jitter amplitude.
    pub fn with_jitter_ms(mut self, jitter: u64) -> Self {
        self.jitter_ms = jitter;
        self
    }

    /// Upper bound on the delay `relay` can assign.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.latency_ms_max + self.jitter_ms + self.reorder_hold_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.latency_ms_min > self.latency_ms_max {
            return Err(SimError::InvalidConfig(format!(
                "profile {}: latency_ms_min > latency_ms_max",
                self.name
            )));
        }
        for (field, p) in [("drop_rate", self.drop_rate), ("reorder_rate", self.reorder_rate)] {
            if !(0.0..=1.0).contains(&p) {
                return Err(SimError::InvalidConfig(format!(
                    "profile {}: {field} must be in [0, 1], got {p}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

impl Default for NetworkProfile {
    fn default() -> Self {
        Self::preset(ProfileKind::FiveG)
    }
}

/// Outcome counters for a backhaul link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackhaulStats {
    pub relayed: u64,
    pub dropped: u64,
    pub held: u64,
}

/// Seeded backhaul link.
#[derive(Debug, Clone)]
pub struct Backhaul {
    rng: StdRng,
    stats: BackhaulStats,
}

impl Backhaul {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            stats: BackhaulStats::default(),
        }
    }

    pub fn stats(&self) -> BackhaulStats {
        self.stats
    }

    /// Carry `reading` across the link described by `profile`.
    pub fn relay(&mut self, reading: TelemetryReading, profile: &NetworkProfile) -> DeliveryEvent {
        self.stats.relayed += 1;

        if self.rng.gen::<f64>() < profile.drop_rate {
            self.stats.dropped += 1;
            debug!(
                "Dropped reading {}#{} on {}",
                reading.device_id, reading.sequence, profile.name
            );
            return DeliveryEvent::dropped(reading);
        }

        let (lo, hi) = if profile.latency_ms_min <= profile.latency_ms_max {
            (profile.latency_ms_min, profile.latency_ms_max)
        } else {
            (profile.latency_ms_max, profile.latency_ms_min)
        };
        let base = self.rng.gen_range(lo..=hi) as i64;
        let jitter = profile.jitter_ms as i64;
        let jitter = self.rng.gen_range(-jitter..=jitter);
        let mut delay_ms = (base + jitter).max(1) as u64;

        if self.rng.gen::<f64>() < profile.reorder_rate {
            self.stats.held += 1;
            delay_ms += profile.reorder_hold_ms;
        }

        DeliveryEvent::delivered(reading, Duration::from_millis(delay_ms))
    }
}
