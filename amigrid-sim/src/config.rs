// AMIGrid Sim - Configuration
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Meter and pole configuration.

use crate::error::{Result, SimError};
use crate::load_curve::LoadCurve;
use amigrid::{DEFAULT_NOMINAL_VOLTAGE, DEFAULT_SAG_THRESHOLD, DEFAULT_SWELL_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Electrical behaviour of a single simulated meter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeterConfig {
    /// Nominal voltage (V).
    pub nominal_voltage: f64,
    /// Standard deviation of voltage noise (V).
    pub voltage_noise_std: f64,
    /// Generated voltages below this are flagged `voltage_sag`.
    pub sag_threshold: f64,
    /// Generated voltages above this are flagged `voltage_swell`.
    pub swell_threshold: f64,

    /// Per-tick probability that a random sag starts.
    pub sag_probability: f64,
    pub sag_depth_min: f64,
    pub sag_depth_max: f64,
    /// Random sag length, ticks.
    pub sag_duration_min: u32,
    pub sag_duration_max: u32,

    /// Forced sag period in ticks (0 disables).
    pub forced_sag_period: u64,
    /// Forced sag length in ticks, at the end of each period.
    pub forced_sag_duration: u64,
    /// Voltage subtracted during a forced sag (V).
    pub forced_sag_depth: f64,

    /// Daily load curve (W).
    pub load_curve: LoadCurve,
    /// Relative standard deviation of power noise.
    pub noise_factor: f64,
    pub meter_factor_min: f64,
    pub meter_factor_max: f64,

    pub power_factor_min: f64,
    pub power_factor_max: f64,

    /// Nominal frequency (Hz).
    pub frequency_nominal: f64,
    /// Standard deviation of frequency (Hz).
    pub frequency_variation: f64,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            nominal_voltage: DEFAULT_NOMINAL_VOLTAGE,
            voltage_noise_std: 3.0,
            sag_threshold: DEFAULT_SAG_THRESHOLD,
            swell_threshold: DEFAULT_SWELL_THRESHOLD,
            sag_probability: 0.001,
            sag_depth_min: 10.0,
            sag_depth_max: 30.0,
            sag_duration_min: 3,
            sag_duration_max: 15,
            forced_sag_period: 0,
            forced_sag_duration: 0,
            forced_sag_depth: 30.0,
            load_curve: LoadCurve::default(),
            noise_factor: 0.15,
            meter_factor_min: 0.7,
            meter_factor_max: 1.5,
            power_factor_min: 0.85,
            power_factor_max: 0.99,
            frequency_nominal: 60.0,
            frequency_variation: 0.05,
        }
    }
}

impl MeterConfig {
    /// Create a new meter config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set voltage noise.
    pub fn with_voltage_noise(mut self, std: f64) -> Self {
        self.voltage_noise_std = std;
        self
    }

    /// Set random sag start probability.
    pub fn with_sag_probability(mut self, p: f64) -> Self {
        self.sag_probability = p;
        self
    }

    /// Force a sag of `duration` ticks at the end of every `period` ticks.
    pub fn with_forced_sag(mut self, period: u64, duration: u64) -> Self {
        self.forced_sag_period = period;
        self.forced_sag_duration = duration;
        self
    }

    /// Set power noise factor.
    pub fn with_noise_factor(mut self, factor: f64) -> Self {
        self.noise_factor = factor;
        self
    }

    /// Set the load curve.
    pub fn with_load_curve(mut self, curve: LoadCurve) -> Self {
        self.load_curve = curve;
        self
    }

    /// Check ranges.
    pub fn validate(&self) -> Result<()> {
        let finite_non_negative = [
            ("voltage_noise_std", self.voltage_noise_std),
            ("noise_factor", self.noise_factor),
            ("frequency_variation", self.frequency_variation),
            ("sag_depth_min", self.sag_depth_min),
            ("forced_sag_depth", self.forced_sag_depth),
        ];
        for (name, value) in finite_non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SimError::InvalidConfig(format!(
                    "{name} must be finite and >= 0, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.sag_probability) {
            return Err(SimError::InvalidConfig(format!(
                "sag_probability must be in [0, 1], got {}",
                self.sag_probability
            )));
        }
        if self.sag_threshold >= self.swell_threshold {
            return Err(SimError::InvalidConfig(
                "sag_threshold must be below swell_threshold".to_string(),
            ));
        }
        check_range("sag_depth", self.sag_depth_min, self.sag_depth_max)?;
        check_range(
            "sag_duration",
            self.sag_duration_min as f64,
            self.sag_duration_max as f64,
        )?;
        check_range("meter_factor", self.meter_factor_min, self.meter_factor_max)?;
        check_range(
            "power_factor",
            self.power_factor_min,
            self.power_factor_max,
        )?;
        if self.power_factor_min <= 0.0 || self.power_factor_max > 1.0 {
            return Err(SimError::InvalidConfig(
                "power factor range must lie in (0, 1]".to_string(),
            ));
        }
        if self.forced_sag_duration > self.forced_sag_period {
            return Err(SimError::InvalidConfig(
                "forced_sag_duration cannot exceed forced_sag_period".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_range(name: &str, min: f64, max: f64) -> Result<()> {
    if !min.is_finite() || !max.is_finite() || min > max {
        return Err(SimError::InvalidConfig(format!(
            "{name} range [{min}, {max}] is empty or not finite"
        )));
    }
    Ok(())
}

/// Named sampling interval presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingPreset {
    /// 30 seconds.
    #[default]
    HighFrequency,
    /// 5 minutes.
    Standard,
    /// 15 minutes.
    LowFrequency,
}

impl SamplingPreset {
    pub fn interval(&self) -> Duration {
        match self {
            Self::HighFrequency => Duration::from_secs(30),
            Self::Standard => Duration::from_secs(300),
            Self::LowFrequency => Duration::from_secs(900),
        }
    }
}

impl FromStr for SamplingPreset {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "high_frequency" => Ok(Self::HighFrequency),
            "standard" => Ok(Self::Standard),
            "low_frequency" => Ok(Self::LowFrequency),
            other => Err(SimError::InvalidConfig(format!(
                "unknown sampling preset: {other}"
            ))),
        }
    }
}

/// A pole (aggregation point) and the meters behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoleConfig {
    pub pole_id: String,
    pub num_meters: usize,
    pub meter_id_prefix: String,
    pub preset: SamplingPreset,
    /// Explicit interval, overrides `preset`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_interval_secs: Option<u64>,
}

impl Default for PoleConfig {
    fn default() -> Self {
        Self {
            pole_id: "pole_A".to_string(),
            num_meters: 10,
            meter_id_prefix: "m".to_string(),
            preset: SamplingPreset::default(),
            sample_interval_secs: None,
        }
    }
}

impl PoleConfig {
    pub fn new(pole_id: impl Into<String>) -> Self {
        Self {
            pole_id: pole_id.into(),
            ..Self::default()
        }
    }

    /// Set meter count.
    pub fn with_meters(mut self, n: usize) -> Self {
        self.num_meters = n;
        self
    }

    /// Set sampling preset.
    pub fn with_preset(mut self, preset: SamplingPreset) -> Self {
        self.preset = preset;
        self
    }

    /// Set an explicit sample interval in seconds.
    pub fn with_sample_interval_secs(mut self, secs: u64) -> Self {
        self.sample_interval_secs = Some(secs);
        self
    }

    /// Effective interval between ticks.
    pub fn sample_interval(&self) -> Duration {
        match self.sample_interval_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self.preset.interval(),
        }
    }

    /// Meter id for `index`: `{prefix}_{pole_id}_{index:04}`.
    pub fn meter_id(&self, index: usize) -> String {
        format!("{}_{}_{:04}", self.meter_id_prefix, self.pole_id, index)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pole_id.trim().is_empty() {
            return Err(SimError::InvalidConfig("pole_id is empty".to_string()));
        }
        if self.sample_interval().is_zero() {
            return Err(SimError::InvalidConfig(
                "sample interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
