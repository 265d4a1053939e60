// AMIGrid Exporter - Pipeline runner and Prometheus exporter
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Pipeline configuration document.
//!
//! One JSON file composes the per-component configs; every section is
//! optional and unknown keys are rejected.

use crate::error::{ExporterError, Result};
use amigrid::ValidatorConfig;
use amigrid_analytics::{BaselineConfig, DetectorConfig};
use amigrid_gateway::RelayConfig;
use amigrid_sim::{MeterConfig, NetworkProfile, PoleConfig};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything the pipeline needs to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Poles to simulate; each gets its own relay.
    pub poles: Vec<PoleConfig>,
    pub meter: MeterConfig,
    /// Backhaul profile name (`wired`, `5g`, `lte_m`, `satellite`).
    pub network_profile: String,
    /// Overrides on top of the named preset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_rate: Option<f64>,
    /// Relay template; `group_id` and `network_profile` are set per pole.
    pub relay: RelayConfig,
    pub validator: ValidatorConfig,
    /// Detector template; `sample_period_ms` is set per pole.
    pub detector: DetectorConfig,
    pub baseline: BaselineConfig,
    /// Width of live window aggregates, seconds.
    pub window_secs: u64,

    pub seed: u64,
    /// Simulated start time; defaults to today's midnight UTC.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Simulated run length.
    pub duration_secs: u64,
    /// Simulated seconds per wall-clock second; 0 runs unpaced.
    pub speed: f64,

    /// Directory for JSON-lines warehouse rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poles: vec![PoleConfig::default()],
            meter: MeterConfig::default(),
            network_profile: "5g".to_string(),
            drop_rate: None,
            relay: RelayConfig::default(),
            validator: ValidatorConfig::default(),
            detector: DetectorConfig::default(),
            baseline: BaselineConfig::default(),
            window_secs: amigrid_analytics::DEFAULT_WINDOW_SECS,
            seed: 42,
            start_time: None,
            duration_secs: 3_600,
            speed: 60.0,
            output_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON document.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Replace the pole list with `count` poles named `pole_A`, `pole_B`...
    /// keeping the first pole's settings.
    pub fn with_pole_count(mut self, count: usize) -> Self {
        let template = self.poles.first().cloned().unwrap_or_default();
        self.poles = (0..count)
            .map(|i| PoleConfig {
                pole_id: pole_name(i),
                ..template.clone()
            })
            .collect();
        self
    }

    /// Set the meter count on every pole.
    pub fn with_meters_per_pole(mut self, meters: usize) -> Self {
        for pole in &mut self.poles {
            pole.num_meters = meters;
        }
        self
    }

    /// Set an explicit sample interval on every pole.
    pub fn with_sample_interval_secs(mut self, secs: u64) -> Self {
        for pole in &mut self.poles {
            pole.sample_interval_secs = Some(secs);
        }
        self
    }

    /// Resolved backhaul profile.
    pub fn profile(&self) -> Result<NetworkProfile> {
        let mut profile = NetworkProfile::by_name(&self.network_profile)?;
        if let Some(rate) = self.drop_rate {
            profile = profile.with_drop_rate(rate);
        }
        profile.validate()?;
        Ok(profile)
    }

    /// Relay configuration for one pole.
    pub fn relay_for(&self, pole: &PoleConfig) -> RelayConfig {
        RelayConfig {
            group_id: pole.pole_id.clone(),
            network_profile: self.network_profile.clone(),
            ..self.relay.clone()
        }
    }

    /// Detector configuration for one pole, measuring durations in the
    /// pole's sampling period.
    pub fn detector_for(&self, pole: &PoleConfig) -> DetectorConfig {
        let period_ms = pole.sample_interval().as_millis() as u64;
        self.detector.clone().with_sample_period_ms(period_ms)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start_time.unwrap_or_else(|| {
            let today = Utc::now().date_naive();
            today
                .and_hms_opt(0, 0, 0)
                .map(|midnight| Utc.from_utc_datetime(&midnight))
                .unwrap_or_else(Utc::now)
        })
    }

    /// Ticks each meter of `pole` produces over the run.
    pub fn ticks_for(&self, pole: &PoleConfig) -> u64 {
        let interval = pole.sample_interval().as_secs().max(1);
        self.duration_secs / interval
    }

    /// Check the whole document before anything is spawned.
    pub fn validate(&self) -> Result<()> {
        if self.poles.is_empty() {
            return Err(ExporterError::Config("at least one pole is required".to_string()));
        }
        let mut ids: Vec<&str> = self.poles.iter().map(|p| p.pole_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.poles.len() {
            return Err(ExporterError::Config("pole ids must be unique".to_string()));
        }
        for pole in &self.poles {
            pole.validate()?;
            self.relay_for(pole).validate()?;
        }
        self.meter.validate()?;
        self.profile()?;
        for pole in &self.poles {
            self.detector_for(pole).validate()?;
        }
        self.baseline.validate()?;
        if self.window_secs == 0 {
            return Err(ExporterError::Config("window_secs must be positive".to_string()));
        }
        if !self.speed.is_finite() || self.speed < 0.0 {
            return Err(ExporterError::Config(format!(
                "speed must be finite and >= 0, got {}",
                self.speed
            )));
        }
        Ok(())
    }
}

/// `pole_A`, `pole_B`, ..., `pole_Z`, `pole_AA`, ...
pub fn pole_name(index: usize) -> String {
    let mut n = index;
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    letters.reverse();
    format!("pole_{}", letters.into_iter().collect::<String>())
}
