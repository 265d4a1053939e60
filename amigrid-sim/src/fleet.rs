// AMIGrid Sim - Pole fleet
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! All meters behind one pole.

use crate::config::{MeterConfig, PoleConfig};
use crate::error::Result;
use crate::meter::Meter;
use amigrid::TelemetryReading;
use chrono::{DateTime, Utc};
use log::info;
use rand::prelude::*;
use rand::rngs::StdRng;

/// Simulates the meters attached to a single pole.
///
/// Per-meter seeds are drawn from one master seed, so a pole reproduces
/// exactly given the same seed and configuration.
#[derive(Debug, Clone)]
pub struct PoleSimulator {
    config: PoleConfig,
    meters: Vec<Meter>,
    start: DateTime<Utc>,
}

impl PoleSimulator {
    pub fn new(
        config: PoleConfig,
        meter_config: MeterConfig,
        seed: u64,
        start: DateTime<Utc>,
    ) -> Result<Self> {
        config.validate()?;
        let mut master = StdRng::seed_from_u64(seed);
        let meters = (0..config.num_meters)
            .map(|i| {
                Meter::new(
                    config.meter_id(i),
                    config.pole_id.clone(),
                    meter_config.clone(),
                    master.gen(),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Initialized pole {} with {} meters, interval={}s",
            config.pole_id,
            meters.len(),
            config.sample_interval().as_secs()
        );

        Ok(Self {
            config,
            meters,
            start,
        })
    }

    pub fn pole_id(&self) -> &str {
        &self.config.pole_id
    }

    pub fn config(&self) -> &PoleConfig {
        &self.config
    }

    pub fn meters(&self) -> &[Meter] {
        &self.meters
    }

    /// Hand the meters out, e.g. one async task per meter.
    pub fn into_meters(self) -> Vec<Meter> {
        self.meters
    }

    /// Time of tick `index`: `start + index * sample_interval`.
    pub fn tick_time(&self, index: u64) -> DateTime<Utc> {
        let step_ms = self.config.sample_interval().as_millis() as i64;
        self.start + chrono::Duration::milliseconds(step_ms.saturating_mul(index as i64))
    }

    /// One reading per meter, all stamped `tick_time`.
    pub fn generate_batch(&mut self, tick_time: DateTime<Utc>) -> Vec<TelemetryReading> {
        self.meters
            .iter_mut()
            .map(|m| m.next_reading(tick_time))
            .collect()
    }

    /// Readings for ticks `0..ticks`, tick-major.
    pub fn generate_ticks(&mut self, ticks: u64) -> Vec<TelemetryReading> {
        let mut out = Vec::with_capacity(ticks as usize * self.meters.len());
        for i in 0..ticks {
            let t = self.tick_time(i);
            out.extend(self.generate_batch(t));
        }
        out
    }
}
