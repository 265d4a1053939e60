// AMIGrid Sim - Meter model
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Single-meter reading generator.
//!
//! A [`Meter`] owns its sequence counter, sag state and seeded RNG, so two
//! meters built with the same seed and config produce identical streams.

use crate::config::MeterConfig;
use crate::error::{Result, SimError};
use amigrid::{TelemetryReading, FLAG_VOLTAGE_SAG, FLAG_VOLTAGE_SWELL};
use chrono::{DateTime, Timelike, Utc};
use log::{debug, info};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

/// Random sag in progress.
#[derive(Debug, Clone, Copy)]
struct SagState {
    remaining: u32,
    depth: f64,
}

/// One simulated smart meter.
#[derive(Debug, Clone)]
pub struct Meter {
    device_id: String,
    group_id: String,
    config: MeterConfig,
    rng: StdRng,
    voltage_noise: Normal<f64>,
    power_noise: Normal<f64>,
    frequency_noise: Normal<f64>,
    meter_factor: f64,
    power_factor: f64,
    sequence: u64,
    tick: u64,
    sag: Option<SagState>,
}

impl Meter {
    /// Create a meter. `meter_factor` and `power_factor` are sampled once
    /// from the configured ranges.
    pub fn new(
        device_id: impl Into<String>,
        group_id: impl Into<String>,
        config: MeterConfig,
        seed: u64,
    ) -> Result<Self> {
        config.validate()?;
        let normal = |std: f64| {
            Normal::new(0.0, std).map_err(|e| SimError::InvalidConfig(e.to_string()))
        };
        let voltage_noise = normal(config.voltage_noise_std)?;
        let power_noise = normal(config.noise_factor)?;
        let frequency_noise = normal(config.frequency_variation)?;

        let mut rng = StdRng::seed_from_u64(seed);
        let meter_factor = rng.gen_range(config.meter_factor_min..=config.meter_factor_max);
        let power_factor = rng.gen_range(config.power_factor_min..=config.power_factor_max);

        Ok(Self {
            device_id: device_id.into(),
            group_id: group_id.into(),
            config,
            rng,
            voltage_noise,
            power_noise,
            frequency_noise,
            meter_factor,
            power_factor,
            sequence: 0,
            tick: 0,
            sag: None,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Power factor sampled for this meter.
    pub fn power_factor(&self) -> f64 {
        self.power_factor
    }

    /// Load scale factor sampled for this meter.
    pub fn meter_factor(&self) -> f64 {
        self.meter_factor
    }

    /// Sequence number of the last reading produced (0 before the first).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Generate the reading for `tick_time`. Never fails.
    pub fn next_reading(&mut self, tick_time: DateTime<Utc>) -> TelemetryReading {
        let cfg = &self.config;

        let hour = tick_time.hour() as f64
            + tick_time.minute() as f64 / 60.0
            + tick_time.second() as f64 / 3600.0;
        let base_power = cfg.load_curve.at(hour);
        let noise = 1.0 + self.power_noise.sample(&mut self.rng);
        let active_power = (base_power * self.meter_factor * noise).max(0.0);

        let forced = self.in_forced_window();
        let sag_adjustment = self.update_sag();
        let cfg = &self.config;
        let mut voltage = cfg.nominal_voltage + self.voltage_noise.sample(&mut self.rng)
            - sag_adjustment;
        if forced {
            voltage = (voltage - cfg.forced_sag_depth).min(cfg.sag_threshold - 1.0);
        }
        let voltage = voltage.max(0.0);
        // A de-energized service draws nothing
        let active_power = if voltage > 0.0 { active_power } else { 0.0 };

        let current = if voltage > 0.0 && active_power > 0.0 {
            active_power / (voltage * self.power_factor)
        } else {
            0.0
        };
        let reactive_power = active_power * self.power_factor.acos().tan();
        let frequency = cfg.frequency_nominal + self.frequency_noise.sample(&mut self.rng);

        self.sequence += 1;
        self.tick += 1;

        let mut reading = TelemetryReading::new(
            tick_time,
            self.device_id.clone(),
            self.group_id.clone(),
            self.sequence,
            voltage,
            current,
            active_power,
        )
        .with_reactive_power(reactive_power)
        .with_frequency(frequency);

        if voltage < cfg.sag_threshold {
            reading = reading.with_flag(FLAG_VOLTAGE_SAG);
        } else if voltage > cfg.swell_threshold {
            reading = reading.with_flag(FLAG_VOLTAGE_SWELL);
        }
        reading
    }

    /// Whether the current tick falls at the end of a forced sag period.
    fn in_forced_window(&self) -> bool {
        let period = self.config.forced_sag_period;
        let duration = self.config.forced_sag_duration;
        if period == 0 || duration == 0 {
            return false;
        }
        self.tick % period >= period - duration
    }

    /// Advance random sag state; returns the voltage to subtract.
    fn update_sag(&mut self) -> f64 {
        if let Some(sag) = self.sag.as_mut() {
            sag.remaining = sag.remaining.saturating_sub(1);
            if sag.remaining == 0 {
                self.sag = None;
                debug!("Sag ended for meter {}", self.device_id);
                return 0.0;
            }
            return sag.depth;
        }

        let cfg = &self.config;
        if cfg.sag_probability > 0.0 && self.rng.gen::<f64>() < cfg.sag_probability {
            let depth = self.rng.gen_range(cfg.sag_depth_min..=cfg.sag_depth_max);
            let remaining = self
                .rng
                .gen_range(cfg.sag_duration_min..=cfg.sag_duration_max);
            info!(
                "Sag started for meter {}: depth={:.1}V, duration={} ticks",
                self.device_id, depth, remaining
            );
            self.sag = Some(SagState { remaining, depth });
            return depth;
        }
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn quiet() -> MeterConfig {
        MeterConfig::default().with_sag_probability(0.0)
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 26, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_sequence_increments() {
        let mut meter = Meter::new("m1", "pole_A", quiet(), 1).unwrap();
        for i in 1..=5 {
            let r = meter.next_reading(start() + Duration::seconds(i));
            assert_eq!(r.sequence, i as u64);
        }
        assert_eq!(meter.sequence(), 5);
    }

    #[test]
    fn test_power_triangle() {
        let mut meter = Meter::new("m1", "pole_A", quiet(), 2).unwrap();
        let pf = meter.power_factor();
        for i in 0..100 {
            let r = meter.next_reading(start() + Duration::minutes(i * 15));
            assert!(r.active_power >= 0.0);
            assert_relative_eq!(
                r.active_power,
                r.voltage * r.current * pf,
                max_relative = 1e-9,
                epsilon = 1e-9
            );
            let q = r.reactive_power.unwrap();
            assert_relative_eq!(q, r.active_power * pf.acos().tan(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_outage_keeps_power_triangle() {
        let mut cfg = quiet().with_forced_sag(2, 1);
        cfg.forced_sag_depth = 1_000.0;
        let mut meter = Meter::new("m1", "pole_A", cfg, 4).unwrap();
        let pf = meter.power_factor();
        let readings: Vec<_> = (0..10)
            .map(|i| meter.next_reading(start() + Duration::hours(18) + Duration::seconds(i)))
            .collect();

        let outages: Vec<_> = readings.iter().filter(|r| r.voltage == 0.0).collect();
        assert_eq!(outages.len(), 5);
        for r in &outages {
            assert_eq!(r.active_power, 0.0);
            assert_eq!(r.current, 0.0);
            assert_eq!(r.reactive_power, Some(0.0));
        }
        for r in &readings {
            assert_relative_eq!(
                r.active_power,
                r.voltage * r.current * pf,
                max_relative = 1e-9,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_deterministic_given_seed() {
        let mut a = Meter::new("m1", "pole_A", MeterConfig::default(), 99).unwrap();
        let mut b = Meter::new("m1", "pole_A", MeterConfig::default(), 99).unwrap();
        for i in 0..50 {
            let t = start() + Duration::seconds(i);
            assert_eq!(a.next_reading(t), b.next_reading(t));
        }
    }

    #[test]
    fn test_forced_sag_window() {
        let cfg = quiet().with_voltage_noise(1.0).with_forced_sag(20, 6);
        let mut meter = Meter::new("m1", "pole_A", cfg, 3).unwrap();
        let readings: Vec<_> = (0..40)
            .map(|i| meter.next_reading(start() + Duration::seconds(i)))
            .collect();

        // Ticks 14..20 and 34..40 are forced below the sag threshold
        for (i, r) in readings.iter().enumerate() {
            let forced = i % 20 >= 14;
            assert_eq!(r.has_flag(FLAG_VOLTAGE_SAG), forced, "tick {i}");
            if forced {
                assert!(r.voltage < 220.0);
            }
        }
    }

    #[test]
    fn test_random_sag_flags() {
        let cfg = MeterConfig::default()
            .with_voltage_noise(0.5)
            .with_sag_probability(1.0);
        let mut meter = Meter::new("m1", "pole_A", cfg, 4).unwrap();
        let r = meter.next_reading(start());
        // Depth of at least 10 V from a 240 V nominal
        assert!(r.voltage < 232.0);
    }

    #[test]
    fn test_frequency_near_nominal() {
        let mut meter = Meter::new("m1", "pole_A", quiet(), 5).unwrap();
        for i in 0..200 {
            let r = meter.next_reading(start() + Duration::seconds(i));
            let f = r.frequency.unwrap();
            assert!((f - 60.0).abs() < 0.5);
        }
    }

    #[test]
    fn test_factors_in_range() {
        for seed in 0..20 {
            let meter = Meter::new("m", "p", MeterConfig::default(), seed).unwrap();
            assert!((0.7..=1.5).contains(&meter.meter_factor()));
            assert!((0.85..=0.99).contains(&meter.power_factor()));
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = MeterConfig::default().with_noise_factor(f64::NAN);
        assert!(Meter::new("m", "p", cfg, 0).is_err());
    }
}
