//! Property checks over long simulated runs.

use amigrid_sim::*;
use approx::assert_relative_eq;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;

fn pole(seed: u64, meters: usize, cfg: MeterConfig) -> PoleSimulator {
    PoleSimulator::new(
        PoleConfig::new("pole_A")
            .with_meters(meters)
            .with_sample_interval_secs(60),
        cfg,
        seed,
        Utc.with_ymd_and_hms(2025, 12, 26, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

#[test]
fn sequence_strictly_increasing_and_power_non_negative() {
    let mut sim = pole(11, 8, MeterConfig::default().with_sag_probability(0.01));
    let mut last: HashMap<String, u64> = HashMap::new();

    for r in sim.generate_ticks(24 * 60) {
        assert!(r.active_power >= 0.0);
        if let Some(prev) = last.insert(r.device_id.clone(), r.sequence) {
            assert!(r.sequence > prev, "{} went {} -> {}", r.device_id, prev, r.sequence);
        }
    }
    assert_eq!(last.len(), 8);
}

#[test]
fn power_equals_voltage_times_current_times_power_factor() {
    let sim = pole(12, 6, MeterConfig::default());
    let pfs: HashMap<String, f64> = sim
        .meters()
        .iter()
        .map(|m| (m.device_id().to_string(), m.power_factor()))
        .collect();
    let mut sim = sim;

    for r in sim.generate_ticks(600) {
        let pf = pfs[&r.device_id];
        assert_relative_eq!(
            r.active_power,
            r.voltage * r.current * pf,
            max_relative = 1e-9,
            epsilon = 1e-9
        );
    }
}

#[test]
fn evening_load_exceeds_midday() {
    let mut sim = pole(13, 20, MeterConfig::default().with_sag_probability(0.0));
    let readings = sim.generate_ticks(24 * 60);
    let mean_at = |hour: u32| {
        let rows: Vec<f64> = readings
            .iter()
            .filter(|r| chrono::Timelike::hour(&r.event_time) == hour)
            .map(|r| r.active_power)
            .collect();
        rows.iter().sum::<f64>() / rows.len() as f64
    };
    assert!(mean_at(19) > mean_at(12));
    assert!(mean_at(7) > mean_at(2));
}

#[test]
fn forced_sag_guarantees_flagged_readings() {
    let cfg = MeterConfig::default()
        .with_sag_probability(0.0)
        .with_forced_sag(60, 8);
    let mut sim = pole(14, 3, cfg);
    let flagged = sim
        .generate_ticks(120)
        .into_iter()
        .filter(|r| r.has_flag(amigrid::FLAG_VOLTAGE_SAG))
        .count();
    assert_eq!(flagged, 3 * 2 * 8);
}
