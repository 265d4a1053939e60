//! Integration tests: simulated pole + backhaul feeding a relay.

use amigrid::{RawRecord, Validator};
use amigrid_gateway::*;
use amigrid_sim::{Backhaul, MeterConfig, NetworkProfile, PoleConfig, PoleSimulator, ProfileKind};
use chrono::{Duration, TimeZone, Utc};

fn pole(meters: usize, seed: u64) -> PoleSimulator {
    PoleSimulator::new(
        PoleConfig::new("pole_A")
            .with_meters(meters)
            .with_sample_interval_secs(1),
        MeterConfig::default(),
        seed,
        Utc.with_ymd_and_hms(2025, 12, 26, 12, 0, 0).unwrap(),
    )
    .unwrap()
}

/// Run `ticks` ticks through backhaul and relay, closing at the end.
fn run(
    sim: &mut PoleSimulator,
    profile: &NetworkProfile,
    relay: &mut GatewayRelay<MemoryTransport>,
    ticks: u64,
) {
    let mut link = Backhaul::new(99);
    for i in 0..ticks {
        let now = sim.tick_time(i);
        for reading in sim.generate_batch(now) {
            relay.ingest(link.relay(reading, profile));
        }
        relay.flush_if_ready(now);
    }
    relay.close(sim.tick_time(ticks));
}

#[test]
fn full_drop_publishes_nothing() {
    let profile = NetworkProfile::preset(ProfileKind::Wired).with_drop_rate(1.0);
    let mut sim = pole(10, 1);
    let mut relay = GatewayRelay::new(RelayConfig::new("pole_A"), MemoryTransport::new()).unwrap();

    run(&mut sim, &profile, &mut relay, 100);

    let stats = relay.stats();
    assert_eq!(stats.received_count, 1_000);
    assert_eq!(stats.dropped_count, 1_000);
    assert_eq!(stats.published_count, 0);
    assert_eq!(stats.published_batches, 0);
    assert!(relay.transport().batches().is_empty());
}

#[test]
fn every_reading_is_accounted_for() {
    let profile = NetworkProfile::preset(ProfileKind::Satellite).with_drop_rate(0.05);
    let mut sim = pole(8, 2);
    let config = RelayConfig::new("pole_A")
        .with_network_profile("satellite")
        .with_batch_size(25);
    let mut relay = GatewayRelay::new(config, MemoryTransport::new()).unwrap();

    run(&mut sim, &profile, &mut relay, 300);

    let stats = relay.stats();
    assert_eq!(stats.received_count, 2_400);
    assert_eq!(
        stats.dropped_count + stats.published_count + stats.lost_record_count,
        stats.received_count
    );
    assert_eq!(relay.pending(), 0);
    assert_eq!(relay.transport().message_count() as u64, stats.published_count);
    assert!(stats.dropped_count > 0);
}

#[test]
fn published_messages_validate_with_profile_attribute() {
    let profile = NetworkProfile::preset(ProfileKind::LteM).with_drop_rate(0.0);
    let mut sim = pole(4, 3);
    let config = RelayConfig::new("pole_A").with_network_profile("lte_m");
    let mut relay = GatewayRelay::new(config, MemoryTransport::new()).unwrap();

    run(&mut sim, &profile, &mut relay, 50);

    let validator = Validator::default();
    let now = Utc.with_ymd_and_hms(2025, 12, 26, 13, 0, 0).unwrap();
    let messages: Vec<RawRecord> = relay
        .transport_mut()
        .take_batches()
        .into_iter()
        .flat_map(|b| b.messages)
        .collect();
    assert_eq!(messages.len(), 200);
    for raw in &messages {
        let reading = validator.validate(raw, now).unwrap();
        assert_eq!(reading.network_profile.as_deref(), Some("lte_m"));
        assert_eq!(reading.group_id, "pole_A");
    }
}

#[test]
fn held_messages_arrive_out_of_order() {
    let profile = NetworkProfile::preset(ProfileKind::Wired)
        .with_drop_rate(0.0)
        .with_reorder_rate(0.2);
    let mut sim = pole(2, 4);
    let mut relay = GatewayRelay::new(
        RelayConfig::new("pole_A").with_batch_size(10),
        MemoryTransport::new(),
    )
    .unwrap();

    run(&mut sim, &profile, &mut relay, 200);

    assert!(relay.stats().reordered_count > 0);
    assert_eq!(relay.stats().published_count, 400);
}

#[test]
fn outage_is_counted_not_swallowed() {
    let profile = NetworkProfile::preset(ProfileKind::FiveG).with_drop_rate(0.0);
    let mut sim = pole(5, 5);
    let mut relay = GatewayRelay::new(
        RelayConfig::new("pole_A").with_batch_size(5),
        MemoryTransport::new(),
    )
    .unwrap();
    relay.transport_mut().set_fail_always(true);

    let mut link = Backhaul::new(1);
    let mut failures = Vec::new();
    for i in 0..4 {
        let now = sim.tick_time(i);
        for reading in sim.generate_batch(now) {
            failures.extend(relay.ingest(link.relay(reading, &profile)));
        }
        failures.extend(relay.flush_if_ready(now + Duration::seconds(1)));
    }
    failures.extend(relay.close(sim.tick_time(5)));

    assert!(failures
        .iter()
        .all(|r| matches!(r, Err(GatewayError::PermanentFailure { .. }))));
    assert_eq!(relay.stats().lost_record_count, 20);
    assert_eq!(relay.stats().permanent_failure_count, 4);
}
