// AMIGrid Exporter - Pipeline runner and Prometheus exporter
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Async wiring of the full pipeline.
//!
//! ```text
//! meter task ─┐                              ┌─ Validator ─▶ OrderedIngest ─▶ AnomalyDetector
//! meter task ─┼─▶ relay task (one per pole) ─┤                  │
//! meter task ─┘      ChannelTransport ──────▶ analytics task    └─▶ lookback window ─▶ BaselineAggregator
//! ```
//!
//! Each meter owns its `Meter` and `Backhaul`. Each relay owns its
//! `GatewayRelay` and is the only writer of its buffer. Shutdown flows
//! forward: meters stop, their channels close, relays `close`, the batch
//! channel closes, and analytics flushes open islands before returning.

use crate::config::PipelineConfig;
use crate::error::{ExporterError, Result};
use crate::metrics;
use amigrid::{
    DeadLetter, DeadLetterSink, DeliveryEvent, JsonLinesWriter, MemoryDeadLetterQueue,
    TelemetryReading, Validator,
};
use amigrid_analytics::{
    AnomalyDetector, AnomalyEvent, BaselineAggregator, BaselineBucket, BaselineConfig,
    BaselineStore, GroupSummary, OrderedIngest, SummaryAccumulator, WindowAggregator,
};
use amigrid_gateway::{
    Batch, BatchReceipt, GatewayError, GatewayRelay, RelayConfig, RelayStats, Transport,
};
use amigrid_sim::{Backhaul, Meter, NetworkProfile, PoleSimulator};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Capacity of each meter-to-relay channel.
const RELAY_CHANNEL_CAPACITY: usize = 1_024;

/// Live counters shared with the HTTP handlers.
#[derive(Debug, Default)]
pub struct PipelineStatus {
    pub running: AtomicBool,
    pub readings_generated: AtomicU64,
    pub validated: AtomicU64,
    pub dead_letters: AtomicU64,
    pub anomalies: AtomicU64,
    pub late_readings: AtomicU64,
    pub baseline_buckets: AtomicU64,
    /// Simulated clock, Unix milliseconds.
    pub simulated_time_ms: AtomicI64,
}

/// Point-in-time copy of [`PipelineStatus`].
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub readings_generated: u64,
    pub validated: u64,
    pub dead_letters: u64,
    pub anomalies: u64,
    pub late_readings: u64,
    pub baseline_buckets: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulated_time: Option<DateTime<Utc>>,
}

impl PipelineStatus {
    pub fn snapshot(&self) -> StatusSnapshot {
        let ms = self.simulated_time_ms.load(Ordering::SeqCst);
        StatusSnapshot {
            running: self.running.load(Ordering::SeqCst),
            readings_generated: self.readings_generated.load(Ordering::SeqCst),
            validated: self.validated.load(Ordering::SeqCst),
            dead_letters: self.dead_letters.load(Ordering::SeqCst),
            anomalies: self.anomalies.load(Ordering::SeqCst),
            late_readings: self.late_readings.load(Ordering::SeqCst),
            baseline_buckets: self.baseline_buckets.load(Ordering::SeqCst),
            simulated_time: (ms > 0)
                .then(|| DateTime::<Utc>::from_timestamp_millis(ms))
                .flatten(),
        }
    }

    fn advance_clock(&self, t: DateTime<Utc>) {
        let prev = self
            .simulated_time_ms
            .fetch_max(t.timestamp_millis(), Ordering::SeqCst);
        metrics::update_simulated_time(prev.max(t.timestamp_millis()) / 1_000);
    }
}

/// Relay transport handing batches to the analytics task.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Batch>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<Batch>) -> Self {
        Self { tx }
    }
}

impl Transport for ChannelTransport {
    fn publish(&mut self, batch: &Batch) -> amigrid_gateway::Result<()> {
        self.tx
            .send(batch.clone())
            .map_err(|_| GatewayError::Transport("analytics channel closed".to_string()))
    }
}

/// JSON-lines warehouse rows.
struct Warehouse {
    readings: JsonLinesWriter<BufWriter<File>>,
    anomalies: JsonLinesWriter<BufWriter<File>>,
    dead_letters: JsonLinesWriter<BufWriter<File>>,
    baselines: JsonLinesWriter<BufWriter<File>>,
}

impl Warehouse {
    fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            readings: JsonLinesWriter::create(dir.join("readings.jsonl"))?,
            anomalies: JsonLinesWriter::create(dir.join("anomalies.jsonl"))?,
            dead_letters: JsonLinesWriter::create(dir.join("dead_letters.jsonl"))?,
            baselines: JsonLinesWriter::create(dir.join("baselines.jsonl"))?,
        })
    }

    fn flush(&mut self) -> Result<()> {
        self.readings.flush()?;
        self.anomalies.flush()?;
        self.dead_letters.flush()?;
        self.baselines.flush()?;
        Ok(())
    }
}

/// Dead-letter sink feeding metrics, the bounded queue and optionally a
/// file.
struct DeadLetterRouter<'a> {
    queue: &'a mut MemoryDeadLetterQueue,
    file: Option<&'a mut JsonLinesWriter<BufWriter<File>>>,
    status: &'a PipelineStatus,
}

impl DeadLetterSink for DeadLetterRouter<'_> {
    fn send(&mut self, letter: DeadLetter) {
        metrics::record_dead_letter(&letter.error_kind);
        self.status.dead_letters.fetch_add(1, Ordering::SeqCst);
        if let Some(file) = self.file.as_deref_mut() {
            file.send(letter.clone());
        }
        self.queue.send(letter);
    }
}

/// What the run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub relays: BTreeMap<String, RelayStats>,
    pub validated: u64,
    pub dead_letters_by_kind: BTreeMap<String, u64>,
    pub anomalies_by_severity: BTreeMap<String, u64>,
    pub anomaly_count: usize,
    pub late_readings: u64,
    pub baseline_buckets: usize,
    pub summaries: Vec<GroupSummary>,
}

/// Analytics results returned by the analytics task.
struct AnalyticsOutput {
    validated: u64,
    dead_letters_by_kind: BTreeMap<String, u64>,
    anomalies: Vec<AnomalyEvent>,
    late_readings: u64,
    baseline: BaselineStore,
    summaries: Vec<GroupSummary>,
}

/// Per-meter task inputs.
struct MeterTask {
    meter: Meter,
    link: Backhaul,
    profile: Arc<NetworkProfile>,
    start: DateTime<Utc>,
    interval: Duration,
    ticks: u64,
    pace: Option<Duration>,
    tx: mpsc::Sender<DeliveryEvent>,
    shutdown: watch::Receiver<bool>,
    status: Arc<PipelineStatus>,
}

/// A configured pipeline, ready to run once.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    status: Arc<PipelineStatus>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            status: Arc::new(PipelineStatus::default()),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn status(&self) -> Arc<PipelineStatus> {
        Arc::clone(&self.status)
    }

    /// Run until every meter has produced its ticks or `shutdown` flips
    /// to `true`.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<PipelineReport> {
        let config = Arc::clone(&self.config);
        let status = Arc::clone(&self.status);
        let profile = Arc::new(config.profile()?);
        let start = config.start();
        status.running.store(true, Ordering::SeqCst);
        info!(
            "Starting pipeline: {} poles, profile={}, start={}, duration={}s",
            config.poles.len(),
            profile.name,
            start,
            config.duration_secs
        );

        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let analytics = tokio::spawn(run_analytics(
            batch_rx,
            Arc::clone(&config),
            Arc::clone(&status),
        ));

        let mut meters = Vec::new();
        let mut relays = Vec::new();
        for (p, pole) in config.poles.iter().enumerate() {
            let pole_seed = config.seed.wrapping_add((p as u64).wrapping_mul(1_000_003));
            let sim = PoleSimulator::new(pole.clone(), config.meter.clone(), pole_seed, start)?;
            let interval = pole.sample_interval();
            let pace = (config.speed > 0.0).then(|| interval.div_f64(config.speed));
            let ticks = config.ticks_for(pole);

            let (tx, rx) = mpsc::channel(RELAY_CHANNEL_CAPACITY);
            relays.push(tokio::spawn(run_relay(
                config.relay_for(pole),
                rx,
                ChannelTransport::new(batch_tx.clone()),
            )));

            for (m, meter) in sim.into_meters().into_iter().enumerate() {
                let link_seed = pole_seed ^ (m as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                meters.push(tokio::spawn(run_meter(MeterTask {
                    meter,
                    link: Backhaul::new(link_seed),
                    profile: Arc::clone(&profile),
                    start,
                    interval,
                    ticks,
                    pace,
                    tx: tx.clone(),
                    shutdown: shutdown.clone(),
                    status: Arc::clone(&status),
                })));
            }
        }
        drop(batch_tx);

        for handle in meters {
            handle
                .await
                .map_err(|e| ExporterError::Task(e.to_string()))?;
        }
        let mut relay_stats = BTreeMap::new();
        for handle in relays {
            let (group, stats) = handle
                .await
                .map_err(|e| ExporterError::Task(e.to_string()))??;
            relay_stats.insert(group, stats);
        }
        let output = analytics
            .await
            .map_err(|e| ExporterError::Task(e.to_string()))??;
        status.running.store(false, Ordering::SeqCst);

        let mut anomalies_by_severity = BTreeMap::new();
        for ev in &output.anomalies {
            *anomalies_by_severity
                .entry(ev.severity.as_str().to_string())
                .or_insert(0) += 1;
        }
        Ok(PipelineReport {
            relays: relay_stats,
            validated: output.validated,
            dead_letters_by_kind: output.dead_letters_by_kind,
            anomalies_by_severity,
            anomaly_count: output.anomalies.len(),
            late_readings: output.late_readings,
            baseline_buckets: output.baseline.len(),
            summaries: output.summaries,
        })
    }
}

async fn run_meter(task: MeterTask) {
    let MeterTask {
        mut meter,
        mut link,
        profile,
        start,
        interval,
        ticks,
        pace,
        tx,
        mut shutdown,
        status,
    } = task;
    let step_ms = interval.as_millis() as i64;

    for i in 0..ticks {
        if *shutdown.borrow() {
            debug!("Meter {} stopping at tick {}", meter.device_id(), i);
            break;
        }
        let t = start + ChronoDuration::milliseconds(step_ms.saturating_mul(i as i64));
        let reading = meter.next_reading(t);
        metrics::record_generated(meter.group_id());
        status.readings_generated.fetch_add(1, Ordering::SeqCst);
        status.advance_clock(t);

        if tx.send(link.relay(reading, &profile)).await.is_err() {
            warn!("Relay for {} is gone, meter stopping", meter.group_id());
            break;
        }

        match pace {
            Some(pace) => {
                tokio::select! {
                    _ = tokio::time::sleep(pace) => {}
                    _ = shutdown.changed() => {}
                }
            }
            None => tokio::task::yield_now().await,
        }
    }
}

fn log_failures(group: &str, results: Vec<amigrid_gateway::Result<BatchReceipt>>) {
    for result in results {
        match result {
            Ok(receipt) if receipt.attempts > 1 => debug!(
                "{}: batch {} published after {} attempts",
                group, receipt.batch_id, receipt.attempts
            ),
            Ok(_) => {}
            Err(e) => debug!("{}: {}", group, e),
        }
    }
}

async fn run_relay(
    config: RelayConfig,
    mut rx: mpsc::Receiver<DeliveryEvent>,
    transport: ChannelTransport,
) -> Result<(String, RelayStats)> {
    let group = config.group_id.clone();
    let mut relay = GatewayRelay::new(config, transport)?;
    let mut now: Option<DateTime<Utc>> = None;
    let mut last = *relay.stats();

    while let Some(event) = rx.recv().await {
        let t = event.reading.event_time;
        let clock = now.map_or(t, |n| n.max(t));
        now = Some(clock);

        log_failures(&group, relay.ingest(event));
        log_failures(&group, relay.flush_if_ready(clock));

        let stats = *relay.stats();
        metrics::record_relay_stats(&group, &last, &stats, relay.pending());
        last = stats;
    }

    log_failures(&group, relay.close(now.unwrap_or_else(Utc::now)));
    let stats = *relay.stats();
    metrics::record_relay_stats(&group, &last, &stats, relay.pending());
    info!("Relay {} closed: {}", group, stats.summary());
    Ok((group, stats))
}

/// One detector per pole, each timing islands in its pole's sampling
/// period.
struct GroupDetectors {
    detectors: BTreeMap<String, AnomalyDetector>,
}

impl GroupDetectors {
    fn new(config: &PipelineConfig) -> Result<Self> {
        let mut detectors = BTreeMap::new();
        for pole in &config.poles {
            let detector = AnomalyDetector::new(config.detector_for(pole))?;
            detectors.insert(pole.pole_id.clone(), detector);
        }
        Ok(Self { detectors })
    }

    fn observe(&mut self, reading: &TelemetryReading) -> Option<AnomalyEvent> {
        match self.detectors.get_mut(&reading.group_id) {
            Some(detector) => detector.observe(reading),
            None => {
                debug!(
                    "No detector for group {}, skipping {}",
                    reading.group_id, reading.device_id
                );
                None
            }
        }
    }

    fn close_all(&mut self) -> Vec<AnomalyEvent> {
        self.detectors
            .values_mut()
            .flat_map(|d| d.close_all())
            .collect()
    }

    fn open_islands(&self) -> usize {
        self.detectors.values().map(|d| d.open_islands()).sum()
    }
}

/// Validated readings still inside the baseline lookback window.
///
/// The window trails the latest event date seen; readings that fall out
/// of it, or land on excluded days, are dropped as the clock advances.
struct BaselineHistory {
    aggregator: BaselineAggregator,
    readings: Vec<TelemetryReading>,
    as_of: Option<NaiveDate>,
}

impl BaselineHistory {
    fn new(config: BaselineConfig) -> Result<Self> {
        Ok(Self {
            aggregator: BaselineAggregator::new(config)?,
            readings: Vec::new(),
            as_of: None,
        })
    }

    fn push(&mut self, reading: &TelemetryReading) {
        let next = reading.event_time.date_naive() + ChronoDuration::days(1);
        if self.as_of.map_or(true, |as_of| next > as_of) {
            self.as_of = Some(next);
            let aggregator = &self.aggregator;
            self.readings
                .retain(|r| aggregator.in_window(r.event_time.date_naive(), next));
        }
        if let Some(as_of) = self.as_of {
            if self
                .aggregator
                .in_window(reading.event_time.date_naive(), as_of)
            {
                self.readings.push(reading.clone());
            }
        }
    }

    fn len(&self) -> usize {
        self.readings.len()
    }

    fn compute(&self, computed_at: DateTime<Utc>) -> Option<Vec<BaselineBucket>> {
        let as_of = self.as_of?;
        Some(self.aggregator.compute(&self.readings, as_of, computed_at))
    }
}

async fn run_analytics(
    mut rx: mpsc::UnboundedReceiver<Batch>,
    config: Arc<PipelineConfig>,
    status: Arc<PipelineStatus>,
) -> Result<AnalyticsOutput> {
    let validator = Validator::new(config.validator.clone());
    let mut detectors = GroupDetectors::new(&config)?;
    let mut ingest = OrderedIngest::new(config.detector.reorder_depth);
    let mut windows = WindowAggregator::new(config.window_secs)?;
    let mut history = BaselineHistory::new(config.baseline.clone())?;
    let mut groups: BTreeMap<String, SummaryAccumulator> = config
        .poles
        .iter()
        .map(|p| {
            let acc = SummaryAccumulator::new(p.pole_id.as_str(), &config.detector);
            (p.pole_id.clone(), acc)
        })
        .collect();
    let mut queue = MemoryDeadLetterQueue::default();
    let mut warehouse = match &config.output_dir {
        Some(dir) => Some(Warehouse::open(dir)?),
        None => None,
    };

    let mut validated: u64 = 0;
    let mut anomalies: Vec<AnomalyEvent> = Vec::new();
    let mut watermark: Option<DateTime<Utc>> = None;
    let mut late_seen = 0;

    let mut on_event = |ev: AnomalyEvent, warehouse: &mut Option<Warehouse>| -> Result<()> {
        metrics::record_anomaly(&ev);
        status.anomalies.fetch_add(1, Ordering::SeqCst);
        if let Some(w) = warehouse.as_mut() {
            w.anomalies.write_row(&ev)?;
        }
        anomalies.push(ev);
        Ok(())
    };

    while let Some(batch) = rx.recv().await {
        for raw in &batch.messages {
            let mut sink = DeadLetterRouter {
                queue: &mut queue,
                file: warehouse.as_mut().map(|w| &mut w.dead_letters),
                status: &status,
            };
            let Some(reading) = validator.route(raw, Utc::now(), &mut sink) else {
                continue;
            };
            validated += 1;
            metrics::record_validated();
            status.validated.fetch_add(1, Ordering::SeqCst);
            if let Some(w) = warehouse.as_mut() {
                w.readings.write_row(&reading)?;
            }

            windows.add(&reading);
            if let Some(acc) = groups.get_mut(&reading.group_id) {
                acc.add(&reading);
            }
            history.push(&reading);
            watermark = Some(watermark.map_or(reading.event_time, |w| w.max(reading.event_time)));

            for ready in ingest.push(reading) {
                if let Some(ev) = detectors.observe(&ready) {
                    on_event(ev, &mut warehouse)?;
                }
            }
        }

        if let Some(w) = watermark {
            for window in windows.drain_closed(w) {
                metrics::record_window(&window);
            }
        }
        let late = ingest.late_count();
        if late > late_seen {
            metrics::record_late(late - late_seen);
            status.late_readings.store(late, Ordering::SeqCst);
            late_seen = late;
        }
        metrics::update_open_islands(detectors.open_islands());
    }

    // Upstream closed: release held readings, then close open islands
    for ready in ingest.flush() {
        if let Some(ev) = detectors.observe(&ready) {
            on_event(ev, &mut warehouse)?;
        }
    }
    for ev in detectors.close_all() {
        on_event(ev, &mut warehouse)?;
    }
    for window in windows.flush() {
        metrics::record_window(&window);
    }
    metrics::update_open_islands(0);
    info!(
        "Analytics drained: {} validated, {} dead letters, {} anomalies, {} readings in baseline window",
        validated,
        queue.total(),
        anomalies.len(),
        history.len()
    );

    let mut baseline = BaselineStore::new();
    if let Some(buckets) = history.compute(Utc::now()) {
        if let Some(w) = warehouse.as_mut() {
            w.baselines.write_all(&buckets)?;
        }
        baseline.replace(buckets);
    }
    metrics::update_baseline_buckets(baseline.len());
    status
        .baseline_buckets
        .store(baseline.len() as u64, Ordering::SeqCst);

    let mut summaries = Vec::new();
    for acc in groups.values() {
        if let Some(summary) = acc.finish() {
            info!(
                "Group {}: health={:.1} low_voltage={:.2}% meters={} readings={}",
                summary.group_id,
                summary.health_score,
                summary.low_voltage_pct,
                summary.meter_count,
                summary.reading_count
            );
            summaries.push(summary);
        }
    }

    if let Some(w) = warehouse.as_mut() {
        w.flush()?;
    }

    Ok(AnalyticsOutput {
        validated,
        dead_letters_by_kind: queue.counts_by_kind().clone(),
        anomalies,
        late_readings: late_seen,
        baseline,
        summaries,
    })
}
