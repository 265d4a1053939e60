// AMIGrid Gateway - Per-pole batching relay
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Gateway batching relay
//!
//! One [`GatewayRelay`] per group, owned by a single task. Delivery events
//! flow through three stages:
//!
//! 1. `ingest`: dropped events are counted, delivered ones go in flight
//! 2. arrival: in-flight readings move to the batch buffer once their
//!    arrival time has passed, in arrival order
//! 3. publish: the buffer is cut into a batch on the size trigger, the
//!    time trigger, or the hard cap, and published with bounded retry

use crate::batch::{Batch, BatchReceipt};
use crate::config::RelayConfig;
use crate::error::{GatewayError, Result};
use crate::reorder::{Arrival, ReorderBuffer};
use crate::stats::RelayStats;
use crate::transport::Transport;
use amigrid::recovery::{no_sleep, with_retry};
use amigrid::{DeliveryEvent, TelemetryReading};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::collections::HashMap;
use std::time::Duration;

/// Batching relay for one group
pub struct GatewayRelay<T: Transport> {
    config: RelayConfig,
    transport: T,
    in_flight: ReorderBuffer,
    buffer: Vec<Arrival>,
    /// Highest sequence released per device
    last_released: HashMap<String, u64>,
    next_batch_id: u64,
    stats: RelayStats,
    sleep: fn(Duration),
}

impl<T: Transport> GatewayRelay<T> {
    /// Create a relay. Backoff is accounted for but not slept; see
    /// [`GatewayRelay::with_sleep`] for wall-clock publishing.
    pub fn new(config: RelayConfig, transport: T) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            in_flight: ReorderBuffer::new(config.reorder_capacity),
            buffer: Vec::with_capacity(config.batch_size),
            config,
            transport,
            last_released: HashMap::new(),
            next_batch_id: 1,
            stats: RelayStats::default(),
            sleep: no_sleep,
        })
    }

    /// Use `sleep` between publish retries
    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Readings held in flight or buffered, not yet published
    pub fn pending(&self) -> usize {
        self.in_flight.len() + self.buffer.len()
    }

    /// Accept a delivery event.
    ///
    /// Dropped events are only counted. Delivered events are held until
    /// they arrive; if the in-flight buffer overflows, the earliest arrival
    /// is moved to the batch buffer immediately, and a buffer at the hard
    /// cap is flushed on the spot.
    pub fn ingest(&mut self, event: DeliveryEvent) -> Vec<Result<BatchReceipt>> {
        self.stats.received_count += 1;
        if event.dropped || !event.delivered {
            self.stats.dropped_count += 1;
            return Vec::new();
        }

        match self.in_flight.push(event) {
            Some(arrival) => {
                let now = arrival.arrived_at;
                self.accept(arrival);
                if self.buffer.len() >= self.config.hard_cap {
                    self.stats.forced_flush_count += 1;
                    debug!(
                        "{}: hard cap reached ({} buffered), forcing flush",
                        self.config.group_id,
                        self.buffer.len()
                    );
                    return self.flush_all(now);
                }
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Move arrived readings into the buffer and publish every batch whose
    /// size or time trigger has fired by `now`.
    pub fn flush_if_ready(&mut self, now: DateTime<Utc>) -> Vec<Result<BatchReceipt>> {
        for arrival in self.in_flight.release_due(now) {
            self.accept(arrival);
        }

        let mut results = Vec::new();
        if self.buffer.len() >= self.config.hard_cap {
            self.stats.forced_flush_count += 1;
            return self.flush_all(now);
        }
        while self.buffer.len() >= self.config.batch_size {
            results.push(self.publish_front(self.config.batch_size, now));
        }
        if let Some(oldest) = self.oldest_buffered() {
            if now - oldest >= self.config.max_batch_latency() {
                let n = self.buffer.len();
                results.push(self.publish_front(n, now));
            }
        }
        results
    }

    /// Drain in-flight and buffered readings regardless of triggers
    pub fn close(&mut self, now: DateTime<Utc>) -> Vec<Result<BatchReceipt>> {
        for arrival in self.in_flight.drain() {
            self.accept(arrival);
        }
        let results = self.flush_all(now);
        debug!(
            "{}: closed, stats {}",
            self.config.group_id,
            self.stats.summary()
        );
        results
    }

    /// Arrival time of the oldest buffered reading
    fn oldest_buffered(&self) -> Option<DateTime<Utc>> {
        self.buffer.iter().map(|a| a.arrived_at).min()
    }

    fn accept(&mut self, arrival: Arrival) {
        let reading = &arrival.reading;
        match self.last_released.get_mut(&reading.device_id) {
            Some(last) if reading.sequence < *last => {
                self.stats.reordered_count += 1;
            }
            Some(last) => *last = reading.sequence,
            None => {
                self.last_released
                    .insert(reading.device_id.clone(), reading.sequence);
            }
        }
        self.buffer.push(arrival);
    }

    fn flush_all(&mut self, now: DateTime<Utc>) -> Vec<Result<BatchReceipt>> {
        let mut results = Vec::new();
        while !self.buffer.is_empty() {
            let n = self.buffer.len().min(self.config.batch_size);
            results.push(self.publish_front(n, now));
        }
        results
    }

    /// Publish the first `n` buffered readings as one batch
    fn publish_front(&mut self, n: usize, now: DateTime<Utc>) -> Result<BatchReceipt> {
        let readings: Vec<TelemetryReading> =
            self.buffer.drain(..n).map(|a| a.reading).collect();

        let batch_id = self.next_batch_id;
        self.next_batch_id += 1;
        let batch = match Batch::from_readings(
            batch_id,
            &self.config.group_id,
            &self.config.network_profile,
            now,
            &readings,
        ) {
            Ok(batch) => batch,
            Err(e) => {
                self.stats.permanent_failure_count += 1;
                self.stats.lost_record_count += readings.len() as u64;
                warn!(
                    "{}: batch {} could not be encoded: {}",
                    self.config.group_id, batch_id, e
                );
                return Err(e);
            }
        };
        let records = batch.len();

        let transport = &mut self.transport;
        let outcome = with_retry(&self.config.retry, self.sleep, || transport.publish(&batch));

        match outcome {
            Ok(done) => {
                self.stats.published_count += records as u64;
                self.stats.published_batches += 1;
                self.stats.retry_count += done.retries() as u64;
                self.stats.backoff_ms += done.total_backoff.as_millis() as u64;
                Ok(BatchReceipt {
                    batch_id,
                    records,
                    attempts: done.attempts,
                })
            }
            Err(exhausted) => {
                self.stats.retry_count += exhausted.retries() as u64;
                self.stats.backoff_ms += exhausted.total_backoff.as_millis() as u64;
                self.stats.permanent_failure_count += 1;
                self.stats.lost_record_count += records as u64;
                warn!(
                    "{}: batch {} permanently failed after {} attempts: {}",
                    self.config.group_id, batch_id, exhausted.attempts, exhausted.last_error
                );
                Err(GatewayError::PermanentFailure {
                    batch_id,
                    attempts: exhausted.attempts,
                    records,
                })
            }
        }
    }
}
