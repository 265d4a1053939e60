// AMIGrid Gateway - Per-pole batching relay
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # AMIGrid Gateway - Per-pole batching relay
//!
//! Aggregates delivery events from every meter behind one pole, batches
//! them and hands the batches to a downstream transport with bounded
//! retry.
//!
//! ## Features
//!
//! - **Arrival ordering**: delayed readings are held until they arrive, so
//!   backhaul jitter shows up as out-of-order delivery
//! - **Size OR time trigger**: `batch_size` readings or
//!   `max_batch_latency_ms` since the oldest, whichever comes first
//! - **Hard cap**: a runaway buffer forces an immediate flush instead of
//!   growing or dropping
//! - **Bounded retry**: exponential backoff, then a counted permanent
//!   failure
//!
//! ## Quick Start
//!
//! ```rust
//! use amigrid::{DeliveryEvent, TelemetryReading};
//! use amigrid_gateway::{GatewayRelay, MemoryTransport, RelayConfig};
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let t0 = Utc.with_ymd_and_hms(2025, 12, 26, 12, 0, 0).unwrap();
//! let config = RelayConfig::new("pole_A").with_batch_size(2);
//! let mut relay = GatewayRelay::new(config, MemoryTransport::new()).unwrap();
//!
//! for seq in 1..=2 {
//!     let reading = TelemetryReading::new(t0, "m_pole_A_0000", "pole_A", seq, 240.0, 4.0, 900.0);
//!     relay.ingest(DeliveryEvent::delivered(reading, std::time::Duration::from_millis(40)));
//! }
//!
//! let results = relay.flush_if_ready(t0 + Duration::milliseconds(50));
//! assert_eq!(results.len(), 1);
//! assert_eq!(relay.stats().published_count, 2);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! DeliveryEvent ──▶ ingest ──┬─ dropped ──▶ dropped_count
//!                            └─ delivered ─▶ ReorderBuffer (by arrival)
//!                                               │ flush_if_ready(now)
//!                                               ▼
//!                                          batch buffer ──▶ Batch ──▶ Transport
//!                                                                (retry / PermanentFailure)
//! ```

mod batch;
mod config;
mod error;
mod relay;
mod reorder;
mod stats;
mod transport;

// Public API
pub use batch::{Batch, BatchReceipt};
pub use config::RelayConfig;
pub use error::{GatewayError, Result};
pub use relay::GatewayRelay;
pub use reorder::{Arrival, ReorderBuffer};
pub use stats::RelayStats;
pub use transport::{MemoryTransport, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
