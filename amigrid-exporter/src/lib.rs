// AMIGrid Exporter - Pipeline runner and Prometheus exporter
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # AMIGrid Exporter
//!
//! Runs the whole telemetry pipeline in one process and exposes it to
//! Prometheus:
//!
//! - one task per simulated meter, paced by the simulated clock
//! - one relay task per pole, batching onto an in-process channel
//! - one analytics task: validation, dead letters, anomaly detection,
//!   live windows and a baseline computed when the run ends
//!
//! ```no_run
//! use amigrid_exporter::{Pipeline, PipelineConfig};
//! use tokio::sync::watch;
//!
//! # async fn demo() -> amigrid_exporter::Result<()> {
//! let config = PipelineConfig::default().with_pole_count(2);
//! let (_stop, shutdown) = watch::channel(false);
//! let report = Pipeline::new(config)?.run(shutdown).await?;
//! println!("{} anomalies", report.anomaly_count);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod server;

pub use config::{pole_name, PipelineConfig};
pub use error::{ExporterError, Result};
pub use pipeline::{ChannelTransport, Pipeline, PipelineReport, PipelineStatus, StatusSnapshot};
pub use server::{router, AppState};
