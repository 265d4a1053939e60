// AMIGrid Exporter - Pipeline runner and Prometheus exporter
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # AMIGrid Exporter
//!
//! Runs the simulated pipeline and serves Prometheus metrics.
//!
//! ## Usage
//!
//! ```bash
//! # Two poles over LTE-M, one simulated hour at 60x
//! amigrid-exporter --poles 2 --profile lte_m
//!
//! # Unpaced run writing warehouse rows, no HTTP server
//! amigrid-exporter --speed 0 --output-dir ./out --no-http
//!
//! # From a JSON document, on a custom port
//! amigrid-exporter --config pipeline.json --port 9090
//! ```

use amigrid_exporter::{router, AppState, ExporterError, Pipeline, PipelineConfig, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// AMIGrid pipeline runner and Prometheus exporter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON pipeline document; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backhaul profile (wired, 5g, lte_m, satellite)
    #[arg(long)]
    profile: Option<String>,

    /// Number of poles
    #[arg(long)]
    poles: Option<usize>,

    /// Meters per pole
    #[arg(long)]
    meters: Option<usize>,

    /// Sample interval in seconds for every pole
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Override the profile's drop rate
    #[arg(long)]
    drop_rate: Option<f64>,

    /// RNG seed
    #[arg(long)]
    seed: Option<u64>,

    /// Simulated run length in seconds
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Simulated seconds per wall-clock second (0 = unpaced)
    #[arg(short, long)]
    speed: Option<f64>,

    /// Directory for JSON-lines output
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, default_value = "9100")]
    port: u16,

    /// Do not start the HTTP server
    #[arg(long)]
    no_http: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(profile) = &self.profile {
            config.network_profile = profile.clone();
        }
        if let Some(poles) = self.poles {
            config = config.with_pole_count(poles);
        }
        if let Some(meters) = self.meters {
            config = config.with_meters_per_pole(meters);
        }
        if let Some(secs) = self.interval_secs {
            config = config.with_sample_interval_secs(secs);
        }
        if self.drop_rate.is_some() {
            config.drop_rate = self.drop_rate;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(secs) = self.duration_secs {
            config.duration_secs = secs;
        }
        if let Some(speed) = self.speed {
            config.speed = speed;
        }
        if self.output_dir.is_some() {
            config.output_dir = self.output_dir.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(args: Args) -> Result<()> {
    let config = args.pipeline_config()?;
    let pipeline = Pipeline::new(config)?;
    let (stop, shutdown) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, draining pipeline");
                let _ = stop.send(true);
            }
            Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
        }
    });

    if !args.no_http {
        let state = Arc::new(AppState::new(
            pipeline.status(),
            pipeline.config().network_profile.clone(),
            pipeline.config().poles.len(),
        ));
        let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
        let listener = TcpListener::bind(addr).await?;
        info!("Starting server on http://{}", addr);
        info!("Metrics endpoint: http://{}/metrics", addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router(state)).await {
                error!("HTTP server stopped: {}", e);
            }
        });
    }

    let report = pipeline.run(shutdown).await?;
    info!(
        "Pipeline finished: {} validated, {} anomalies {:?}, {} baseline buckets",
        report.validated, report.anomaly_count, report.anomalies_by_severity, report.baseline_buckets
    );
    info!(
        "Report: {}",
        serde_json::to_string(&report).map_err(ExporterError::from)?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);
    info!("AMIGrid Exporter v{}", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
