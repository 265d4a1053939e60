// AMIGrid Exporter - Pipeline runner and Prometheus exporter
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! HTTP surface: Prometheus scrape endpoint plus health and status.

use crate::metrics::encode_metrics;
use crate::pipeline::{PipelineStatus, StatusSnapshot};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers.
pub struct AppState {
    pub status: Arc<PipelineStatus>,
    pub network_profile: String,
    pub pole_count: usize,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(status: Arc<PipelineStatus>, network_profile: String, pole_count: usize) -> Self {
        Self {
            status,
            network_profile,
            pole_count,
            start_time: Instant::now(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

/// Root handler - shows a simple HTML page.
async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>AMIGrid Exporter</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }
        h1 { color: #2c3e50; }
        a { color: #3498db; text-decoration: none; }
        .endpoints { background: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0; }
        code { background: #e9ecef; padding: 2px 6px; border-radius: 4px; }
    </style>
</head>
<body>
    <h1>AMIGrid Exporter</h1>
    <p>Smart-meter telemetry pipeline: simulated meters, pole relays, validation and voltage analytics.</p>

    <div class="endpoints">
        <h2>Endpoints</h2>
        <div><a href="/metrics">/metrics</a> - Prometheus metrics</div>
        <div><a href="/health">/health</a> - Health check</div>
        <div><a href="/ready">/ready</a> - Readiness check</div>
        <div><a href="/status">/status</a> - Pipeline status (JSON)</div>
    </div>

    <h2>Metrics</h2>
    <ul>
        <li><code>amigrid_records_published_total</code> - Readings published per pole</li>
        <li><code>amigrid_records_dropped_total</code> - Readings lost on the backhaul</li>
        <li><code>amigrid_dead_letters_total</code> - Rejected records by error kind</li>
        <li><code>amigrid_anomaly_events_total</code> - Sags and swells by severity</li>
        <li><code>amigrid_window_avg_voltage_volts</code> - Last window average voltage</li>
        <li><code>amigrid_baseline_buckets</code> - Baseline table size</li>
    </ul>
</body>
</html>"#,
    )
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        encode_metrics(),
    )
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Ready while the pipeline is producing.
async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.status.running.load(Ordering::SeqCst) {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not running")
    }
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_secs: u64,
    pub network_profile: String,
    pub pole_count: usize,
    pub pipeline: StatusSnapshot,
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        network_profile: state.network_profile.clone(),
        pole_count: state.pole_count,
        pipeline: state.status.snapshot(),
    })
}
