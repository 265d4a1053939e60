// AMIGrid Exporter - Pipeline runner and Prometheus exporter
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Exporter errors.

use thiserror::Error;

/// Errors that stop the pipeline from starting or finishing cleanly.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] amigrid::AmiError),

    #[error(transparent)]
    Sim(#[from] amigrid_sim::SimError),

    #[error(transparent)]
    Gateway(#[from] amigrid_gateway::GatewayError),

    #[error(transparent)]
    Analytics(#[from] amigrid_analytics::AnalyticsError),

    #[error("Task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, ExporterError>;
