// AMIGrid Analytics - Anomaly detection and baselines
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for AMIGrid Analytics

use thiserror::Error;

/// Main error type for analytics operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    /// No contributing day for this baseline slot
    #[error("No baseline for {group_id} at {hour_of_day:02}:{minute_bucket:02}")]
    InsufficientHistory {
        group_id: String,
        hour_of_day: u32,
        minute_bucket: u32,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for analytics operations
pub type Result<T> = std::result::Result<T, AnalyticsError>;
