// AMIGrid Gateway - Per-pole batching relay
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for AMIGrid Gateway

use thiserror::Error;

/// Main error type for Gateway operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Transient publish failure, eligible for retry
    #[error("Transport error: {0}")]
    Transport(String),

    /// Batch still failing after every retry; its records are lost
    #[error("Batch {batch_id} permanently failed after {attempts} attempts ({records} records lost)")]
    PermanentFailure {
        batch_id: u64,
        attempts: u32,
        records: usize,
    },

    /// A reading could not be serialized into the batch
    #[error("Encode error: {0}")]
    Encode(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for Gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
