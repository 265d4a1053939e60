// AMIGrid Sim - Error types
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Simulator error types.
//!
//! Generation itself is total; errors only arise while building a
//! simulator from configuration.

use thiserror::Error;

/// Simulator errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Network profile name is not one of the presets.
    #[error("Unknown network profile: {0} (expected wired, 5g, lte_m or satellite)")]
    UnknownProfile(String),

    /// Configuration value out of its accepted range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for simulator operations.
pub type Result<T> = std::result::Result<T, SimError>;
