// AMIGrid Gateway - Per-pole batching relay
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for AMIGrid Gateway

use crate::error::{GatewayError, Result};
use amigrid::RetryPolicy;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Relay configuration for one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Group (pole) this relay serves
    pub group_id: String,

    /// Backhaul profile name, attached to every published message
    pub network_profile: String,

    /// Size trigger: publish once this many readings are buffered
    pub batch_size: usize,

    /// Time trigger: publish once the oldest buffered reading is this old
    pub max_batch_latency_ms: u64,

    /// Buffer size that forces an immediate flush (degraded-latency mode)
    pub hard_cap: usize,

    /// Maximum readings held in flight awaiting arrival
    pub reorder_capacity: usize,

    /// Publish retry policy
    pub retry: RetryPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            group_id: "pole_A".to_string(),
            network_profile: "5g".to_string(),
            batch_size: 100,
            max_batch_latency_ms: 500,
            hard_cap: 1_000,
            reorder_capacity: 256,
            retry: RetryPolicy::default(),
        }
    }
}

impl RelayConfig {
    /// Create a configuration for a group
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ..Default::default()
        }
    }

    pub fn with_network_profile(mut self, name: impl Into<String>) -> Self {
        self.network_profile = name.into();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_max_batch_latency_ms(mut self, ms: u64) -> Self {
        self.max_batch_latency_ms = ms;
        self
    }

    pub fn with_hard_cap(mut self, cap: usize) -> Self {
        self.hard_cap = cap;
        self
    }

    pub fn with_reorder_capacity(mut self, capacity: usize) -> Self {
        self.reorder_capacity = capacity;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub(crate) fn max_batch_latency(&self) -> Duration {
        Duration::milliseconds(self.max_batch_latency_ms as i64)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.group_id.is_empty() {
            return Err(GatewayError::InvalidConfig("group_id is empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(GatewayError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.hard_cap < self.batch_size {
            return Err(GatewayError::InvalidConfig(format!(
                "hard_cap ({}) must be >= batch_size ({})",
                self.hard_cap, self.batch_size
            )));
        }
        if self.reorder_capacity == 0 {
            return Err(GatewayError::InvalidConfig(
                "reorder_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
