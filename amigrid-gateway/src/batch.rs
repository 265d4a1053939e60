// AMIGrid Gateway - Per-pole batching relay
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Publish batches
//!
//! A [`Batch`] is what the relay hands to the transport: one opaque JSON
//! message per reading, each tagged with `device_id`, `group_id` and
//! `network_profile` attributes.

use crate::error::{GatewayError, Result};
use amigrid::{RawRecord, TelemetryReading, ATTR_NETWORK_PROFILE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A batch of serialized readings from one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Per-relay monotonic id
    pub batch_id: u64,
    pub group_id: String,
    /// Time the batch was cut
    pub created_at: DateTime<Utc>,
    pub messages: Vec<RawRecord>,
}

impl Batch {
    /// Serialize `readings` into a batch
    pub fn from_readings(
        batch_id: u64,
        group_id: &str,
        network_profile: &str,
        created_at: DateTime<Utc>,
        readings: &[TelemetryReading],
    ) -> Result<Self> {
        let messages = readings
            .iter()
            .map(|r| {
                RawRecord::from_reading(r)
                    .map(|raw| raw.with_attribute(ATTR_NETWORK_PROFILE, network_profile))
                    .map_err(|e| GatewayError::Encode(format!("{}: {}", r.device_id, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            batch_id,
            group_id: group_id.to_string(),
            created_at,
            messages,
        })
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total payload bytes
    pub fn payload_bytes(&self) -> usize {
        self.messages.iter().map(|m| m.payload.len()).sum()
    }
}

/// Acknowledgement for a published batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchReceipt {
    pub batch_id: u64,
    pub records: usize,
    /// Publish attempts, including the successful one
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_batch_attributes() {
        let t = Utc.with_ymd_and_hms(2025, 12, 26, 12, 0, 0).unwrap();
        let readings = vec![
            TelemetryReading::new(t, "m_pole_A_0000", "pole_A", 1, 240.0, 4.0, 900.0),
            TelemetryReading::new(t, "m_pole_A_0001", "pole_A", 1, 239.0, 3.0, 700.0),
        ];
        let batch = Batch::from_readings(3, "pole_A", "lte_m", t, &readings).unwrap();

        assert_eq!(batch.len(), 2);
        assert!(batch.payload_bytes() > 0);
        let msg = &batch.messages[1];
        assert_eq!(msg.attribute("device_id"), Some("m_pole_A_0001"));
        assert_eq!(msg.attribute("group_id"), Some("pole_A"));
        assert_eq!(msg.attribute(ATTR_NETWORK_PROFILE), Some("lte_m"));
    }
}
