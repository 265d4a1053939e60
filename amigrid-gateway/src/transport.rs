// AMIGrid Gateway - Per-pole batching relay
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Downstream transport seam
//!
//! The durable message service behind the relay is an external
//! collaborator; the relay only needs something that accepts a batch or
//! reports a transient failure.

use crate::batch::Batch;
use crate::error::{GatewayError, Result};

/// Accepts published batches
pub trait Transport {
    /// Publish one batch. An `Err` is treated as transient and retried.
    fn publish(&mut self, batch: &Batch) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn publish(&mut self, batch: &Batch) -> Result<()> {
        (**self).publish(batch)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn publish(&mut self, batch: &Batch) -> Result<()> {
        (**self).publish(batch)
    }
}

/// In-memory transport with scripted failures
#[derive(Debug, Default)]
pub struct MemoryTransport {
    batches: Vec<Batch>,
    fail_next: u32,
    fail_always: bool,
    attempts: u64,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` publish calls
    pub fn fail_next(&mut self, n: u32) {
        self.fail_next = n;
    }

    /// Fail every publish call until reset
    pub fn set_fail_always(&mut self, fail: bool) {
        self.fail_always = fail;
    }

    /// Batches accepted so far
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Remove and return accepted batches
    pub fn take_batches(&mut self) -> Vec<Batch> {
        std::mem::take(&mut self.batches)
    }

    /// Messages accepted so far
    pub fn message_count(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }

    /// Publish calls made, successful or not
    pub fn attempts(&self) -> u64 {
        self.attempts
    }
}

impl Transport for MemoryTransport {
    fn publish(&mut self, batch: &Batch) -> Result<()> {
        self.attempts += 1;
        if self.fail_always {
            return Err(GatewayError::Transport("transport unavailable".to_string()));
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(GatewayError::Transport("transient publish failure".to_string()));
        }
        self.batches.push(batch.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn empty_batch(id: u64) -> Batch {
        Batch::from_readings(id, "pole_A", "wired", Utc::now(), &[]).unwrap()
    }

    #[test]
    fn test_scripted_failures() {
        let mut transport = MemoryTransport::new();
        transport.fail_next(2);
        assert!(transport.publish(&empty_batch(1)).is_err());
        assert!(transport.publish(&empty_batch(1)).is_err());
        assert!(transport.publish(&empty_batch(1)).is_ok());
        assert_eq!(transport.batches().len(), 1);
        assert_eq!(transport.attempts(), 3);
    }

    #[test]
    fn test_fail_always() {
        let mut transport = MemoryTransport::new();
        transport.set_fail_always(true);
        for _ in 0..5 {
            assert!(matches!(
                transport.publish(&empty_batch(1)),
                Err(GatewayError::Transport(_))
            ));
        }
        assert!(transport.take_batches().is_empty());
    }

    #[test]
    fn test_boxed_transport() {
        let mut boxed: Box<dyn Transport> = Box::new(MemoryTransport::new());
        assert!(boxed.publish(&empty_batch(2)).is_ok());
    }
}
