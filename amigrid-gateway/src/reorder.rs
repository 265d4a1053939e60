// AMIGrid Gateway - Per-pole batching relay
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! In-flight buffer ordered by arrival time
//!
//! Delivered readings are held until their arrival time
//! (`event_time + delay`) has passed, then released in arrival order. A
//! reading delayed longer than its successors therefore comes out after
//! them, which is how out-of-order delivery becomes observable.

use amigrid::{DeliveryEvent, TelemetryReading};
use chrono::{DateTime, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

#[derive(Debug)]
struct InFlight {
    arrival: DateTime<Utc>,
    order: u64,
    reading: TelemetryReading,
}

impl PartialEq for InFlight {
    fn eq(&self, other: &Self) -> bool {
        self.arrival == other.arrival && self.order == other.order
    }
}

impl Eq for InFlight {}

impl PartialOrd for InFlight {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InFlight {
    fn cmp(&self, other: &Self) -> Ordering {
        self.arrival
            .cmp(&other.arrival)
            .then(self.order.cmp(&other.order))
    }
}

/// A released reading and the time it reached the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct Arrival {
    pub arrived_at: DateTime<Utc>,
    pub reading: TelemetryReading,
}

/// Bounded min-heap of in-flight readings keyed by arrival time
#[derive(Debug)]
pub struct ReorderBuffer {
    heap: BinaryHeap<Reverse<InFlight>>,
    capacity: usize,
    next_order: u64,
}

impl ReorderBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity.min(4096)),
            capacity: capacity.max(1),
            next_order: 0,
        }
    }

    /// Hold a delivered event. Returns the earliest arrival when the
    /// buffer is over capacity.
    pub fn push(&mut self, event: DeliveryEvent) -> Option<Arrival> {
        let arrival = event.arrival_time().unwrap_or(event.reading.event_time);
        self.heap.push(Reverse(InFlight {
            arrival,
            order: self.next_order,
            reading: event.reading,
        }));
        self.next_order += 1;

        if self.heap.len() > self.capacity {
            self.pop()
        } else {
            None
        }
    }

    /// Release every reading that has arrived by `now`, in arrival order
    pub fn release_due(&mut self, now: DateTime<Utc>) -> Vec<Arrival> {
        let mut out = Vec::new();
        while let Some(Reverse(head)) = self.heap.peek() {
            if head.arrival > now {
                break;
            }
            if let Some(arrival) = self.pop() {
                out.push(arrival);
            }
        }
        out
    }

    /// Release everything regardless of arrival time
    pub fn drain(&mut self) -> Vec<Arrival> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(arrival) = self.pop() {
            out.push(arrival);
        }
        out
    }

    /// Earliest pending arrival
    pub fn next_arrival(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|Reverse(head)| head.arrival)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn pop(&mut self) -> Option<Arrival> {
        self.heap.pop().map(|Reverse(item)| Arrival {
            arrived_at: item.arrival,
            reading: item.reading,
        })
    }
}
