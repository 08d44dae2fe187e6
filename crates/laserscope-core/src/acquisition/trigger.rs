//! Trigger edge latch
//!
//! Holds the timestamp of the most recent unconsumed trigger edge in a single
//! atomic word so that the edge context can write it without coordinating
//! with the acquisition loop. Bit 32 marks "latched", the low 32 bits hold
//! the timestamp, which keeps a trigger at time zero distinct from no trigger.

use crate::clock::Micros;
use std::sync::atomic::{AtomicU64, Ordering};

const LATCHED: u64 = 1 << 32;

/// Last-trigger-wins latch, written from the edge context
///
/// # Example
/// ```
/// use laserscope_core::TriggerLatch;
///
/// let latch = TriggerLatch::new();
/// latch.on_edge(100);
/// latch.on_edge(250);
/// assert_eq!(latch.consume(), Some(250));
/// assert_eq!(latch.consume(), None);
/// ```
#[derive(Debug, Default)]
pub struct TriggerLatch {
    slot: AtomicU64,
}

impl TriggerLatch {
    pub fn new() -> Self {
        Self {
            slot: AtomicU64::new(0),
        }
    }

    /// Record an edge. Overwrites any unconsumed edge; never blocks.
    #[inline]
    pub fn on_edge(&self, timestamp: Micros) {
        self.slot.store(LATCHED | timestamp as u64, Ordering::Release);
    }

    /// Take the latched timestamp, leaving the latch empty
    pub fn consume(&self) -> Option<Micros> {
        decode(self.slot.swap(0, Ordering::AcqRel))
    }

    /// Read the latched timestamp without clearing it
    pub fn peek(&self) -> Option<Micros> {
        decode(self.slot.load(Ordering::Acquire))
    }
}

fn decode(word: u64) -> Option<Micros> {
    if word & LATCHED != 0 {
        Some(word as u32)
    } else {
        None
    }
}
