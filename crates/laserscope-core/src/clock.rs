//! Monotonic microsecond time source
//!
//! Timestamps are 32-bit microsecond counters that wrap roughly every 71
//! minutes. Differences must always be taken with [`elapsed_since`] so that a
//! packet spanning the wrap point still reports a small positive elapsed time.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// Microsecond timestamp, wrapping at 2^32
pub type Micros = u32;

/// Source of monotonic microsecond timestamps
pub trait Clock: Send + Sync {
    /// Current time in microseconds (wrapping)
    fn now_micros(&self) -> Micros;
}

/// Elapsed time from `start` to `now`, correct across one wrap of the counter
#[inline]
pub fn elapsed_since(start: Micros, now: Micros) -> u32 {
    now.wrapping_sub(start)
}

/// Convert microseconds to fractional milliseconds for reporting
#[inline]
pub fn micros_to_ms(us: u32) -> f64 {
    us as f64 / 1000.0
}

/// Clock backed by [`std::time::Instant`], counting from construction
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_micros(&self) -> Micros {
        // Truncation is the wrap
        self.origin.elapsed().as_micros() as u64 as u32
    }
}

/// Manually advanced clock for deterministic tests and replay
///
/// # Example
/// ```
/// use laserscope_core::clock::{Clock, ManualClock};
///
/// let clock = ManualClock::new(u32::MAX - 10);
/// clock.advance(20);
/// assert_eq!(clock.now_micros(), 9);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU32,
}

impl ManualClock {
    pub fn new(start: Micros) -> Self {
        Self {
            now: AtomicU32::new(start),
        }
    }

    /// Move the clock forward by `us` microseconds (wrapping)
    pub fn advance(&self, us: u32) {
        self.now.fetch_add(us, Ordering::AcqRel);
    }

    pub fn set(&self, us: Micros) {
        self.now.store(us, Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> Micros {
        self.now.load(Ordering::Acquire)
    }
}
