//! Two named boolean output channels
//!
//! The pins are configured as outputs and cannot be read back reliably, so
//! the last commanded state is tracked here and reported by status queries.

use crate::hardware::OutputPin;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Output channel identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputChannel {
    /// Slow lock loop
    Slow,
    /// Fast lock loop
    Fast,
}

impl OutputChannel {
    pub const ALL: [OutputChannel; 2] = [OutputChannel::Slow, OutputChannel::Fast];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputChannel::Slow => "slow",
            OutputChannel::Fast => "fast",
        }
    }
}

impl fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commanded state of both output channels
pub struct OutputControls {
    pins: Arc<dyn OutputPin>,
    slow: AtomicBool,
    fast: AtomicBool,
}

impl OutputControls {
    /// Create controls and drive both pins low
    pub fn new(pins: Arc<dyn OutputPin>) -> Self {
        for channel in OutputChannel::ALL {
            pins.set(channel, false);
        }
        Self {
            pins,
            slow: AtomicBool::new(false),
            fast: AtomicBool::new(false),
        }
    }

    fn flag(&self, channel: OutputChannel) -> &AtomicBool {
        match channel {
            OutputChannel::Slow => &self.slow,
            OutputChannel::Fast => &self.fast,
        }
    }

    pub fn enable(&self, channel: OutputChannel) {
        self.set(channel, true);
    }

    pub fn disable(&self, channel: OutputChannel) {
        self.set(channel, false);
    }

    fn set(&self, channel: OutputChannel, high: bool) {
        self.pins.set(channel, high);
        self.flag(channel).store(high, Ordering::Release);
    }

    pub fn is_enabled(&self, channel: OutputChannel) -> bool {
        self.flag(channel).load(Ordering::Acquire)
    }
}
