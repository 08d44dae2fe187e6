//! Sampling settings negotiation with deferred resolution changes
//!
//! Observers request a resolution and a packet duration in milliseconds.
//! The request is validated and stored immediately, but only the duration is
//! visible to the packet being assembled. The new resolution sits in a
//! pending slot until the acquisition loop commits it at the next packet
//! boundary, so a packet never mixes two sample spacings.
//!
//! Every field is its own atomic. The loop reads the duration once per poll
//! and tolerates seeing it mid-update; the pending -> active copy is the only
//! step that must be a single read.

use crate::clock::micros_to_ms;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};

/// Finest allowed sample spacing (0.1ms)
pub const MIN_RESOLUTION_US: u32 = 100;

/// Coarsest allowed sample spacing, so two samples still fit in the longest packet
pub const MAX_RESOLUTION_US: u32 = MAX_DURATION_US / 2;

/// Shortest packet (30ms)
pub const MIN_DURATION_US: u32 = 30_000;

/// Longest packet (20s); longer packets starve the network stack
pub const MAX_DURATION_US: u32 = 20_000_000;

/// Full settings state in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSettings {
    /// Spacing used by the packet currently assembling
    pub active_resolution_us: u32,
    /// Spacing that becomes active at the next packet boundary
    pub pending_resolution_us: u32,
    /// Packet duration, effective immediately
    pub packet_duration_us: u32,
}

/// Settings as reported to observers, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SettingsSnapshot {
    pub resolution: f64,
    pub duration: f64,
}

/// Validate a requested resolution (ms) into microseconds
///
/// NaN and values below the floor map to the floor.
pub fn clamp_resolution_us(resolution_ms: f64) -> u32 {
    let us = resolution_ms * 1000.0;
    if us.is_nan() {
        return MIN_RESOLUTION_US;
    }
    us.clamp(MIN_RESOLUTION_US as f64, MAX_RESOLUTION_US as f64) as u32
}

/// Validate a requested duration (ms) into microseconds
///
/// The duration is raised to at least two sample spacings, then clamped to
/// the hard packet limits.
pub fn clamp_duration_us(duration_ms: f64, resolution_us: u32) -> u32 {
    let mut us = duration_ms * 1000.0;
    if us.is_nan() {
        us = 0.0;
    }
    let floor = 2.0 * resolution_us as f64;
    us.max(floor)
        .clamp(MIN_DURATION_US as f64, MAX_DURATION_US as f64) as u32
}

/// Active/pending sampling settings shared between the loop and request handlers
#[derive(Debug)]
pub struct SettingsNegotiator {
    active_resolution_us: AtomicU32,
    pending_resolution_us: AtomicU32,
    packet_duration_us: AtomicU32,
}

impl SettingsNegotiator {
    /// Create with initial settings, active immediately
    pub fn new(resolution_ms: f64, duration_ms: f64) -> Self {
        let resolution = clamp_resolution_us(resolution_ms);
        let duration = clamp_duration_us(duration_ms, resolution);
        tracing::info!(
            resolution_ms = micros_to_ms(resolution),
            duration_ms = micros_to_ms(duration),
            "Initial sampling settings"
        );
        Self {
            active_resolution_us: AtomicU32::new(resolution),
            pending_resolution_us: AtomicU32::new(resolution),
            packet_duration_us: AtomicU32::new(duration),
        }
    }

    /// Accept a settings request from an observer
    ///
    /// Returns immediately. The duration applies to the packet being
    /// assembled; the resolution waits for [`commit_pending`](Self::commit_pending).
    pub fn request_settings(&self, resolution_ms: f64, duration_ms: f64) -> SampleSettings {
        let resolution = clamp_resolution_us(resolution_ms);
        let duration = clamp_duration_us(duration_ms, resolution);

        self.pending_resolution_us.store(resolution, Ordering::Release);
        self.packet_duration_us.store(duration, Ordering::Release);

        tracing::info!(
            requested_resolution_ms = resolution_ms,
            requested_duration_ms = duration_ms,
            resolution_ms = micros_to_ms(resolution),
            duration_ms = micros_to_ms(duration),
            "Sampling settings set"
        );

        self.settings()
    }

    /// Promote the pending resolution. Called by the loop at a packet boundary.
    pub fn commit_pending(&self) -> u32 {
        let pending = self.pending_resolution_us.load(Ordering::Acquire);
        let previous = self.active_resolution_us.swap(pending, Ordering::AcqRel);
        if previous != pending {
            tracing::debug!(
                from_ms = micros_to_ms(previous),
                to_ms = micros_to_ms(pending),
                "Resolution change applied at packet boundary"
            );
        }
        pending
    }

    pub fn active_resolution_us(&self) -> u32 {
        self.active_resolution_us.load(Ordering::Acquire)
    }

    pub fn pending_resolution_us(&self) -> u32 {
        self.pending_resolution_us.load(Ordering::Acquire)
    }

    pub fn packet_duration_us(&self) -> u32 {
        self.packet_duration_us.load(Ordering::Acquire)
    }

    pub fn settings(&self) -> SampleSettings {
        SampleSettings {
            active_resolution_us: self.active_resolution_us(),
            pending_resolution_us: self.pending_resolution_us(),
            packet_duration_us: self.packet_duration_us(),
        }
    }

    /// Active resolution and current duration in milliseconds
    pub fn current(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            resolution: micros_to_ms(self.active_resolution_us()),
            duration: micros_to_ms(self.packet_duration_us()),
        }
    }
}

impl Default for SettingsNegotiator {
    fn default() -> Self {
        Self::new(crate::DEFAULT_RESOLUTION_MS, crate::DEFAULT_DURATION_MS)
    }
}
