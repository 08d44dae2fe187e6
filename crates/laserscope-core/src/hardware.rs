//! Hardware boundary: analog input, analog output and digital output pins
//!
//! The acquisition loop only sees these traits. The simulated implementations
//! stand in for the ADC, DAC and lock pins when no board is attached; they
//! behave like the real peripherals at the boundary (one byte per read,
//! fire-and-forget writes).

use crate::acquisition::trigger::TriggerLatch;
use crate::clock::{Clock, Micros};
use crate::outputs::OutputChannel;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// ADC full scale is 12 bits; samples are reduced to one byte
const ADC_TO_BYTE_SHIFT: u32 = 4;

/// Analog input read once per scheduled sample
pub trait Sensor: Send {
    /// Read one sample, scaled to a byte. Must be cheap and non-blocking.
    fn read_sample(&mut self) -> u8;
}

/// Analog output driven by observers
pub trait Actuator: Send + Sync {
    /// Apply an output value. Fire-and-forget.
    fn write(&self, value: u8);
}

/// Digital output pin driver for the two named channels
pub trait OutputPin: Send + Sync {
    fn set(&self, channel: OutputChannel, high: bool);
}

/// Reduce a raw 12-bit ADC reading to one byte
#[inline]
pub fn adc_to_byte(raw: u16) -> u8 {
    (raw.min(0x0FFF) >> ADC_TO_BYTE_SHIFT) as u8
}

/// Simulated photodiode signal: a piezo scan ramp with an absorption dip
///
/// Produces a triangle sweep with a Lorentzian dip at the centre of each
/// up-sweep, which is what the scope shows while scanning a laser across a
/// spectroscopy line.
pub struct SimulatedSensor {
    clock: Arc<dyn Clock>,
    /// Full scan period (up + down) in microseconds
    scan_period_us: u32,
    /// Dip half-width as a fraction of the half period
    dip_width: f64,
}

impl SimulatedSensor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            scan_period_us: 40_000,
            dip_width: 0.03,
        }
    }

    /// Set the scan period (clamped to at least 1ms)
    pub fn with_scan_period_us(mut self, period: u32) -> Self {
        self.scan_period_us = period.max(1_000);
        self
    }

    /// Raw 12-bit value at a given time
    fn raw_at(&self, t: Micros) -> u16 {
        let phase = (t % self.scan_period_us) as f64 / self.scan_period_us as f64;
        // Triangle 0..1..0
        let ramp = if phase < 0.5 { phase * 2.0 } else { 2.0 - phase * 2.0 };
        let offset = (phase - 0.25) / (0.5 * self.dip_width);
        let dip = 0.6 / (1.0 + offset * offset);
        let level = (0.2 + 0.7 * ramp) * (1.0 - dip);
        (level.clamp(0.0, 1.0) * 4095.0) as u16
    }
}

impl Sensor for SimulatedSensor {
    fn read_sample(&mut self) -> u8 {
        adc_to_byte(self.raw_at(self.clock.now_micros()))
    }
}

/// Actuator that records the last written value and logs it
#[derive(Debug)]
pub struct LoggingActuator {
    last: AtomicU8,
}

impl LoggingActuator {
    pub fn new(initial: u8) -> Self {
        tracing::info!(value = initial, "Actuator initialised");
        Self {
            last: AtomicU8::new(initial),
        }
    }

    /// Last value applied
    pub fn last(&self) -> u8 {
        self.last.load(Ordering::Relaxed)
    }
}

impl Actuator for LoggingActuator {
    fn write(&self, value: u8) {
        self.last.store(value, Ordering::Relaxed);
        tracing::debug!(value, "Actuator write");
    }
}

/// Output pins that only log state changes
#[derive(Debug, Default)]
pub struct LoggingOutputPins;

impl OutputPin for LoggingOutputPins {
    fn set(&self, channel: OutputChannel, high: bool) {
        tracing::info!(channel = %channel, high, "Output pin set");
    }
}

/// Handle to a simulated trigger line firing at a fixed period
pub struct TriggerSourceHandle {
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl TriggerSourceHandle {
    /// Stop the trigger thread and wait for it to finish
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(h) = self.thread.take() {
            let _ = h.join();
        }
    }
}

impl Drop for TriggerSourceHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn a thread that raises a rising edge on `latch` every `period`
///
/// The thread does nothing but capture a timestamp into the latch, mirroring
/// what an edge interrupt handler is allowed to do.
pub fn spawn_periodic_trigger(
    latch: Arc<TriggerLatch>,
    clock: Arc<dyn Clock>,
    period: Duration,
) -> std::io::Result<TriggerSourceHandle> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop_flag);

    let thread = std::thread::Builder::new()
        .name("trigger-source".into())
        .spawn(move || {
            tracing::info!(period_ms = period.as_millis() as u64, "Simulated trigger running");
            while !flag.load(Ordering::Acquire) {
                std::thread::sleep(period);
                latch.on_edge(clock.now_micros());
            }
        })?;

    Ok(TriggerSourceHandle {
        stop_flag,
        thread: Some(thread),
    })
}
