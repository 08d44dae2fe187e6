//! Cooperative sampling loop
//!
//! One thread owns the packet buffer and the packet phase (start time and
//! sample index). Each poll it decides whether a sample is due, reads the
//! sensor, and on packet completion consumes the trigger latch, hands the
//! packet to the broadcaster and commits any pending resolution change.
//!
//! ## Unobserved state
//!
//! With no observer connected nothing is sampled and the packet start is
//! dragged along with the clock, so the first packet after a connect covers
//! a full fresh duration instead of reporting the idle time as elapsed.
//!
//! ## Timing
//!
//! Sampling is best effort: a sample is taken on the first poll at or after
//! its due time. Between samples the loop sleeps for short slices, capped so
//! that disconnects and duration changes are still seen promptly.

use super::buffer::PacketBuffer;
use super::scheduler::{self, Completion};
use super::settings::SettingsNegotiator;
use super::trigger::TriggerLatch;
use crate::clock::{elapsed_since, micros_to_ms, Clock, Micros};
use crate::hardware::Sensor;
use crate::stream::broadcaster::{BroadcastOutcome, Broadcaster};
use crate::stream::packet::Packet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Remaining wait below which the loop yields instead of sleeping
const SPIN_THRESHOLD_US: u64 = 200;

/// Errors from starting or running the acquisition thread
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Failed to spawn acquisition thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Acquisition thread panicked: {0}")]
    Panicked(String),
}

/// Loop tuning
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Maximum samples per packet
    pub buffer_size: usize,
    /// Sleep between polls while nobody is connected, and the cap on any
    /// sleep while sampling
    pub idle_interval: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            buffer_size: crate::DEFAULT_BUFFER_SIZE,
            idle_interval: Duration::from_millis(2),
        }
    }
}

/// Result of one poll
#[derive(Debug)]
pub enum PollOutcome {
    /// No observer connected; packet phase reset
    Idle,
    /// Next sample not yet due
    Waiting {
        /// Microseconds until the next sample is due
        due_in_us: u64,
    },
    /// A sample was recorded, packet still assembling
    Sampled,
    /// A sample completed the packet
    Completed {
        packet: Packet,
        reason: Completion,
        broadcast: BroadcastOutcome,
    },
}

/// Sampling loop state, owned by the acquisition thread
pub struct Acquisition {
    clock: Arc<dyn Clock>,
    sensor: Box<dyn Sensor>,
    settings: Arc<SettingsNegotiator>,
    trigger: Arc<TriggerLatch>,
    broadcaster: Arc<Broadcaster>,
    buffer: PacketBuffer,
    /// Clock reading at the start of the current packet
    packet_start: Micros,
    /// Resolution fixed for the current packet
    resolution_us: u32,
    /// Overflow already reported for the current resolution
    overflow_reported: bool,
    idle_interval: Duration,
}

impl Acquisition {
    pub fn new(
        clock: Arc<dyn Clock>,
        sensor: Box<dyn Sensor>,
        settings: Arc<SettingsNegotiator>,
        trigger: Arc<TriggerLatch>,
        broadcaster: Arc<Broadcaster>,
        config: AcquisitionConfig,
    ) -> Self {
        let packet_start = clock.now_micros();
        let resolution_us = settings.commit_pending();
        Self {
            clock,
            sensor,
            settings,
            trigger,
            broadcaster,
            buffer: PacketBuffer::new(config.buffer_size),
            packet_start,
            resolution_us,
            overflow_reported: false,
            idle_interval: config.idle_interval,
        }
    }

    /// Resolution in effect for the packet being assembled
    pub fn resolution_us(&self) -> u32 {
        self.resolution_us
    }

    /// Start time of the packet being assembled
    pub fn packet_start(&self) -> Micros {
        self.packet_start
    }

    /// Samples recorded so far in the current packet
    pub fn sample_count(&self) -> usize {
        self.buffer.len()
    }

    /// Run one iteration of the loop
    pub fn poll(&mut self) -> PollOutcome {
        let now = self.clock.now_micros();

        if !self.broadcaster.has_observers() {
            self.restart(now);
            return PollOutcome::Idle;
        }

        let elapsed = elapsed_since(self.packet_start, now);
        let index = self.buffer.len();
        let duration = self.settings.packet_duration_us();

        // Checked every poll so a shortened duration ends the packet at once
        if scheduler::duration_reached(elapsed, duration) {
            if scheduler::grid_point_within(index, self.resolution_us, duration) {
                self.take_sample();
            }
            let (packet, broadcast) = self.complete(elapsed, Completion::Duration);
            return PollOutcome::Completed {
                packet,
                reason: Completion::Duration,
                broadcast,
            };
        }

        if !scheduler::should_sample(elapsed, index, self.resolution_us) {
            return PollOutcome::Waiting {
                due_in_us: scheduler::due_in(elapsed, index, self.resolution_us, duration),
            };
        }

        self.take_sample();

        let reason = scheduler::completion(
            elapsed,
            self.buffer.len(),
            duration,
            self.buffer.capacity(),
        );
        if !reason.is_complete() {
            return PollOutcome::Sampled;
        }

        let (packet, broadcast) = self.complete(elapsed, reason);
        PollOutcome::Completed {
            packet,
            reason,
            broadcast,
        }
    }

    fn take_sample(&mut self) {
        let sample = self.sensor.read_sample();
        if let Err(e) = self.buffer.append(sample) {
            // Completion fires at capacity, so this only follows a missed boundary
            tracing::warn!(error = %e, "Sample discarded");
        }
    }

    fn complete(&mut self, elapsed: u32, reason: Completion) -> (Packet, BroadcastOutcome) {
        if reason == Completion::Overflow && !self.overflow_reported {
            self.overflow_reported = true;
            tracing::warn!(
                capacity = self.buffer.capacity(),
                resolution_ms = micros_to_ms(self.resolution_us),
                duration_ms = micros_to_ms(self.settings.packet_duration_us()),
                elapsed_ms = micros_to_ms(elapsed),
                "Packet buffer filled before duration elapsed; resolution too fine for buffer"
            );
        }

        let packet = Packet {
            samples: self.buffer.as_slice().to_vec(),
            start_us: self.packet_start,
            elapsed_us: elapsed,
            trigger_us: self.trigger.consume(),
            resolution_us: self.resolution_us,
        };

        let broadcast = self.broadcaster.on_packet_complete(&packet);
        tracing::trace!(
            samples = packet.samples.len(),
            elapsed_ms = micros_to_ms(elapsed),
            delivered = broadcast.delivered,
            "Packet complete"
        );

        let now = self.clock.now_micros();
        self.restart(now);
        (packet, broadcast)
    }

    /// Begin a new packet at `now`, applying any pending resolution
    fn restart(&mut self, now: Micros) {
        self.buffer.reset();
        self.packet_start = now;
        let resolution = self.settings.commit_pending();
        if resolution != self.resolution_us {
            self.resolution_us = resolution;
            self.overflow_reported = false;
        }
    }

    /// Poll until `stop` is set
    pub fn run(mut self, stop: Arc<AtomicBool>) {
        tracing::info!(
            capacity = self.buffer.capacity(),
            resolution_ms = micros_to_ms(self.resolution_us),
            duration_ms = micros_to_ms(self.settings.packet_duration_us()),
            "Acquisition loop running"
        );

        let max_sleep_us = self.idle_interval.as_micros() as u64;

        while !stop.load(Ordering::Acquire) {
            match self.poll() {
                PollOutcome::Idle => std::thread::sleep(self.idle_interval),
                PollOutcome::Waiting { due_in_us } if due_in_us > SPIN_THRESHOLD_US => {
                    let sleep_us = (due_in_us - SPIN_THRESHOLD_US).min(max_sleep_us);
                    std::thread::sleep(Duration::from_micros(sleep_us));
                }
                PollOutcome::Waiting { .. } => std::thread::yield_now(),
                PollOutcome::Sampled | PollOutcome::Completed { .. } => {}
            }
        }

        tracing::info!("Acquisition loop stopped");
    }
}

/// Handle to the acquisition thread; stops and joins on drop
pub struct AcquisitionHandle {
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl AcquisitionHandle {
    /// Spawn the loop on a dedicated thread
    pub fn spawn(acquisition: Acquisition) -> Result<Self, AcquisitionError> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop_flag);

        let thread = std::thread::Builder::new()
            .name("acquisition".into())
            .spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    acquisition.run(flag);
                }));
                if let Err(panic_info) = result {
                    let err = AcquisitionError::Panicked(panic_message(&*panic_info));
                    tracing::error!(error = %err, "Acquisition loop terminated");
                }
            })?;

        Ok(Self {
            stop_flag,
            thread: Some(thread),
        })
    }

    /// Check if the acquisition thread is still alive
    pub fn is_alive(&self) -> bool {
        self.thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(h) = self.thread.take() {
            let _ = h.join();
        }
    }
}

impl Drop for AcquisitionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn panic_message(panic_info: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::hardware::LoggingActuator;
    use crate::stream::broadcaster::tests::MockLink;
    use crate::stream::broadcaster::ObserverId;
    use std::sync::Mutex;

    /// Sensor that records when it was read
    struct TimedSensor {
        clock: Arc<ManualClock>,
        reads: Arc<Mutex<Vec<Micros>>>,
    }

    impl Sensor for TimedSensor {
        fn read_sample(&mut self) -> u8 {
            let now = self.clock.now_micros();
            let mut reads = self.reads.lock().unwrap();
            reads.push(now);
            reads.len() as u8
        }
    }

    struct Rig {
        clock: Arc<ManualClock>,
        reads: Arc<Mutex<Vec<Micros>>>,
        settings: Arc<SettingsNegotiator>,
        trigger: Arc<TriggerLatch>,
        broadcaster: Arc<Broadcaster>,
        acquisition: Acquisition,
    }

    fn rig(start: Micros, resolution_ms: f64, duration_ms: f64, buffer_size: usize) -> Rig {
        let clock = Arc::new(ManualClock::new(start));
        let reads = Arc::new(Mutex::new(Vec::new()));
        let settings = Arc::new(SettingsNegotiator::new(resolution_ms, duration_ms));
        let trigger = Arc::new(TriggerLatch::new());
        let broadcaster = Arc::new(Broadcaster::new(Arc::new(LoggingActuator::new(255))));
        let acquisition = Acquisition::new(
            clock.clone(),
            Box::new(TimedSensor {
                clock: clock.clone(),
                reads: reads.clone(),
            }),
            settings.clone(),
            trigger.clone(),
            broadcaster.clone(),
            AcquisitionConfig {
                buffer_size,
                ..Default::default()
            },
        );
        Rig {
            clock,
            reads,
            settings,
            trigger,
            broadcaster,
            acquisition,
        }
    }

    impl Rig {
        fn observe(&self) -> (ObserverId, MockLink) {
            let link = MockLink::default();
            let id = self.broadcaster.connect(Box::new(link.clone()));
            (id, link)
        }

        /// Poll, then step the clock, until a packet completes
        fn next_packet(&mut self, step_us: u32) -> (Packet, Completion) {
            for _ in 0..1_000_000 {
                if let PollOutcome::Completed { packet, reason, .. } = self.acquisition.poll() {
                    return (packet, reason);
                }
                self.clock.advance(step_us);
            }
            panic!("no packet completed");
        }
    }

    #[test]
    fn test_idle_without_observers() {
        let mut r = rig(0, 2.0, 60.0, 4096);
        for _ in 0..100 {
            assert!(matches!(r.acquisition.poll(), PollOutcome::Idle));
            r.clock.advance(1_000);
        }
        assert!(r.reads.lock().unwrap().is_empty());
        assert_eq!(r.acquisition.packet_start(), 99_000);
    }

    #[test]
    fn test_full_packet_sample_count() {
        let mut r = rig(0, 2.0, 60.0, 4096);
        let (_, link) = r.observe();
        let (packet, reason) = r.next_packet(100);

        assert_eq!(reason, Completion::Duration);
        assert_eq!(packet.elapsed_us, 60_000);
        assert_eq!(packet.samples.len(), 31);
        assert!(packet.samples.len() <= scheduler::max_samples(60_000, 2_000, 4096));
        assert_eq!(packet.resolution_us, 2_000);

        let frames = link.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples.len(), 31);
    }

    #[test]
    fn test_samples_land_on_resolution_grid() {
        let mut r = rig(0, 2.0, 60.0, 4096);
        r.observe();
        let (packet, _) = r.next_packet(100);
        let reads = r.reads.lock().unwrap();
        assert_eq!(reads.len(), packet.samples.len());
        for (i, t) in reads.iter().enumerate() {
            assert_eq!(*t, i as u32 * 2_000);
        }
    }

    #[test]
    fn test_resolution_change_deferred_to_next_packet() {
        let mut r = rig(0, 2.0, 60.0, 4096);
        r.observe();

        // Part-way into the first packet
        for _ in 0..200 {
            r.acquisition.poll();
            r.clock.advance(100);
        }
        r.settings.request_settings(5.0, 60.0);
        assert_eq!(r.acquisition.resolution_us(), 2_000);

        let (first, _) = r.next_packet(100);
        assert_eq!(first.resolution_us, 2_000);
        assert_eq!(first.samples.len(), 31);

        let start = first.start_us;
        let reads: Vec<Micros> = r.reads.lock().unwrap().clone();
        for t in &reads {
            assert_eq!((t - start) % 2_000, 0, "mixed spacing in first packet");
        }

        let (second, _) = r.next_packet(100);
        assert_eq!(second.resolution_us, 5_000);
        assert_eq!(second.samples.len(), 13);
    }

    #[test]
    fn test_duration_change_applies_to_current_packet() {
        let mut r = rig(0, 2.0, 60.0, 4096);
        r.observe();
        for _ in 0..100 {
            r.acquisition.poll();
            r.clock.advance(100);
        }
        r.settings.request_settings(2.0, 100.0);
        let (packet, _) = r.next_packet(100);
        assert_eq!(packet.elapsed_us, 100_000);
        assert_eq!(packet.samples.len(), 51);
    }

    #[test]
    fn test_connect_after_idle_starts_fresh() {
        let mut r = rig(0, 2.0, 60.0, 4096);
        for _ in 0..5_000 {
            r.acquisition.poll();
            r.clock.advance(1_000);
        }
        r.observe();
        let (packet, _) = r.next_packet(500);
        assert!(packet.elapsed_us <= 60_000 + 500, "{}", packet.elapsed_us);
        // Start trails the connect by at most one idle poll
        assert!(5_000_000 - packet.start_us <= 1_000);
    }

    #[test]
    fn test_last_trigger_reported_once() {
        let mut r = rig(0, 2.0, 60.0, 4096);
        r.observe();
        for _ in 0..100 {
            r.acquisition.poll();
            r.clock.advance(100);
        }
        r.trigger.on_edge(10_000);
        r.trigger.on_edge(10_050);

        let (first, _) = r.next_packet(100);
        assert_eq!(first.trigger_us, Some(10_050));
        assert!(first.metadata().triggered);
        assert_eq!(first.metadata().trig_time, 10.05);

        let (second, _) = r.next_packet(100);
        assert_eq!(second.trigger_us, None);
        assert_eq!(second.metadata().trig_time, 0.0);
    }

    fn assert_within_bounds(packet: &Packet, duration_us: u32, step_us: u32) {
        let bound = duration_us as f64 / packet.resolution_us as f64 + 1.0;
        assert!(
            packet.samples.len() as f64 <= bound,
            "{} samples > {}",
            packet.samples.len(),
            bound
        );
        assert!(
            packet.elapsed_us <= duration_us + step_us,
            "elapsed {} past {}",
            packet.elapsed_us,
            duration_us
        );
    }

    #[test]
    fn test_uneven_grid_stops_at_duration() {
        let mut r = rig(0, 3.0, 40.0, 4096);
        r.observe();
        for _ in 0..3 {
            let (packet, reason) = r.next_packet(10);
            assert_eq!(reason, Completion::Duration);
            assert_within_bounds(&packet, 40_000, 10);
            // Grid points 0, 3, .., 39 ms
            assert_eq!(packet.samples.len(), 14);
            assert_eq!(packet.elapsed_us, 40_000);
        }
    }

    #[test]
    fn test_uneven_grid_seven_ms() {
        let mut r = rig(0, 7.0, 50.0, 4096);
        r.observe();
        for _ in 0..3 {
            let (packet, _) = r.next_packet(10);
            assert_within_bounds(&packet, 50_000, 10);
            assert_eq!(packet.samples.len(), 8);
        }
        let reads = r.reads.lock().unwrap();
        assert!(reads.iter().all(|t| t % 50_000 % 7_000 == 0));
    }

    #[test]
    fn test_duration_cut_below_elapsed_ends_packet() {
        let mut r = rig(0, 10.0, 1_000.0, 4096);
        r.observe();
        for _ in 0..5_000 {
            r.acquisition.poll();
            r.clock.advance(100);
        }
        assert_eq!(r.acquisition.sample_count(), 50);

        r.settings.request_settings(10.0, 200.0);
        match r.acquisition.poll() {
            PollOutcome::Completed { packet, reason, .. } => {
                assert_eq!(reason, Completion::Duration);
                assert_eq!(packet.elapsed_us, 500_000);
                assert_eq!(packet.samples.len(), 50);
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_waiting_capped_by_duration() {
        let mut r = rig(0, 3.0, 40.0, 4096);
        r.observe();
        for _ in 0..3_950 {
            r.acquisition.poll();
            r.clock.advance(10);
        }
        // 39.5 ms in: next grid point is 42 ms, packet ends at 40 ms
        match r.acquisition.poll() {
            PollOutcome::Waiting { due_in_us } => assert_eq!(due_in_us, 500),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_overflow_forces_completion() {
        let mut r = rig(0, 0.1, 30.0, 10);
        r.observe();
        let (packet, reason) = r.next_packet(100);
        assert_eq!(reason, Completion::Overflow);
        assert_eq!(packet.samples.len(), 10);
        assert!(packet.elapsed_us < 30_000);

        // Keeps going afterwards
        let (again, _) = r.next_packet(100);
        assert_eq!(again.samples.len(), 10);
    }

    #[test]
    fn test_packet_across_clock_wrap() {
        let start = u32::MAX - 30_000;
        let mut r = rig(start, 2.0, 60.0, 4096);
        r.observe();
        let (packet, reason) = r.next_packet(100);
        assert_eq!(reason, Completion::Duration);
        assert_eq!(packet.start_us, start);
        assert_eq!(packet.elapsed_us, 60_000);
        assert_eq!(packet.samples.len(), 31);
    }

    #[test]
    fn test_last_observer_leaving_stops_sampling() {
        let mut r = rig(0, 2.0, 60.0, 4096);
        let (id, _) = r.observe();
        for _ in 0..100 {
            r.acquisition.poll();
            r.clock.advance(100);
        }
        assert!(r.acquisition.sample_count() > 0);
        let reads_before = r.reads.lock().unwrap().len();

        r.broadcaster.disconnect(id);
        assert!(matches!(r.acquisition.poll(), PollOutcome::Idle));
        assert_eq!(r.acquisition.sample_count(), 0);
        r.clock.advance(100_000);
        r.acquisition.poll();
        assert_eq!(r.reads.lock().unwrap().len(), reads_before);
    }

    #[test]
    fn test_waiting_reports_time_to_next_sample() {
        let mut r = rig(0, 2.0, 60.0, 4096);
        r.observe();
        assert!(matches!(r.acquisition.poll(), PollOutcome::Sampled));
        r.clock.advance(500);
        match r.acquisition.poll() {
            PollOutcome::Waiting { due_in_us } => assert_eq!(due_in_us, 1_500),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_spawned_loop_stops() {
        let r = rig(0, 2.0, 60.0, 4096);
        let mut handle = AcquisitionHandle::spawn(r.acquisition).unwrap();
        assert!(handle.is_alive());
        handle.stop();
        assert!(!handle.is_alive());
    }
}
