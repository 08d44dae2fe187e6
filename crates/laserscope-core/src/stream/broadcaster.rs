//! Observer registry and packet fan-out
//!
//! The transport registers one [`ObserverLink`] per connected observer. On
//! every completed packet the acquisition loop asks the broadcaster to fan
//! the encoded frame out: defunct links are pruned first, each remaining
//! link gets a non-blocking delivery attempt, and backpressured links simply
//! miss the packet. Nothing is queued here and nothing is retried.
//!
//! The observer count is mirrored in an atomic so the loop can check for
//! "nobody listening" on every poll without taking the registry lock.

use super::packet::{Packet, PacketFrame};
use crate::hardware::Actuator;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Identifier assigned to an observer on connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of a single non-blocking delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Frame accepted for sending
    Sent,
    /// Observer cannot accept a write right now
    Full,
    /// Observer's connection is gone
    Closed,
}

/// Transport-side handle for one observer
pub trait ObserverLink: Send {
    /// Queue both messages of `frame` without blocking
    fn try_deliver(&self, frame: &Arc<PacketFrame>) -> Delivery;

    /// True once the connection is defunct and will never accept writes again
    fn is_closed(&self) -> bool;
}

/// What happened to one completed packet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Observers that received the packet
    pub delivered: usize,
    /// Observers that were backpressured and missed it
    pub skipped: usize,
    /// Defunct observers removed before or during the send
    pub pruned: usize,
}

impl BroadcastOutcome {
    /// True when no observer received the packet
    pub fn dropped(&self) -> bool {
        self.delivered == 0
    }
}

struct Observer {
    id: ObserverId,
    link: Box<dyn ObserverLink>,
}

/// Fans completed packets out to observers and applies inbound control bytes
pub struct Broadcaster {
    observers: Mutex<Vec<Observer>>,
    observer_count: AtomicUsize,
    next_id: AtomicU64,
    actuator: Arc<dyn Actuator>,
    packets_delivered: AtomicU64,
    packets_dropped: AtomicU64,
}

impl Broadcaster {
    pub fn new(actuator: Arc<dyn Actuator>) -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            observer_count: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            actuator,
            packets_delivered: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
        }
    }

    /// Registry access; a panic while holding the lock leaves a valid Vec
    fn observers(&self) -> MutexGuard<'_, Vec<Observer>> {
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sync_count(&self, observers: &[Observer]) {
        self.observer_count.store(observers.len(), Ordering::Release);
    }

    /// Register a newly connected observer
    pub fn connect(&self, link: Box<dyn ObserverLink>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut observers = self.observers();
        observers.push(Observer { id, link });
        self.sync_count(&observers);
        tracing::info!(observer = %id, count = observers.len(), "Observer connected");
        id
    }

    /// Remove an observer. Returns false if it was already gone (e.g. pruned).
    pub fn disconnect(&self, id: ObserverId) -> bool {
        let mut observers = self.observers();
        let before = observers.len();
        observers.retain(|o| o.id != id);
        self.sync_count(&observers);
        let removed = observers.len() != before;
        if removed {
            tracing::info!(observer = %id, count = observers.len(), "Observer disconnected");
        }
        removed
    }

    /// Number of connected observers (lock-free)
    pub fn observer_count(&self) -> usize {
        self.observer_count.load(Ordering::Acquire)
    }

    pub fn has_observers(&self) -> bool {
        self.observer_count() > 0
    }

    /// Send a completed packet to every observer able to take it
    pub fn on_packet_complete(&self, packet: &Packet) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();

        let frame = match PacketFrame::encode(packet) {
            Ok(frame) => Arc::new(frame),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode packet metadata");
                self.packets_dropped.fetch_add(1, Ordering::Relaxed);
                return outcome;
            }
        };

        let mut observers = self.observers();

        // Release improperly closed connections first
        let before = observers.len();
        observers.retain(|o| !o.link.is_closed());
        outcome.pruned = before - observers.len();

        observers.retain(|o| match o.link.try_deliver(&frame) {
            Delivery::Sent => {
                outcome.delivered += 1;
                true
            }
            Delivery::Full => {
                outcome.skipped += 1;
                tracing::debug!(observer = %o.id, "Observer backpressured, packet skipped");
                true
            }
            Delivery::Closed => {
                outcome.pruned += 1;
                false
            }
        });

        self.sync_count(&observers);
        drop(observers);

        if outcome.pruned > 0 {
            tracing::info!(pruned = outcome.pruned, "Pruned defunct observers");
        }

        if outcome.dropped() {
            self.packets_dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(samples = packet.samples.len(), "No observer accepted packet, dropped");
        } else {
            self.packets_delivered.fetch_add(1, Ordering::Relaxed);
        }

        outcome
    }

    /// Handle a binary payload from an observer
    ///
    /// Exactly one byte is an actuator value; anything else is discarded
    /// without telling the sender. Returns true if the value was applied.
    pub fn on_inbound(&self, id: ObserverId, payload: &[u8]) -> bool {
        match payload {
            [value] => {
                self.actuator.write(*value);
                true
            }
            _ => {
                tracing::trace!(observer = %id, len = payload.len(), "Ignoring inbound payload");
                false
            }
        }
    }

    /// Packets that reached at least one observer
    pub fn packets_delivered(&self) -> u64 {
        self.packets_delivered.load(Ordering::Relaxed)
    }

    /// Packets that reached no observer
    pub fn packets_dropped(&self) -> u64 {
        self.packets_dropped.load(Ordering::Relaxed)
    }
}
