//! Completed packets and the metadata message that precedes them

use crate::clock::{micros_to_ms, Micros};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One completed batch of time-ordered samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Samples in time order, one byte each
    pub samples: Vec<u8>,
    /// Clock reading when the packet started
    pub start_us: Micros,
    /// Time from packet start to the final sample
    pub elapsed_us: u32,
    /// Latest trigger edge seen while this packet assembled
    pub trigger_us: Option<Micros>,
    /// Sample spacing used for every sample in this packet
    pub resolution_us: u32,
}

impl Packet {
    pub fn metadata(&self) -> PacketMetadata {
        PacketMetadata {
            start: micros_to_ms(self.start_us),
            elapsed: micros_to_ms(self.elapsed_us),
            trig_time: self.trigger_us.map(micros_to_ms).unwrap_or(0.0),
            triggered: self.trigger_us.is_some(),
        }
    }
}

/// Metadata message sent before each packet's samples (all times in ms)
///
/// `trigTime` is 0 when no trigger occurred, matching existing clients;
/// `triggered` tells that case apart from a trigger at time zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PacketMetadata {
    pub start: f64,
    pub elapsed: f64,
    #[serde(rename = "trigTime")]
    pub trig_time: f64,
    #[serde(default)]
    pub triggered: bool,
}

/// Encoded message pair for one packet, shared by every observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketFrame {
    /// JSON text of [`PacketMetadata`]
    pub metadata: String,
    /// Raw sample bytes
    pub samples: Arc<[u8]>,
}

impl PacketFrame {
    pub fn encode(packet: &Packet) -> serde_json::Result<Self> {
        Ok(Self {
            metadata: serde_json::to_string(&packet.metadata())?,
            samples: Arc::from(packet.samples.as_slice()),
        })
    }
}
