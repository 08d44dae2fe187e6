//! Fixed-capacity packet sample storage

use thiserror::Error;

/// Returned when appending to a full buffer
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Packet buffer full ({capacity} samples)")]
pub struct BufferFull {
    pub capacity: usize,
}

/// Single-byte samples of the packet being assembled
///
/// Allocated once; `reset` keeps the allocation.
#[derive(Debug)]
pub struct PacketBuffer {
    samples: Vec<u8>,
    capacity: usize,
}

impl PacketBuffer {
    /// Create a buffer holding at most `capacity` samples (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, sample: u8) -> Result<(), BufferFull> {
        if self.samples.len() >= self.capacity {
            return Err(BufferFull {
                capacity: self.capacity,
            });
        }
        self.samples.push(sample);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
