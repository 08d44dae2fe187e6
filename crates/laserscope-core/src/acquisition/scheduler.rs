//! Sample and packet-completion scheduling
//!
//! Sampling is time-driven: sample `n` of a packet is due once
//! `n * resolution` microseconds have elapsed since the packet started.
//! Both predicates are pure so the loop's timing decisions can be tested
//! without a clock.

/// Why a packet is finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Still assembling
    Pending,
    /// Packet duration reached
    Duration,
    /// Buffer filled before the duration elapsed (resolution too fine)
    Overflow,
}

impl Completion {
    pub fn is_complete(self) -> bool {
        self != Completion::Pending
    }
}

/// True when sample `sample_index` is due
#[inline]
pub fn should_sample(elapsed_us: u32, sample_index: usize, resolution_us: u32) -> bool {
    elapsed_us as u64 >= sample_index as u64 * resolution_us as u64
}

/// True once the packet has run for its full duration
#[inline]
pub fn duration_reached(elapsed_us: u32, packet_duration_us: u32) -> bool {
    elapsed_us >= packet_duration_us
}

/// True when the grid point of `sample_index` lies inside the packet duration
#[inline]
pub fn grid_point_within(sample_index: usize, resolution_us: u32, packet_duration_us: u32) -> bool {
    sample_index as u64 * resolution_us as u64 <= packet_duration_us as u64
}

/// Microseconds until the next sample or the end of the packet, whichever is first
pub fn due_in(
    elapsed_us: u32,
    sample_index: usize,
    resolution_us: u32,
    packet_duration_us: u32,
) -> u64 {
    let next = (sample_index as u64 * resolution_us as u64).min(packet_duration_us as u64);
    next.saturating_sub(elapsed_us as u64)
}

/// Completion state after `sample_count` samples at `elapsed_us`
///
/// Duration wins over overflow when both hold.
#[inline]
pub fn completion(
    elapsed_us: u32,
    sample_count: usize,
    packet_duration_us: u32,
    capacity: usize,
) -> Completion {
    if elapsed_us >= packet_duration_us {
        Completion::Duration
    } else if sample_count >= capacity {
        Completion::Overflow
    } else {
        Completion::Pending
    }
}

/// Upper bound on samples in a packet for given settings
pub fn max_samples(packet_duration_us: u32, resolution_us: u32, capacity: usize) -> usize {
    let by_time = packet_duration_us / resolution_us.max(1) + 1;
    (by_time as usize).min(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_is_immediate() {
        assert!(should_sample(0, 0, 2_000));
    }

    #[test]
    fn test_sample_due_on_grid() {
        assert!(!should_sample(3_999, 2, 2_000));
        assert!(should_sample(4_000, 2, 2_000));
        assert!(should_sample(4_500, 2, 2_000));
    }

    #[test]
    fn test_large_index_does_not_overflow() {
        // 4096 * 10s would overflow u32
        assert!(!should_sample(u32::MAX, 4096, 10_000_000));
    }

    #[test]
    fn test_completion_by_duration() {
        assert_eq!(completion(59_999, 30, 60_000, 4096), Completion::Pending);
        assert_eq!(completion(60_000, 31, 60_000, 4096), Completion::Duration);
    }

    #[test]
    fn test_completion_by_overflow() {
        assert_eq!(completion(1_000, 4096, 60_000, 4096), Completion::Overflow);
        assert!(Completion::Overflow.is_complete());
    }

    #[test]
    fn test_duration_takes_precedence() {
        assert_eq!(completion(60_000, 4096, 60_000, 4096), Completion::Duration);
    }

    #[test]
    fn test_duration_reached() {
        assert!(!duration_reached(39_999, 40_000));
        assert!(duration_reached(40_000, 40_000));
        assert!(duration_reached(42_000, 40_000));
    }

    #[test]
    fn test_grid_point_within_duration() {
        // 3 ms grid in a 40 ms packet: 39 ms is the last point
        assert!(grid_point_within(13, 3_000, 40_000));
        assert!(!grid_point_within(14, 3_000, 40_000));
        assert!(grid_point_within(30, 2_000, 60_000));
    }

    #[test]
    fn test_due_in_capped_by_duration() {
        assert_eq!(due_in(500, 1, 2_000, 60_000), 1_500);
        // Next grid point at 42 ms lies past the 40 ms end
        assert_eq!(due_in(39_500, 14, 3_000, 40_000), 500);
        assert_eq!(due_in(41_000, 14, 3_000, 40_000), 0);
    }

    #[test]
    fn test_max_samples() {
        assert_eq!(max_samples(60_000, 2_000, 4096), 31);
        assert_eq!(max_samples(30_000, 100, 4096), 301);
        assert_eq!(max_samples(20_000_000, 100, 4096), 4096);
        assert_eq!(max_samples(40_000, 3_000, 4096), 14);
        assert_eq!(max_samples(50_000, 7_000, 4096), 8);
    }
}
