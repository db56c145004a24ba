//! RTT history and minimum-RTT tracking.
//!
//! Keeps a fixed-capacity ring of quantized RTT samples, the all-time minimum
//! for the connection, and an 8-bit trend register for the bit-transition
//! estimator. The trend compares raw RTTs, so it keeps working when the
//! stored samples saturate at a coarse resolution's ceiling. Everything lives inline so the tracker can be embedded in the
//! per-connection state without allocation.

use std::time::Duration;

use crate::config::MAX_HISTORY;

/// Sentinel for "no RTT observed yet".
pub(crate) const MIN_RTT_UNKNOWN: u32 = u32::MAX;

/// How raw microsecond RTTs are stored in the history ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HistoryResolution {
    /// Microseconds per stored unit.
    pub unit_us: u32,
    /// Largest storable value.
    pub ceiling: u16,
}

impl HistoryResolution {
    fn quantize(&self, rtt_us: u32) -> u16 {
        let units = (rtt_us / self.unit_us).clamp(1, u32::from(self.ceiling));
        units as u16
    }
}

/// Ring buffer of recent RTT samples plus the minimum RTT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct RttTracker {
    min_rtt_us: u32,
    /// Previous raw sample; `0` before the first one.
    last_rtt_us: u32,
    history: [u16; MAX_HISTORY],
    index: u8,
    count: u8,
    capacity: u8,
    trend_bits: u8,
}

impl RttTracker {
    pub(crate) fn new(capacity: u8) -> Self {
        debug_assert!(capacity as usize <= MAX_HISTORY);
        Self {
            min_rtt_us: MIN_RTT_UNKNOWN,
            last_rtt_us: 0,
            history: [0; MAX_HISTORY],
            index: 0,
            count: 0,
            capacity: capacity.min(MAX_HISTORY as u8),
            trend_bits: 0,
        }
    }

    /// Record one smoothed RTT sample in microseconds.
    ///
    /// Returns the value stored in the ring.
    pub(crate) fn record(&mut self, rtt_us: u32, resolution: HistoryResolution) -> u16 {
        let rtt_us = rtt_us.max(1);
        if rtt_us < self.min_rtt_us {
            self.min_rtt_us = rtt_us;
        }

        let rising = self.last_rtt_us != 0 && rtt_us > self.last_rtt_us;
        self.trend_bits = (self.trend_bits << 1) | u8::from(rising);
        self.last_rtt_us = rtt_us;

        let sample = resolution.quantize(rtt_us);
        self.history[self.index as usize] = sample;
        self.index = (self.index + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        }
        sample
    }

    /// Valid samples, in storage order.
    pub fn samples(&self) -> &[u16] {
        &self.history[..self.count as usize]
    }

    /// Number of valid samples.
    pub fn depth(&self) -> u8 {
        self.count
    }

    pub fn capacity(&self) -> u8 {
        self.capacity
    }

    pub fn min_rtt(&self) -> Option<Duration> {
        (self.min_rtt_us != MIN_RTT_UNKNOWN).then(|| Duration::from_micros(self.min_rtt_us.into()))
    }

    /// Minimum RTT in microseconds; `u32::MAX` when unknown.
    pub fn min_rtt_us(&self) -> u32 {
        self.min_rtt_us
    }

    /// Latest raw sample after the zero clamp; `0` before the first one.
    pub(crate) fn last_rtt_us(&self) -> u32 {
        self.last_rtt_us
    }

    /// One bit per sample, set when the raw RTT exceeded its predecessor.
    pub fn trend_bits(&self) -> u8 {
        self.trend_bits
    }

    /// Structural invariants of the ring.
    pub(crate) fn is_consistent(&self) -> bool {
        let capacity = self.capacity as usize;
        capacity > 0
            && capacity <= MAX_HISTORY
            && self.count <= self.capacity
            && self.index < self.capacity
    }

    /// Forget every sample and the minimum RTT.
    pub(crate) fn reset(&mut self, capacity: u8) {
        *self = Self::new(capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MILLIS: HistoryResolution = HistoryResolution {
        unit_us: 1_000,
        ceiling: u16::MAX,
    };

    #[test]
    fn tracks_minimum_and_count() {
        let mut tracker = RttTracker::new(8);
        assert_eq!(tracker.min_rtt(), None);

        for rtt_ms in [30, 20, 25, 40] {
            tracker.record(rtt_ms * 1_000, MILLIS);
        }

        assert_eq!(tracker.depth(), 4);
        assert_eq!(tracker.min_rtt(), Some(Duration::from_millis(20)));
        assert_eq!(tracker.samples(), &[30, 20, 25, 40]);
    }

    #[test]
    fn count_saturates_at_capacity() {
        let mut tracker = RttTracker::new(8);
        for i in 0..20u32 {
            tracker.record((10 + i) * 1_000, MILLIS);
        }
        assert_eq!(tracker.depth(), 8);
        assert_eq!(tracker.samples().len(), 8);
        assert!(tracker.samples().contains(&29));
        assert!(tracker.is_consistent());
        // The oldest surviving sample is the 13th one recorded.
        assert!(tracker.samples().iter().all(|&s| s >= 22));
    }

    #[test]
    fn zero_rtt_is_one_unit() {
        let mut tracker = RttTracker::new(8);
        assert_eq!(tracker.record(0, MILLIS), 1);
        assert_eq!(tracker.min_rtt_us(), 1);
        assert_eq!(tracker.last_rtt_us(), 1);
    }

    #[test]
    fn samples_clamp_to_ceiling() {
        let coarse = HistoryResolution {
            unit_us: 32,
            ceiling: u8::MAX as u16,
        };
        let mut tracker = RttTracker::new(8);
        assert_eq!(tracker.record(1_000_000, coarse), 255);
        assert_eq!(tracker.record(3_200, coarse), 100);
    }

    #[test]
    fn trend_register_records_rises() {
        let mut tracker = RttTracker::new(8);
        for rtt_ms in [10, 50, 10, 50] {
            tracker.record(rtt_ms * 1_000, MILLIS);
        }
        // first sample has no predecessor
        assert_eq!(tracker.trend_bits(), 0b0101);
    }

    #[test]
    fn trend_survives_saturated_history() {
        let coarse = HistoryResolution {
            unit_us: 32,
            ceiling: u8::MAX as u16,
        };
        let mut tracker = RttTracker::new(8);
        for rtt_ms in [10, 50, 10, 50] {
            assert_eq!(tracker.record(rtt_ms * 1_000, coarse), 255);
        }
        assert_eq!(tracker.trend_bits(), 0b0101);
    }

    #[test]
    fn equal_samples_are_not_rises() {
        let mut tracker = RttTracker::new(8);
        for rtt_us in [7_000, 7_000, 7_400, 7_400] {
            tracker.record(rtt_us, MILLIS);
        }
        // 7.4ms stores as 7 units but still counts as a rise
        assert_eq!(tracker.trend_bits(), 0b0010);
    }

    #[test]
    fn reset_forgets_minimum() {
        let mut tracker = RttTracker::new(16);
        tracker.record(5_000, MILLIS);
        tracker.reset(16);
        assert_eq!(tracker.min_rtt(), None);
        assert_eq!(tracker.depth(), 0);
        assert_eq!(tracker.capacity(), 16);
    }
}
