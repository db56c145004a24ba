//! RTT entropy estimation.
//!
//! Scores how unpredictable recent RTTs are, on `[0, SCALE]`. A score of 0
//! means the history carries no information (every sample identical, or too
//! few samples). One bit of Shannon entropy or more saturates the score.
//!
//! ## Strategies
//!
//! | Strategy | Cost | Notes |
//! |----------|------|-------|
//! | Histogram, table log | two passes over 8 samples | exact for a window of 8 |
//! | Histogram, bit-length log | two passes, any window | ~5% log error |
//! | Bit-transition | one popcount | direction changes only |
//!
//! All of them are integer-only and allocation-free.

use crate::config::{EntropyStrategy, LogApprox, MAX_HISTORY, MIN_ENTROPY_SAMPLES, SCALE};
use crate::tracker::RttTracker;

/// `-(c/8) * log2(c/8)` in Q10 bits, indexed by bin occupancy `c`.
const ENTROPY_TERMS_OF_EIGHT: [u16; 9] = [0, 384, 512, 543, 512, 434, 319, 173, 0];

/// Entropy estimator, dispatched by strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyEstimator {
    Histogram { bins: u8, log: LogApprox },
    BitTransition,
}

impl From<EntropyStrategy> for EntropyEstimator {
    fn from(strategy: EntropyStrategy) -> Self {
        match strategy {
            EntropyStrategy::Histogram { bins, log } => Self::Histogram { bins, log },
            EntropyStrategy::BitTransition => Self::BitTransition,
        }
    }
}

impl EntropyEstimator {
    /// Score the tracker's history; `0` until enough samples exist.
    pub fn estimate(&self, tracker: &RttTracker) -> u16 {
        if (tracker.depth() as usize) < MIN_ENTROPY_SAMPLES {
            return 0;
        }
        match *self {
            Self::Histogram { bins, log } => histogram_entropy(tracker.samples(), bins, log),
            Self::BitTransition => bit_transition_entropy(tracker.trend_bits()),
        }
    }
}

/// Shannon entropy of `samples` binned linearly between their min and max.
pub(crate) fn histogram_entropy(samples: &[u16], bins: u8, log: LogApprox) -> u16 {
    let (Some(&min), Some(&max)) = (samples.iter().min(), samples.iter().max()) else {
        return 0;
    };
    if min == max {
        return 0;
    }

    let range = u32::from(max - min);
    let last_bin = u32::from(bins.clamp(1, MAX_HISTORY as u8)) - 1;
    let mut histogram = [0u8; MAX_HISTORY];
    for &sample in samples {
        let bin = (u32::from(sample - min) * last_bin / range).min(last_bin);
        histogram[bin as usize] += 1;
    }

    let n = samples.len() as u32;
    let occupied = histogram.iter().filter(|&&count| count > 0);
    let bits: u32 = match log {
        LogApprox::Table if n == 8 => occupied
            .map(|&count| u32::from(ENTROPY_TERMS_OF_EIGHT[count as usize]))
            .sum(),
        // a table over a window other than 8 would be wrong; fall back
        LogApprox::Table | LogApprox::BitLength => {
            let log_n = log2_q10(n);
            occupied
                .map(|&count| {
                    let count = u32::from(count);
                    count * (log_n - log2_q10(count)) / n
                })
                .sum()
        }
    };
    bits.min(u32::from(SCALE)) as u16
}

/// Direction changes in the trend register, scaled to `[0, SCALE]`.
pub(crate) fn bit_transition_entropy(trend_bits: u8) -> u16 {
    let changes = (trend_bits ^ (trend_bits >> 1)).count_ones() as u16;
    changes * (SCALE / 8)
}

/// `log2(x)` in Q10: integer part from the highest set bit, fraction from
/// the mantissa interpolated linearly. `x` must be non-zero.
fn log2_q10(x: u32) -> u32 {
    debug_assert!(x > 0);
    let msb = 31 - x.leading_zeros();
    let mantissa = ((u64::from(x) << 10) >> msb) as u32 - 1024;
    (msb << 10) + mantissa
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::HistoryResolution;

    const MILLIS: HistoryResolution = HistoryResolution {
        unit_us: 1_000,
        ceiling: u16::MAX,
    };

    fn tracker_with(capacity: u8, rtts_ms: &[u32]) -> RttTracker {
        let mut tracker = RttTracker::new(capacity);
        for &rtt in rtts_ms {
            tracker.record(rtt * 1_000, MILLIS);
        }
        tracker
    }

    fn estimators() -> [EntropyEstimator; 4] {
        [
            EntropyEstimator::Histogram {
                bins: 8,
                log: LogApprox::Table,
            },
            EntropyEstimator::Histogram {
                bins: 8,
                log: LogApprox::BitLength,
            },
            EntropyEstimator::Histogram {
                bins: 16,
                log: LogApprox::BitLength,
            },
            EntropyEstimator::BitTransition,
        ]
    }

    #[test]
    fn constant_history_has_no_entropy() {
        let tracker = tracker_with(8, &[10; 8]);
        for estimator in estimators() {
            assert_eq!(estimator.estimate(&tracker), 0, "{estimator:?}");
        }
    }

    #[test]
    fn alternating_history_saturates() {
        let tracker = tracker_with(8, &[10, 50, 10, 50, 10, 50, 10, 50]);
        for estimator in estimators() {
            assert!(estimator.estimate(&tracker) >= 896, "{estimator:?}");
        }
        let table = EntropyEstimator::Histogram {
            bins: 8,
            log: LogApprox::Table,
        };
        assert_eq!(table.estimate(&tracker), SCALE);
    }

    #[test]
    fn short_history_scores_zero() {
        let tracker = tracker_with(8, &[10, 50, 10, 50]);
        for estimator in estimators() {
            assert_eq!(estimator.estimate(&tracker), 0);
        }
    }

    #[test]
    fn histogram_is_order_independent() {
        let a = [12, 30, 17, 12, 45, 30, 12, 19];
        let mut b = a;
        b.reverse();
        let mut c = a;
        c.sort_unstable();

        for log in [LogApprox::Table, LogApprox::BitLength] {
            let estimator = EntropyEstimator::Histogram { bins: 8, log };
            let expected = estimator.estimate(&tracker_with(8, &a));
            assert_eq!(estimator.estimate(&tracker_with(8, &b)), expected);
            assert_eq!(estimator.estimate(&tracker_with(8, &c)), expected);
        }
    }

    #[test]
    fn single_outlier_stays_below_one_bit() {
        // 7:1 split is about 0.54 bits
        let samples = [10, 10, 10, 10, 10, 10, 10, 80];
        let table = histogram_entropy(&samples, 8, LogApprox::Table);
        let approx = histogram_entropy(&samples, 8, LogApprox::BitLength);
        assert_eq!(table, 173 + 384);
        assert!(approx.abs_diff(table) < 64, "{approx} vs {table}");
    }

    #[test]
    fn log2_exact_on_powers_of_two() {
        assert_eq!(log2_q10(1), 0);
        assert_eq!(log2_q10(8), 3 * 1024);
        assert_eq!(log2_q10(16), 4 * 1024);
        assert_eq!(log2_q10(3), 1024 + 512);
    }

    #[test]
    fn bit_transition_counts_direction_changes() {
        assert_eq!(bit_transition_entropy(0), 0);
        assert_eq!(bit_transition_entropy(0xff), 128);
        assert_eq!(bit_transition_entropy(0b1010_1010), SCALE);
        assert_eq!(bit_transition_entropy(0b0101_0101), 7 * 128);
    }
}
