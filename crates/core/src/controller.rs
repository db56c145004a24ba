//! Entropy-aware congestion controller.
//!
//! [`EntropyController`] holds only immutable configuration and is shared by
//! every connection using the same tier. All mutable data lives in the
//! [`ConnectionState`] the host passes in, one per connection, which the host
//! must not touch concurrently.
//!
//! ## Ack cycle
//!
//! ```text
//! ack ─► RttTracker::record
//!          │ every `batch_size` packets
//!          ├──► EntropyEstimator ─► HAS_DATA, CONGESTION = entropy < threshold
//!          ▼
//!     slow start? (window < private ssthresh)
//!          │
//!          ├──► ScoringNetwork (or cached signal) ─► growth signal
//!          ▼
//!     grow window ─► decay plasticity ─► WindowMutation
//! ```
//!
//! ## Growth
//!
//! | Phase | Increase |
//! |-------|----------|
//! | slow start | `acked`, halved under `CONGESTION` |
//! | avoidance, no data yet | one segment per window acked |
//! | avoidance, `CONGESTION` | `acked * signal >> 11` credit |
//! | avoidance, noise | `acked * signal >> 10` credit |
//!
//! No operation allocates, blocks or fails. Degenerate input clamps.

use std::time::Duration;

use crate::config::{
    ControllerConfig, Tier, AGGRESSIVE_SHIFT, CONSERVATIVE_SHIFT, MIN_ENTROPY_SAMPLES,
    NOISY_LOSS_DIVISOR, REAL_LOSS_DIVISOR, SCALE,
};
use crate::entropy::EntropyEstimator;
use crate::errors::ConfigError;
use crate::network::{NetworkInputs, ScoringNetwork};
use crate::state::{ConnectionFlags, ConnectionState};
use crate::stats::DiagnosticSnapshot;
use crate::tracker::HistoryResolution;

/// What the host should do to its window after an ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMutation {
    /// Leave the window unchanged.
    Hold,
    /// Grow the window by this many units.
    Increase(u32),
    /// Replace the window outright.
    Set(u32),
}

impl WindowMutation {
    pub fn apply(self, cwnd: u32) -> u32 {
        match self {
            WindowMutation::Hold => cwnd,
            WindowMutation::Increase(delta) => cwnd.saturating_add(delta),
            WindowMutation::Set(window) => window,
        }
    }
}

/// Shared, immutable controller for one tier configuration.
#[derive(Debug, Clone)]
pub struct EntropyController {
    config: ControllerConfig,
    estimator: EntropyEstimator,
    network: ScoringNetwork,
    resolution: HistoryResolution,
}

impl EntropyController {
    pub fn new(config: ControllerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    /// Controller for a built-in preset.
    pub fn for_tier(tier: Tier) -> Self {
        let config = tier.config();
        debug_assert!(config.validate().is_ok(), "{tier} preset is invalid");
        Self::from_validated(config)
    }

    fn from_validated(config: ControllerConfig) -> Self {
        Self {
            estimator: config.entropy.into(),
            network: config.network.into(),
            resolution: HistoryResolution {
                unit_us: config.history_resolution_us,
                ceiling: config.history_ceiling,
            },
            config,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Fresh state for a new connection.
    ///
    /// The controller keeps its own slow-start threshold, seeded from the
    /// host's. Hosts should then raise their threshold to
    /// [`INFINITE_SSTHRESH`](crate::config::INFINITE_SSTHRESH) so that only
    /// the controller's threshold bounds slow start.
    pub fn init(&self, initial_window: u32, initial_ssthresh: u32) -> ConnectionState {
        ConnectionState::new(&self.config, initial_window, initial_ssthresh)
    }

    /// Process one acknowledgment.
    ///
    /// `rtt` is the host's smoothed RTT; `cwnd` and `ssthresh` are the host's
    /// current window and threshold, in host units.
    pub fn on_ack(
        &self,
        state: &mut ConnectionState,
        rtt: Duration,
        acked: u32,
        cwnd: u32,
        ssthresh: u32,
    ) -> WindowMutation {
        if acked == 0 {
            return WindowMutation::Hold;
        }
        self.check_invariants(state);

        state.tracker.record(
            u32::try_from(rtt.as_micros()).unwrap_or(u32::MAX),
            self.resolution,
        );
        let rtt_us = state.tracker.last_rtt_us();

        let packets = acked.div_ceil(self.config.segment_size);
        state.packets_since_recompute = state
            .packets_since_recompute
            .saturating_add(u16::try_from(packets).unwrap_or(u16::MAX));
        if state.packets_since_recompute >= self.config.batch_size {
            self.recompute_entropy(state);
        }

        let slow_start = cwnd < state.ssthresh;
        state.flags.set(ConnectionFlags::SLOW_START, slow_start);

        let signal = self.growth_signal(state, rtt_us);

        let window = cwnd.max(self.config.min_cwnd);
        let new_window = if slow_start {
            self.slow_start(state, window, acked, ssthresh)
        } else {
            self.congestion_avoidance(state, window, acked, signal)
        };

        state.plasticity.decay(&self.config.plasticity);

        if cwnd < self.config.min_cwnd {
            WindowMutation::Set(new_window)
        } else if new_window > cwnd {
            WindowMutation::Increase(new_window - cwnd)
        } else {
            WindowMutation::Hold
        }
    }

    /// The host detected loss and asks for a new slow-start threshold.
    ///
    /// High recent entropy suggests the loss was noise, so the window keeps
    /// two thirds instead of half.
    pub fn on_reduce_request(&self, state: &mut ConnectionState, cwnd: u32) -> u32 {
        state.flags.insert(ConnectionFlags::LOSS);
        state
            .plasticity
            .boost(self.config.plasticity.loss_boost, &self.config.plasticity);

        let noisy = state.entropy_score > self.config.entropy_threshold;
        let divisor = if noisy {
            NOISY_LOSS_DIVISOR
        } else {
            REAL_LOSS_DIVISOR
        };
        let ssthresh = (cwnd / divisor).max(self.config.min_cwnd);
        state.ssthresh = ssthresh;
        state.prior_cwnd = cwnd;
        // credit earned against the old window does not carry over
        state.ai_credit = 0;

        tracing::debug!(
            cwnd,
            new_ssthresh = ssthresh,
            divisor,
            entropy = state.entropy_score,
            plasticity = state.plasticity.get(),
            "Window reduction requested"
        );
        ssthresh
    }

    /// The host judged the last reduction spurious. Returns the window to use.
    pub fn on_undo_request(&self, state: &mut ConnectionState, cwnd: u32) -> u32 {
        let restored = cwnd.max(state.prior_cwnd);
        state
            .flags
            .set(ConnectionFlags::SLOW_START, restored < state.ssthresh);
        tracing::debug!(cwnd, restored, "Undoing window reduction");
        restored
    }

    /// Coarse loss signal, e.g. a retransmission timeout. Assume the worst
    /// until the next entropy recomputation says otherwise.
    pub fn on_loss_event(&self, state: &mut ConnectionState) {
        state
            .flags
            .insert(ConnectionFlags::CONGESTION | ConnectionFlags::LOSS);
        tracing::debug!(entropy = state.entropy_score, "Loss event");
    }

    /// The connection went idle; forget learned aggressiveness.
    pub fn on_idle_restart(&self, state: &mut ConnectionState) {
        state.plasticity.reset_to_base(&self.config.plasticity);
        tracing::trace!(plasticity = state.plasticity.get(), "Idle restart");
    }

    /// The host entered loss recovery, a stronger signal than plain loss.
    pub fn on_recovery_state_entry(&self, state: &mut ConnectionState) {
        state
            .flags
            .insert(ConnectionFlags::CONGESTION | ConnectionFlags::LOSS);
        state
            .plasticity
            .boost(self.config.plasticity.recovery_boost, &self.config.plasticity);
        tracing::warn!(
            entropy = state.entropy_score,
            plasticity = state.plasticity.get(),
            ssthresh = state.ssthresh,
            "Entered loss recovery"
        );
    }

    pub fn snapshot(&self, state: &ConnectionState) -> DiagnosticSnapshot {
        DiagnosticSnapshot {
            history_depth: state.tracker.depth(),
            min_rtt: state.tracker.min_rtt(),
            entropy_score: state.entropy_score,
            plasticity: state.plasticity.get(),
            growth_signal: state.cached_growth_signal,
            flags: state.flags,
            ssthresh: state.ssthresh,
            prior_cwnd: state.prior_cwnd,
        }
    }

    fn check_invariants(&self, state: &mut ConnectionState) {
        if let Some(invariant) = state.violation(&self.config, self.network) {
            tracing::error!(
                invariant,
                depth = state.tracker.depth(),
                entropy = state.entropy_score,
                plasticity = state.plasticity.get(),
                "CRITICAL: Controller state corrupted - resetting RTT history"
            );
            state.repair(&self.config);
        }
    }

    /// Batch boundary: consumes the pending loss signal even when the history
    /// is still too short to score.
    fn recompute_entropy(&self, state: &mut ConnectionState) {
        state.packets_since_recompute = 0;
        state.flags.remove(ConnectionFlags::LOSS);
        if (state.tracker.depth() as usize) < MIN_ENTROPY_SAMPLES {
            state.entropy_score = 0;
            return;
        }

        let entropy = self.estimator.estimate(&state.tracker);
        let congestion = entropy < self.config.entropy_threshold;
        state.entropy_score = entropy;
        state.flags.insert(ConnectionFlags::HAS_DATA);
        state.flags.set(ConnectionFlags::CONGESTION, congestion);

        tracing::trace!(
            entropy,
            congestion,
            depth = state.tracker.depth(),
            "Entropy recomputed"
        );
    }

    fn growth_signal(&self, state: &mut ConnectionState, rtt_us: u32) -> u16 {
        let elision = &self.config.elision;
        if elision.enabled
            && state.entropy_score < elision.entropy_below
            && state.plasticity.get() > elision.plasticity_above
            && state.skip_counter < elision.max_skips
        {
            state.skip_counter += 1;
            return state.cached_growth_signal;
        }

        let inputs = NetworkInputs {
            rtt_ratio: rtt_ratio_q10(rtt_us, state.tracker.min_rtt_us()),
            entropy: state.entropy_score,
            slow_start: state.has(ConnectionFlags::SLOW_START),
            congestion: state.has(ConnectionFlags::CONGESTION),
            plasticity: state.plasticity.get(),
            loss: state.has(ConnectionFlags::LOSS),
            high_entropy: state.entropy_score > self.config.entropy_threshold,
        };
        let signal = self.network.forward(&inputs, &mut state.hidden);
        state.cached_growth_signal = signal;
        state.skip_counter = 0;
        signal
    }

    fn slow_start(
        &self,
        state: &ConnectionState,
        window: u32,
        acked: u32,
        host_ssthresh: u32,
    ) -> u32 {
        let increase = if state.has(ConnectionFlags::CONGESTION) {
            acked >> 1
        } else {
            acked
        };
        let cap = host_ssthresh.min(self.config.max_cwnd).max(window);
        window.saturating_add(increase).min(cap)
    }

    fn congestion_avoidance(
        &self,
        state: &mut ConnectionState,
        window: u32,
        acked: u32,
        signal: u16,
    ) -> u32 {
        let credit = if state.has(ConnectionFlags::HAS_DATA) {
            let shift = if state.has(ConnectionFlags::CONGESTION) {
                CONSERVATIVE_SHIFT
            } else {
                AGGRESSIVE_SHIFT
            };
            let scaled = (u64::from(acked) * u64::from(signal)) >> shift;
            u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
        } else {
            acked
        };

        // One segment per window's worth of credit.
        state.ai_credit = state.ai_credit.saturating_add(credit);
        if state.ai_credit < window {
            return window;
        }
        let segments = state.ai_credit / window;
        state.ai_credit -= segments * window;
        window
            .saturating_add(segments.saturating_mul(self.config.segment_size))
            .min(self.config.max_cwnd.max(window))
    }
}

/// `rtt / min_rtt - 1` in Q10, clamped to `[-SCALE, SCALE]`.
fn rtt_ratio_q10(rtt_us: u32, min_rtt_us: u32) -> i16 {
    let min_rtt_us = u64::from(min_rtt_us.max(1));
    let ratio = (u64::from(rtt_us) << 10) / min_rtt_us;
    let ratio = ratio.min(2 * u64::from(SCALE)) as i32;
    (ratio - i32::from(SCALE)) as i16
}
