//! Per-connection controller state.
//!
//! The host gives every connection a fixed private area, so
//! [`ConnectionState`] is a plain fixed-layout value with no heap containers.
//! Its size is checked against [`HOST_PRIVATE_STORAGE_CEILING`] at compile
//! time.
//!
//! Slow start vs congestion avoidance is not stored as a state: it is
//! re-derived from `window < ssthresh` on every ack. The flags only carry
//! pending-event modifiers between acks.

use crate::config::{
    ControllerConfig, HIDDEN_UNITS, HOST_PRIVATE_STORAGE_CEILING, INITIAL_GROWTH_SIGNAL, SCALE,
};
use crate::network::ScoringNetwork;
use crate::plasticity::Plasticity;
use crate::tracker::RttTracker;

bitflags::bitflags! {
    /// Pending-event modifiers carried between acks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
    pub struct ConnectionFlags: u8 {
        /// A full batch has been scored; entropy can be trusted.
        const HAS_DATA = 1 << 0;
        const SLOW_START = 1 << 1;
        /// Low entropy: recent losses look like real congestion.
        const CONGESTION = 1 << 2;
        const LOSS = 1 << 3;
    }
}

/// Mutable state of one connection, exclusively owned by it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct ConnectionState {
    pub(crate) tracker: RttTracker,
    pub(crate) ssthresh: u32,
    pub(crate) prior_cwnd: u32,
    /// Acked units not yet converted into an additive-increase step.
    pub(crate) ai_credit: u32,
    pub(crate) hidden: [i16; HIDDEN_UNITS],
    pub(crate) entropy_score: u16,
    pub(crate) plasticity: Plasticity,
    pub(crate) packets_since_recompute: u16,
    pub(crate) cached_growth_signal: u16,
    pub(crate) skip_counter: u8,
    pub(crate) flags: ConnectionFlags,
}

const _: () = assert!(
    std::mem::size_of::<ConnectionState>() <= HOST_PRIVATE_STORAGE_CEILING,
    "ConnectionState exceeds the host's private storage"
);

impl ConnectionState {
    pub(crate) fn new(config: &ControllerConfig, initial_window: u32, initial_ssthresh: u32) -> Self {
        Self {
            tracker: RttTracker::new(config.history_capacity),
            ssthresh: initial_ssthresh.max(config.min_cwnd),
            prior_cwnd: initial_window,
            ai_credit: 0,
            hidden: [0; HIDDEN_UNITS],
            entropy_score: 0,
            plasticity: Plasticity::new(&config.plasticity),
            packets_since_recompute: 0,
            cached_growth_signal: INITIAL_GROWTH_SIGNAL,
            skip_counter: 0,
            flags: ConnectionFlags::SLOW_START,
        }
    }

    pub fn tracker(&self) -> &RttTracker {
        &self.tracker
    }

    pub fn flags(&self) -> ConnectionFlags {
        self.flags
    }

    pub fn entropy_score(&self) -> u16 {
        self.entropy_score
    }

    pub fn plasticity(&self) -> Plasticity {
        self.plasticity
    }

    /// Controller-side slow-start threshold.
    pub fn ssthresh(&self) -> u32 {
        self.ssthresh
    }

    /// Window restored by an undo.
    pub fn prior_cwnd(&self) -> u32 {
        self.prior_cwnd
    }

    pub fn growth_signal(&self) -> u16 {
        self.cached_growth_signal
    }

    pub fn skip_counter(&self) -> u8 {
        self.skip_counter
    }

    pub fn hidden(&self) -> &[i16; HIDDEN_UNITS] {
        &self.hidden
    }

    pub(crate) fn has(&self, flag: ConnectionFlags) -> bool {
        self.flags.contains(flag)
    }

    /// First invariant this state violates, if any.
    pub(crate) fn violation(
        &self,
        config: &ControllerConfig,
        network: ScoringNetwork,
    ) -> Option<&'static str> {
        let bound = network.activation_bound();
        if !self.tracker.is_consistent() || self.tracker.capacity() != config.history_capacity {
            Some("rtt history")
        } else if self.entropy_score > SCALE {
            Some("entropy score")
        } else if !self.plasticity.is_within(&config.plasticity) {
            Some("plasticity")
        } else if self.cached_growth_signal > SCALE {
            Some("growth signal")
        } else if self.hidden.iter().any(|h| h.unsigned_abs() > bound.unsigned_abs()) {
            Some("hidden state")
        } else if self.ssthresh < config.min_cwnd {
            Some("ssthresh")
        } else {
            None
        }
    }

    /// Bring a corrupted state back within its invariants.
    ///
    /// The RTT history and minimum are discarded outright; they will rebuild
    /// from the next acks. Scalars are clamped into range.
    pub(crate) fn repair(&mut self, config: &ControllerConfig) {
        self.tracker.reset(config.history_capacity);
        self.flags.remove(ConnectionFlags::HAS_DATA);
        self.packets_since_recompute = 0;
        self.entropy_score = self.entropy_score.min(SCALE);
        self.cached_growth_signal = self.cached_growth_signal.min(SCALE);
        self.plasticity.clamp_to(&config.plasticity);
        self.hidden = [0; HIDDEN_UNITS];
        self.skip_counter = 0;
        self.ssthresh = self.ssthresh.max(config.min_cwnd);
    }
}
