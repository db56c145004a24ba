//! Read-only diagnostics.
//!
//! [`DiagnosticSnapshot`] is the full view for logs and tooling.
//! [`VegasInfo`] projects it onto the record delay-based controllers already
//! export, so existing monitoring reads it without special cases.

use std::time::Duration;

use serde::Serialize;

use crate::state::ConnectionFlags;

/// Snapshot of one connection's controller state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticSnapshot {
    /// Valid samples in the RTT history.
    pub history_depth: u8,
    /// Smallest RTT seen, if any.
    pub min_rtt: Option<Duration>,
    pub entropy_score: u16,
    pub plasticity: u16,
    /// Last growth signal produced or reused.
    pub growth_signal: u16,
    pub flags: ConnectionFlags,
    pub ssthresh: u32,
    pub prior_cwnd: u32,
}

impl DiagnosticSnapshot {
    pub fn vegas_info(&self) -> VegasInfo {
        VegasInfo {
            enabled: 1,
            rtt_count: u32::from(self.history_depth),
            rtt: self
                .min_rtt
                .map_or(u32::MAX / 1000, |rtt| rtt.as_millis().min(u128::from(u32::MAX)) as u32),
            min_rtt: u32::from(self.entropy_score),
        }
    }
}

/// Delay-based diagnostic record layout.
///
/// The fields carry this controller's values: `rtt` is the minimum RTT in
/// milliseconds and `min_rtt` is the entropy score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[repr(C)]
pub struct VegasInfo {
    pub enabled: u32,
    pub rtt_count: u32,
    pub rtt: u32,
    pub min_rtt: u32,
}
