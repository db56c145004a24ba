//! Host binding.
//!
//! Transport stacks drive congestion control through a table of callbacks
//! keyed to their own connection lifecycle. [`CongestionOps`] models that
//! table and [`EntropyOps`] maps it onto [`EntropyController`]'s event
//! contract. [`Connection`] plays the host's side: it owns the window, the
//! threshold and the controller's private area, and invokes the callbacks
//! the way a stack does on acks, fast retransmit, timeouts and undo.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ControllerConfig, HOST_PRIVATE_STORAGE_CEILING, INFINITE_SSTHRESH};
use crate::controller::EntropyController;
use crate::errors::ConfigError;
use crate::state::ConnectionState;
use crate::stats::VegasInfo;

/// Name under which the controller registers with a host.
pub const NAME: &str = "entropy_cc";

/// Discrete window events raised by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum CaEvent {
    /// First transmission after idle.
    TxStart,
    /// Window restarted after an idle period.
    CwndRestart,
    /// Window reduction finished.
    CompleteCwr,
    /// Retransmission timeout.
    Loss,
}

/// Host congestion-avoidance state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaState {
    #[default]
    Open,
    Disorder,
    Cwr,
    Recovery,
    Loss,
}

/// Window state the host owns and the callbacks may read or write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostConnection {
    pub cwnd: u32,
    pub ssthresh: u32,
    /// Smoothed RTT as measured by the host.
    pub srtt: Duration,
    pub ca_state: CaState,
    /// Window after a retransmission timeout.
    pub loss_window: u32,
    /// Threshold before the last reduction, for undo.
    pub prior_ssthresh: u32,
}

impl HostConnection {
    pub fn new(cwnd: u32, ssthresh: u32, loss_window: u32) -> Self {
        Self {
            cwnd,
            ssthresh,
            srtt: Duration::ZERO,
            ca_state: CaState::Open,
            loss_window,
            prior_ssthresh: ssthresh,
        }
    }
}

/// Congestion-control callback table.
pub trait CongestionOps {
    /// Per-connection private area.
    type Private;

    fn name(&self) -> &'static str;

    /// Connection established. May adjust the host's window state.
    fn init(&self, sk: &mut HostConnection) -> Self::Private;

    /// Loss detected: return the new slow-start threshold.
    fn ssthresh(&self, sk: &HostConnection, ca: &mut Self::Private) -> u32;

    /// Data acknowledged in order; grow `sk.cwnd` as appropriate.
    fn cong_avoid(&self, sk: &mut HostConnection, ca: &mut Self::Private, acked: u32);

    /// Last reduction was spurious: return the window to restore.
    fn undo_cwnd(&self, sk: &HostConnection, ca: &mut Self::Private) -> u32;

    fn cwnd_event(&self, ca: &mut Self::Private, event: CaEvent);

    fn set_state(&self, ca: &mut Self::Private, state: CaState);

    /// Diagnostic record for monitoring tools.
    fn get_info(&self, ca: &Self::Private) -> VegasInfo;
}

/// [`EntropyController`] bound to the callback table.
#[derive(Debug, Clone)]
pub struct EntropyOps {
    controller: EntropyController,
}

impl EntropyOps {
    pub fn new(config: ControllerConfig) -> Result<Self, ConfigError> {
        let controller = EntropyController::new(config)?;
        tracing::info!(
            name = NAME,
            tier = %controller.config().tier,
            state_bytes = std::mem::size_of::<ConnectionState>(),
            limit_bytes = HOST_PRIVATE_STORAGE_CEILING,
            "Congestion control registered"
        );
        Ok(Self { controller })
    }

    pub fn controller(&self) -> &EntropyController {
        &self.controller
    }
}

impl CongestionOps for EntropyOps {
    type Private = ConnectionState;

    fn name(&self) -> &'static str {
        NAME
    }

    fn init(&self, sk: &mut HostConnection) -> ConnectionState {
        let state = self.controller.init(sk.cwnd, sk.ssthresh);
        // the controller's own threshold bounds slow start from here on
        sk.ssthresh = INFINITE_SSTHRESH;
        state
    }

    fn ssthresh(&self, sk: &HostConnection, ca: &mut ConnectionState) -> u32 {
        self.controller.on_reduce_request(ca, sk.cwnd)
    }

    fn cong_avoid(&self, sk: &mut HostConnection, ca: &mut ConnectionState, acked: u32) {
        let mutation = self
            .controller
            .on_ack(ca, sk.srtt, acked, sk.cwnd, sk.ssthresh);
        sk.cwnd = mutation.apply(sk.cwnd);
    }

    fn undo_cwnd(&self, sk: &HostConnection, ca: &mut ConnectionState) -> u32 {
        self.controller.on_undo_request(ca, sk.cwnd)
    }

    fn cwnd_event(&self, ca: &mut ConnectionState, event: CaEvent) {
        match event {
            CaEvent::Loss => self.controller.on_loss_event(ca),
            CaEvent::CwndRestart => self.controller.on_idle_restart(ca),
            CaEvent::TxStart | CaEvent::CompleteCwr => {}
        }
    }

    fn set_state(&self, ca: &mut ConnectionState, state: CaState) {
        if state == CaState::Loss {
            self.controller.on_recovery_state_entry(ca);
        }
    }

    fn get_info(&self, ca: &ConnectionState) -> VegasInfo {
        self.controller.snapshot(ca).vegas_info()
    }
}

/// Host-side driver for one connection.
pub struct Connection<'a, O: CongestionOps> {
    ops: &'a O,
    host: HostConnection,
    private: O::Private,
}

impl<'a, O: CongestionOps> Connection<'a, O> {
    pub fn establish(ops: &'a O, mut host: HostConnection) -> Self {
        let private = ops.init(&mut host);
        Self { ops, host, private }
    }

    pub fn host(&self) -> &HostConnection {
        &self.host
    }

    pub fn private(&self) -> &O::Private {
        &self.private
    }

    pub fn cwnd(&self) -> u32 {
        self.host.cwnd
    }

    /// In-order acknowledgment of `acked` units with smoothed RTT `srtt`.
    pub fn ack(&mut self, srtt: Duration, acked: u32) -> u32 {
        self.host.srtt = srtt;
        if matches!(self.host.ca_state, CaState::Recovery | CaState::Loss) {
            self.set_state(CaState::Open);
        }
        self.ops.cong_avoid(&mut self.host, &mut self.private, acked);
        self.host.cwnd
    }

    /// Loss detected by duplicate acks.
    pub fn fast_retransmit(&mut self) -> u32 {
        self.set_state(CaState::Recovery);
        self.reduce();
        self.host.cwnd = self.host.ssthresh;
        self.host.cwnd
    }

    /// Retransmission timeout.
    pub fn retransmit_timeout(&mut self) -> u32 {
        self.reduce();
        self.host.cwnd = self.host.loss_window;
        self.set_state(CaState::Loss);
        self.ops.cwnd_event(&mut self.private, CaEvent::Loss);
        self.host.cwnd
    }

    /// The last reduction turned out to be spurious.
    pub fn undo(&mut self) -> u32 {
        self.host.cwnd = self.ops.undo_cwnd(&self.host, &mut self.private);
        self.host.ssthresh = self.host.ssthresh.max(self.host.prior_ssthresh);
        self.set_state(CaState::Open);
        self.host.cwnd
    }

    pub fn idle_restart(&mut self) {
        self.ops
            .cwnd_event(&mut self.private, CaEvent::CwndRestart);
    }

    pub fn info(&self) -> VegasInfo {
        self.ops.get_info(&self.private)
    }

    fn reduce(&mut self) {
        self.host.prior_ssthresh = self.host.ssthresh;
        self.host.ssthresh = self.ops.ssthresh(&self.host, &mut self.private);
    }

    fn set_state(&mut self, state: CaState) {
        self.host.ca_state = state;
        self.ops.set_state(&mut self.private, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tier;
    use crate::state::ConnectionFlags;

    fn segment_ops() -> EntropyOps {
        EntropyOps::new(ControllerConfig::segment_units(Tier::Standard)).unwrap()
    }

    #[test]
    fn init_hands_slow_start_to_controller() {
        let ops = segment_ops();
        let conn = Connection::establish(&ops, HostConnection::new(10, 64, 1));
        assert_eq!(conn.host().ssthresh, INFINITE_SSTHRESH);
        assert_eq!(conn.private().ssthresh(), 64);
        assert_eq!(ops.name(), NAME);
    }

    #[test]
    fn fast_retransmit_then_undo_restores_window() {
        let ops = segment_ops();
        let mut conn = Connection::establish(&ops, HostConnection::new(100, 1_000, 1));

        let reduced = conn.fast_retransmit();
        assert_eq!(reduced, 50);
        assert_eq!(conn.private().prior_cwnd(), 100);
        assert!(conn.private().flags().contains(ConnectionFlags::LOSS));

        assert_eq!(conn.undo(), 100);
        assert_eq!(conn.host().ca_state, CaState::Open);
    }

    #[test]
    fn timeout_marks_congestion_and_boosts() {
        let ops = segment_ops();
        let mut conn = Connection::establish(&ops, HostConnection::new(40, 1_000, 1));
        let base = conn.private().plasticity().get();

        assert_eq!(conn.retransmit_timeout(), 1);
        let flags = conn.private().flags();
        assert!(flags.contains(ConnectionFlags::CONGESTION | ConnectionFlags::LOSS));

        let config = ops.controller().config();
        assert_eq!(
            conn.private().plasticity().get(),
            base + config.plasticity.loss_boost + config.plasticity.recovery_boost
        );

        conn.idle_restart();
        assert_eq!(conn.private().plasticity().get(), base);
    }

    #[test]
    fn info_reports_history_and_entropy() {
        let ops = segment_ops();
        let mut conn = Connection::establish(&ops, HostConnection::new(10, 1_000, 1));
        for _ in 0..3 {
            conn.ack(Duration::from_millis(25), 1);
        }
        let info = conn.info();
        assert_eq!(info.enabled, 1);
        assert_eq!(info.rtt_count, 3);
        assert_eq!(info.rtt, 25);
        assert_eq!(info.min_rtt, 0);
    }
}
