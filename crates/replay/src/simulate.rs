//! Synthetic traces over preset paths.

use std::io::Write;
use std::time::Duration;

use clap::ValueEnum;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::SimulateConfig;
use crate::replay::{replay, TraceEvent};

/// Path characteristics a trace is generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PathPreset {
    /// 1ms RTT, no jitter, no loss
    Lan,
    /// 10ms RTT, ±5% jitter, no loss
    Datacenter,
    /// 50ms RTT, ±10% jitter, 0.1% loss
    Continental,
    /// 135ms RTT, ±20% jitter, 0.5% loss
    Intercontinental,
    /// 30ms RTT, ±50% jitter, 2% loss
    LossyWireless,
}

#[derive(Debug, Clone, Copy)]
pub struct PathCondition {
    pub rtt: Duration,
    pub jitter: Option<(f64, f64)>,
    pub loss_rate: f64,
}

impl PathPreset {
    pub fn condition(self) -> PathCondition {
        let (rtt_ms, jitter, loss_rate) = match self {
            PathPreset::Lan => (1, None, 0.0),
            PathPreset::Datacenter => (10, Some(0.05), 0.0),
            PathPreset::Continental => (50, Some(0.10), 0.001),
            PathPreset::Intercontinental => (135, Some(0.20), 0.005),
            PathPreset::LossyWireless => (30, Some(0.50), 0.02),
        };
        PathCondition {
            rtt: Duration::from_millis(rtt_ms),
            jitter: jitter.map(|pct| (1.0 - pct, 1.0 + pct)),
            loss_rate,
        }
    }
}

/// Open-loop trace: `acks` acknowledgments of one segment each, with a loss
/// event per dropped packet. A `spurious_rate` fraction of losses is followed
/// by an undo.
pub fn generate(
    condition: PathCondition,
    acks: usize,
    segment: u32,
    spurious_rate: f64,
    rng: &mut SmallRng,
) -> Vec<TraceEvent> {
    let spurious_rate = spurious_rate.clamp(0.0, 1.0);
    let mut events = Vec::with_capacity(acks + acks / 50);
    for _ in 0..acks {
        if condition.loss_rate > 0.0 && rng.gen_bool(condition.loss_rate) {
            events.push(TraceEvent::Loss);
            if spurious_rate > 0.0 && rng.gen_bool(spurious_rate) {
                events.push(TraceEvent::Undo);
            }
            continue;
        }
        let rtt = match condition.jitter {
            Some((lo, hi)) => condition.rtt.mul_f64(rng.gen_range(lo..hi)),
            None => condition.rtt,
        };
        events.push(TraceEvent::Ack {
            rtt_us: rtt.as_micros() as u64,
            acked: segment,
        });
    }
    events
}

pub fn run(config: SimulateConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let controller_config = config.controller.load()?;
    let mut rng = SmallRng::seed_from_u64(config.seed);
    let events = generate(
        config.condition.condition(),
        config.acks,
        controller_config.segment_size,
        config.spurious_rate,
        &mut rng,
    );
    tracing::info!(
        condition = ?config.condition,
        seed = config.seed,
        events = events.len(),
        "Generated trace"
    );

    if config.emit_trace {
        for event in &events {
            serde_json::to_writer(&mut *out, event)?;
            writeln!(out)?;
        }
        return Ok(());
    }

    let summary = replay(controller_config, &config.window, &events, false, out)?;
    serde_json::to_writer(&mut *out, &summary)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_trace() {
        let condition = PathPreset::LossyWireless.condition();
        let a = generate(condition, 500, 1448, 0.5, &mut SmallRng::seed_from_u64(3));
        let b = generate(condition, 500, 1448, 0.5, &mut SmallRng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn lossless_preset_only_acks() {
        let events = generate(
            PathPreset::Lan.condition(),
            100,
            1448,
            0.0,
            &mut SmallRng::seed_from_u64(0),
        );
        assert_eq!(events.len(), 100);
        assert!(events.iter().all(|event| *event
            == TraceEvent::Ack {
                rtt_us: 1_000,
                acked: 1448
            }));
    }

    #[test]
    fn jitter_stays_within_preset() {
        let condition = PathPreset::Intercontinental.condition();
        let events = generate(condition, 1_000, 1448, 0.0, &mut SmallRng::seed_from_u64(9));
        for event in events {
            if let TraceEvent::Ack { rtt_us, .. } = event {
                assert!((107_000..=163_000).contains(&rtt_us), "{rtt_us}");
            }
        }
    }
}
