//! Trace replay through the host adapter.

use std::io::{BufRead, BufReader, Write};
use std::time::Duration;

use entropy_cc::host::CaState;
use entropy_cc::{
    CongestionOps, Connection, ControllerConfig, DiagnosticSnapshot, EntropyOps, HostConnection,
    VegasInfo,
};
use serde::{Deserialize, Serialize};

use crate::config::{RunConfig, WindowArgs};
use crate::Error;

/// One host event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEvent {
    Ack { rtt_us: u64, acked: u32 },
    /// Loss detected by duplicate acks.
    Loss,
    /// Retransmission timeout.
    Timeout,
    /// The last reduction was spurious.
    Undo,
    /// Window restart after idle.
    Idle,
}

#[derive(Debug, Serialize)]
struct StepRecord<'a> {
    step: usize,
    event: &'a TraceEvent,
    cwnd: u32,
    ssthresh: u32,
    ca_state: CaState,
    entropy: u16,
    plasticity: u16,
    growth_signal: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub events: usize,
    pub acks: usize,
    pub reductions: usize,
    pub final_cwnd: u32,
    pub max_cwnd: u32,
    pub snapshot: DiagnosticSnapshot,
    pub info: VegasInfo,
}

pub fn run(config: RunConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let controller_config = config.controller.load()?;
    let events = if config.trace.as_os_str() == "-" {
        parse_trace(std::io::stdin().lock())?
    } else {
        let file = std::fs::File::open(&config.trace).map_err(|err| {
            Error::MissConfiguration(
                format!("opening trace {}: {err}", config.trace.display()).into(),
            )
        })?;
        parse_trace(BufReader::new(file))?
    };
    tracing::info!(
        trace = %config.trace.display(),
        events = events.len(),
        tier = %controller_config.tier,
        "Replaying trace"
    );

    let summary = replay(
        controller_config,
        &config.window,
        &events,
        config.verbose,
        out,
    )?;
    serde_json::to_writer(&mut *out, &summary)?;
    writeln!(out)?;
    Ok(())
}

/// Parse JSON-lines events, skipping blank lines and `#` comments.
pub fn parse_trace(reader: impl BufRead) -> anyhow::Result<Vec<TraceEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event = serde_json::from_str(line).map_err(|source| Error::TraceLine {
            line: index + 1,
            source,
        })?;
        events.push(event);
    }
    Ok(events)
}

/// Drive `events` through a fresh connection, writing one JSON record per
/// window change (or per event when `verbose`).
pub fn replay(
    config: ControllerConfig,
    window: &WindowArgs,
    events: &[TraceEvent],
    verbose: bool,
    out: &mut impl Write,
) -> anyhow::Result<ReplaySummary> {
    let segment = config.segment_size;
    let ops = EntropyOps::new(config)?;
    let initial_cwnd = window
        .initial_cwnd
        .unwrap_or(10 * segment)
        .max(ops.controller().config().min_cwnd);
    let host = HostConnection::new(initial_cwnd, window.initial_ssthresh, segment);
    let mut conn = Connection::establish(&ops, host);

    let mut acks = 0;
    let mut reductions = 0;
    let mut max_cwnd = conn.cwnd();
    for (step, event) in events.iter().enumerate() {
        let before = (conn.host().cwnd, conn.host().ssthresh);
        match *event {
            TraceEvent::Ack { rtt_us, acked } => {
                acks += 1;
                conn.ack(Duration::from_micros(rtt_us), acked);
            }
            TraceEvent::Loss => {
                reductions += 1;
                conn.fast_retransmit();
            }
            TraceEvent::Timeout => {
                reductions += 1;
                conn.retransmit_timeout();
            }
            TraceEvent::Undo => {
                conn.undo();
            }
            TraceEvent::Idle => conn.idle_restart(),
        }
        max_cwnd = max_cwnd.max(conn.cwnd());

        let after = (conn.host().cwnd, conn.host().ssthresh);
        if verbose || before != after {
            let snapshot = ops.controller().snapshot(conn.private());
            let record = StepRecord {
                step,
                event,
                cwnd: after.0,
                ssthresh: after.1,
                ca_state: conn.host().ca_state,
                entropy: snapshot.entropy_score,
                plasticity: snapshot.plasticity,
                growth_signal: snapshot.growth_signal,
            };
            serde_json::to_writer(&mut *out, &record)?;
            writeln!(out)?;
        }
    }

    let summary = ReplaySummary {
        events: events.len(),
        acks,
        reductions,
        final_cwnd: conn.cwnd(),
        max_cwnd,
        snapshot: ops.controller().snapshot(conn.private()),
        info: ops.get_info(conn.private()),
    };
    tracing::info!(
        events = summary.events,
        reductions,
        final_cwnd = summary.final_cwnd,
        max_cwnd,
        "Replay finished"
    );
    Ok(summary)
}
