use std::path::PathBuf;

use entropy_cc::{ControllerConfig, Tier};
use tracing::level_filters::LevelFilter;

use crate::simulate::PathPreset;
use crate::Error;

#[derive(clap::Parser, Clone)]
#[clap(name = "cc-replay")]
#[clap(version)]
pub struct Config {
    #[clap(subcommand)]
    pub sub_command: SubCommand,
    /// Log level; defaults to debug in debug builds, info otherwise.
    #[arg(long, global = true, env = "CC_LOG_LEVEL")]
    pub log_level: Option<LevelFilter>,
}

#[derive(clap::Subcommand, Clone)]
pub enum SubCommand {
    Run(RunConfig),
    Simulate(SimulateConfig),
    Info(InfoConfig),
}

/// Controller selection shared by every subcommand.
#[derive(clap::Args, Clone, Debug)]
pub struct ControllerArgs {
    /// Built-in preset to start from.
    #[arg(long, default_value = "standard")]
    pub tier: Tier,
    /// TOML file overlaid on the preset named by its `tier` key. Takes
    /// precedence over `--tier`.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Count the window in segments instead of bytes.
    #[arg(long)]
    pub segment_units: bool,
}

impl ControllerArgs {
    pub fn load(&self) -> anyhow::Result<ControllerConfig> {
        let config = match &self.config {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|err| {
                    Error::MissConfiguration(format!("reading {}: {err}", path.display()).into())
                })?;
                ControllerConfig::from_toml_str(&contents)?
            }
            None if self.segment_units => ControllerConfig::segment_units(self.tier),
            None => self.tier.config(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Host window state when the connection is established.
#[derive(clap::Args, Clone, Debug)]
pub struct WindowArgs {
    /// Initial window; ten segments when omitted.
    #[arg(long)]
    pub initial_cwnd: Option<u32>,
    /// Initial host slow-start threshold.
    #[arg(long, default_value_t = entropy_cc::config::INFINITE_SSTHRESH)]
    pub initial_ssthresh: u32,
}

/// Replay a recorded host event trace.
///
/// The trace is JSON lines, one event per line:
/// `{"ack":{"rtt_us":12000,"acked":1448}}`, `"loss"`, `"timeout"`, `"undo"`
/// or `"idle"`.
#[derive(clap::Parser, Clone, Debug)]
pub struct RunConfig {
    /// Trace file; `-` reads stdin.
    #[arg(long)]
    pub trace: PathBuf,
    #[clap(flatten)]
    pub controller: ControllerArgs,
    #[clap(flatten)]
    pub window: WindowArgs,
    /// Print a record for every event, not only window changes.
    #[arg(long)]
    pub verbose: bool,
}

/// Generate a synthetic trace over a simulated path and replay it.
#[derive(clap::Parser, Clone, Debug)]
pub struct SimulateConfig {
    #[arg(long, value_enum, default_value_t = PathPreset::Continental)]
    pub condition: PathPreset,
    /// Acknowledgments to generate.
    #[arg(long, default_value_t = 10_000)]
    pub acks: usize,
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
    /// Fraction of reductions later judged spurious and undone.
    #[arg(long, default_value_t = 0.0)]
    pub spurious_rate: f64,
    /// Print the generated trace instead of replaying it.
    #[arg(long)]
    pub emit_trace: bool,
    #[clap(flatten)]
    pub controller: ControllerArgs,
    #[clap(flatten)]
    pub window: WindowArgs,
}

/// Print tier parameters and the per-connection state size.
#[derive(clap::Parser, Clone, Debug)]
pub struct InfoConfig {
    /// Only this tier; all tiers when omitted.
    #[arg(long)]
    pub tier: Option<Tier>,
    /// Print the full configuration as TOML.
    #[arg(long)]
    pub toml: bool,
}
