use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing::level_filters::LevelFilter;

mod config;
mod info;
mod replay;
mod simulate;

use crate::config::{Config, SubCommand};

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("Configuration error: {0}")]
    MissConfiguration(Cow<'static, str>),
    #[error("trace line {line}: {source}")]
    TraceLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

fn main() -> Result<(), anyhow::Error> {
    let config = Config::parse();
    set_logger(config.log_level);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match config.sub_command {
        SubCommand::Run(run_config) => replay::run(run_config, &mut out),
        SubCommand::Simulate(sim_config) => simulate::run(sim_config, &mut out),
        SubCommand::Info(info_config) => info::print(info_config, &mut out),
    }
}

/// Install the global subscriber once. Logs go to stderr; stdout carries the
/// JSON output.
fn set_logger(level: Option<LevelFilter>) {
    static LOGGER_SET: AtomicBool = AtomicBool::new(false);
    if LOGGER_SET
        .compare_exchange(false, true, Ordering::Release, Ordering::SeqCst)
        .is_err()
    {
        return;
    }

    let default_filter = if cfg!(debug_assertions) {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter_layer = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(level.unwrap_or(default_filter).into())
        .with_env_var("CC_LOG")
        .from_env_lossy();

    let json = std::env::var("CC_LOG_FORMAT").is_ok_and(|format| format == "json");
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter_layer)
        .with_writer(std::io::stderr)
        .with_level(true);
    let result = if json {
        builder.json().try_init()
    } else if cfg!(debug_assertions) {
        builder.with_file(true).with_line_number(true).try_init()
    } else {
        builder.try_init()
    };
    if let Err(err) = result {
        eprintln!("failed tracing initialization: {err}");
    }
}
