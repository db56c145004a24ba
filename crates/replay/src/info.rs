use std::io::Write;

use entropy_cc::config::{EntropyStrategy, HOST_PRIVATE_STORAGE_CEILING};
use entropy_cc::{ConnectionState, Tier};

use crate::config::InfoConfig;

pub fn print(config: InfoConfig, out: &mut impl Write) -> anyhow::Result<()> {
    writeln!(
        out,
        "per-connection state: {} of {} bytes",
        std::mem::size_of::<ConnectionState>(),
        HOST_PRIVATE_STORAGE_CEILING
    )?;

    let tiers = match config.tier {
        Some(tier) => vec![tier],
        None => Tier::ALL.to_vec(),
    };
    for tier in tiers {
        let preset = tier.config();
        writeln!(out)?;
        if config.toml {
            writeln!(out, "# {tier}")?;
            write!(out, "{}", preset.to_toml_string()?)?;
            continue;
        }
        let entropy = match preset.entropy {
            EntropyStrategy::Histogram { bins, log } => format!("histogram/{bins} ({log:?})"),
            EntropyStrategy::BitTransition => "bit-transition".to_owned(),
        };
        writeln!(
            out,
            r#"{tier}
  history:    {} samples, {}us resolution
  entropy:    {entropy}, batch {}, threshold {}
  network:    {:?}
  plasticity: base {} in [{}, {}], {:?}
  elision:    {}"#,
            preset.history_capacity,
            preset.history_resolution_us,
            preset.batch_size,
            preset.entropy_threshold,
            preset.network,
            preset.plasticity.base,
            preset.plasticity.floor,
            preset.plasticity.ceiling,
            preset.plasticity.decay,
            if preset.elision.enabled {
                format!(
                    "up to {} skips below entropy {}",
                    preset.elision.max_skips, preset.elision.entropy_below
                )
            } else {
                "off".to_owned()
            },
        )?;
    }
    Ok(())
}
