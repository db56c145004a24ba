//! Controller configuration, tier presets and tuning constants.
//!
//! A [`Tier`] is a named bundle of precision/performance parameters. Every
//! tier expands into a plain [`ControllerConfig`], which is what the
//! controller actually consumes; tiers are therefore a configuration choice,
//! never a separate code path.
//!
//! ## Loading from TOML
//!
//! [`ControllerConfig::from_toml_str`] reads the `tier` key first, expands
//! that preset, and then overlays every other key found in the document:
//!
//! ```toml
//! tier = "quantized"
//! batch_size = 8
//!
//! [plasticity]
//! loss_boost = 180
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Fixed-point scale of every bounded score (Q10, `1024 == 1.0`).
pub const SCALE: u16 = 1024;

/// Per-connection private storage the host sets aside for a controller.
pub const HOST_PRIVATE_STORAGE_CEILING: usize = 104;

/// Storage reserved for RTT history; tiers use 8 or 16 slots of it.
pub const MAX_HISTORY: usize = 16;

/// Hidden units of the scoring network.
pub const HIDDEN_UNITS: usize = 4;

/// Inputs fed to the scoring network.
pub const NETWORK_INPUTS: usize = 6;

/// Samples needed before an entropy estimate is trusted.
pub const MIN_ENTROPY_SAMPLES: usize = 8;

/// Threshold hosts install for themselves once the controller owns slow start.
pub const INFINITE_SSTHRESH: u32 = 0x7fff_ffff;

/// Default segment size for byte-counting hosts.
pub const DEFAULT_SEGMENT_SIZE: u32 = 1448;

/// Growth signal assumed before the network has ever run (0.5).
pub(crate) const INITIAL_GROWTH_SIGNAL: u16 = SCALE / 2;

/// Additive-increase shift while congestion is believed real.
pub(crate) const CONSERVATIVE_SHIFT: u32 = 11;

/// Additive-increase shift while jitter is believed to be noise.
pub(crate) const AGGRESSIVE_SHIFT: u32 = 10;

/// Reduction divisor when recent entropy says the loss was likely noise.
pub(crate) const NOISY_LOSS_DIVISOR: u32 = 3;

/// Reduction divisor for a loss that looks real.
pub(crate) const REAL_LOSS_DIVISOR: u32 = 2;

/// Precision/performance tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum Tier {
    /// Q10 fixed-point network, 8-sample window, table entropy, compute elision.
    #[default]
    Standard,
    /// 16-sample window and 16 bins with bit-length logarithms; no elision.
    HighFidelity,
    /// Q7 network with byte-sized history at 32µs resolution.
    Quantized,
    /// Bit-transition entropy feeding the Q7 network; the cheapest tier.
    Minimal,
}

impl Tier {
    pub const ALL: [Tier; 4] = [
        Tier::Standard,
        Tier::HighFidelity,
        Tier::Quantized,
        Tier::Minimal,
    ];

    /// Expand the preset into a full configuration.
    pub fn config(self) -> ControllerConfig {
        let standard = ControllerConfig {
            tier: Tier::Standard,
            history_capacity: 8,
            history_resolution_us: 1_000,
            history_ceiling: u16::MAX,
            entropy: EntropyStrategy::Histogram {
                bins: 8,
                log: LogApprox::Table,
            },
            network: NetworkKind::FixedPoint,
            batch_size: 16,
            entropy_threshold: 716,
            plasticity: PlasticityConfig::default(),
            elision: ElisionConfig::default(),
            segment_size: DEFAULT_SEGMENT_SIZE,
            min_cwnd: 2 * DEFAULT_SEGMENT_SIZE,
            max_cwnd: INFINITE_SSTHRESH,
        };

        match self {
            Tier::Standard => standard,
            Tier::HighFidelity => ControllerConfig {
                tier: Tier::HighFidelity,
                history_capacity: 16,
                entropy: EntropyStrategy::Histogram {
                    bins: 16,
                    log: LogApprox::BitLength,
                },
                batch_size: 8,
                elision: ElisionConfig::disabled(),
                ..standard
            },
            Tier::Quantized => ControllerConfig {
                tier: Tier::Quantized,
                history_resolution_us: 32,
                history_ceiling: u8::MAX as u16,
                network: NetworkKind::Quantized,
                entropy_threshold: 723,
                plasticity: PlasticityConfig {
                    base: 305,
                    floor: 100,
                    ceiling: SCALE,
                    decay: Decay::Linear { step: 4 },
                    loss_boost: 161,
                    recovery_boost: 201,
                },
                elision: ElisionConfig {
                    enabled: true,
                    entropy_below: 514,
                    plasticity_above: 803,
                    max_skips: 16,
                },
                ..standard
            },
            Tier::Minimal => ControllerConfig {
                tier: Tier::Minimal,
                entropy: EntropyStrategy::BitTransition,
                elision: ElisionConfig::disabled(),
                ..Tier::Quantized.config()
            },
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Standard => write!(f, "standard"),
            Tier::HighFidelity => write!(f, "high-fidelity"),
            Tier::Quantized => write!(f, "quantized"),
            Tier::Minimal => write!(f, "minimal"),
        }
    }
}

impl FromStr for Tier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .into_iter()
            .find(|tier| tier.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownTier(s.to_owned()))
    }
}

/// How RTT unpredictability is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EntropyStrategy {
    /// Shannon entropy over a histogram of the RTT window.
    Histogram { bins: u8, log: LogApprox },
    /// Direction changes in an 8-bit RTT trend register.
    BitTransition,
}

/// Integer approximation of `log2` used by the histogram strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogApprox {
    /// Precomputed entropy terms by bin occupancy; window of exactly 8.
    Table,
    /// Highest set bit plus a linear mantissa; any window.
    BitLength,
}

/// Precision of the scoring network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkKind {
    /// Q10 weights with table-driven tanh and sigmoid.
    FixedPoint,
    /// Q7 `i8` weights with a linear output ramp.
    Quantized,
}

/// Plasticity decay per ack cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Decay {
    /// `p = p * factor / SCALE`.
    Multiplicative { factor: u16 },
    /// `p = p - step`.
    Linear { step: u16 },
}

/// Plasticity bounds and event increments, all Q10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlasticityConfig {
    /// Starting value, restored on idle restart.
    pub base: u16,
    pub floor: u16,
    pub ceiling: u16,
    pub decay: Decay,
    /// Added on a window reduction request.
    pub loss_boost: u16,
    /// Added on entry into loss recovery; a stronger signal than plain loss.
    pub recovery_boost: u16,
}

impl Default for PlasticityConfig {
    fn default() -> Self {
        Self {
            base: 307,                                    // 0.3
            floor: 100,                                   // ~0.1
            ceiling: SCALE,                               // 1.0
            decay: Decay::Multiplicative { factor: 1019 }, // ~0.995
            loss_boost: 100,
            recovery_boost: 150,
        }
    }
}

/// Compute elision: reuse the last growth signal while the path looks stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElisionConfig {
    pub enabled: bool,
    /// Entropy must be strictly below this.
    pub entropy_below: u16,
    /// Plasticity must be strictly above this.
    pub plasticity_above: u16,
    /// Consecutive reuses before the network must run again.
    pub max_skips: u8,
}

impl ElisionConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for ElisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            entropy_below: 500,
            plasticity_above: 800,
            max_skips: 8,
        }
    }
}

/// Full controller configuration.
///
/// Window quantities are in host units: bytes for byte-counting hosts, or
/// segments when built with [`ControllerConfig::segment_units`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Preset this configuration was expanded from.
    pub tier: Tier,
    /// RTT window size (8 or 16).
    pub history_capacity: u8,
    /// Microseconds per stored history unit.
    pub history_resolution_us: u32,
    /// Largest storable history value.
    pub history_ceiling: u16,
    pub entropy: EntropyStrategy,
    pub network: NetworkKind,
    /// Packets between entropy recomputations.
    pub batch_size: u16,
    /// Entropy above this is treated as noise rather than congestion.
    pub entropy_threshold: u16,
    pub plasticity: PlasticityConfig,
    pub elision: ElisionConfig,
    /// Host units per segment; the additive-increase step.
    pub segment_size: u32,
    /// Floor for both window and threshold.
    pub min_cwnd: u32,
    /// Ceiling for window growth.
    pub max_cwnd: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Tier::Standard.config()
    }
}

impl ControllerConfig {
    pub fn new(tier: Tier) -> Self {
        tier.config()
    }

    /// Preset for hosts that count the window in segments.
    pub fn segment_units(tier: Tier) -> Self {
        Self {
            segment_size: 1,
            min_cwnd: 2,
            ..tier.config()
        }
    }

    pub fn with_segment_size(mut self, segment_size: u32) -> Self {
        self.segment_size = segment_size;
        self.min_cwnd = segment_size.saturating_mul(2);
        self
    }

    pub fn with_min_cwnd(mut self, min_cwnd: u32) -> Self {
        self.min_cwnd = min_cwnd;
        self
    }

    pub fn with_max_cwnd(mut self, max_cwnd: u32) -> Self {
        self.max_cwnd = max_cwnd;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u16) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_entropy_threshold(mut self, threshold: u16) -> Self {
        self.entropy_threshold = threshold;
        self
    }

    pub fn with_elision(mut self, elision: ElisionConfig) -> Self {
        self.elision = elision;
        self
    }

    /// Parse a TOML document, overlaying its keys on the preset named by `tier`.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let overrides: toml::Table = toml::from_str(s)?;
        let tier: Tier = match overrides.get("tier") {
            Some(value) => value.clone().try_into()?,
            None => Tier::default(),
        };

        let mut merged = toml::Value::try_from(tier.config())?;
        if let toml::Value::Table(table) = &mut merged {
            merge_tables(table, overrides);
        }
        let config: ControllerConfig = merged.try_into()?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject parameter combinations the controller cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.history_capacity, 8 | 16) {
            return Err(ConfigError::InvalidHistoryCapacity(self.history_capacity));
        }
        if let EntropyStrategy::Histogram { bins, log } = self.entropy {
            if !matches!(bins, 8 | 16) {
                return Err(ConfigError::InvalidBinCount(bins));
            }
            if log == LogApprox::Table && self.history_capacity != 8 {
                return Err(ConfigError::TableNeedsWindowOfEight {
                    capacity: self.history_capacity,
                });
            }
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.history_resolution_us == 0 {
            return Err(ConfigError::ZeroResolution);
        }
        if self.history_ceiling == 0 {
            return Err(ConfigError::ZeroHistoryCeiling);
        }
        if self.entropy_threshold > SCALE {
            return Err(ConfigError::ThresholdOutOfRange(self.entropy_threshold));
        }

        let p = &self.plasticity;
        if !(p.floor <= p.base && p.base <= p.ceiling && p.ceiling <= SCALE) {
            return Err(ConfigError::PlasticityBounds {
                floor: p.floor,
                base: p.base,
                ceiling: p.ceiling,
            });
        }
        match p.decay {
            Decay::Multiplicative { factor } if factor == 0 || factor >= SCALE => {
                return Err(ConfigError::InvalidDecay(p.decay));
            }
            Decay::Linear { step: 0 } => return Err(ConfigError::InvalidDecay(p.decay)),
            _ => {}
        }

        if self.segment_size == 0 {
            return Err(ConfigError::ZeroSegmentSize);
        }
        if self.min_cwnd == 0 || self.max_cwnd < self.min_cwnd {
            return Err(ConfigError::WindowBounds {
                min_cwnd: self.min_cwnd,
                max_cwnd: self.max_cwnd,
            });
        }
        Ok(())
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
