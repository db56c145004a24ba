use thiserror::Error;

/// Rejected controller configuration.
///
/// The event path never fails; every invalid combination of tier parameters
/// is caught here, when the controller is built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("history capacity must be 8 or 16, got {0}")]
    InvalidHistoryCapacity(u8),

    #[error("histogram bin count must be 8 or 16, got {0}")]
    InvalidBinCount(u8),

    #[error("table log approximation needs a history capacity of 8, got {capacity}")]
    TableNeedsWindowOfEight { capacity: u8 },

    #[error("batch size must be non-zero")]
    ZeroBatchSize,

    #[error("history resolution must be non-zero")]
    ZeroResolution,

    #[error("history ceiling must be non-zero")]
    ZeroHistoryCeiling,

    #[error("entropy threshold {0} exceeds the score scale")]
    ThresholdOutOfRange(u16),

    #[error("plasticity bounds out of order: floor {floor}, base {base}, ceiling {ceiling}")]
    PlasticityBounds { floor: u16, base: u16, ceiling: u16 },

    #[error("plasticity decay must shrink the value, got {0:?}")]
    InvalidDecay(crate::config::Decay),

    #[error("segment size must be non-zero")]
    ZeroSegmentSize,

    #[error("window bounds out of order: min {min_cwnd}, max {max_cwnd}")]
    WindowBounds { min_cwnd: u32, max_cwnd: u32 },

    #[error("unknown tier: {0}")]
    UnknownTier(String),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}
