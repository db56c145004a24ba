//! Entropy-aware congestion control.
//!
//! Each connection keeps a short window of RTT samples. The Shannon entropy
//! of that window separates congestion (steadily rising delay, low entropy)
//! from path noise (scattered delay, high entropy). A small fixed-weight
//! recurrent network turns entropy, delay and recent events into a growth
//! signal, and a bounded plasticity scalar modulates how aggressively the
//! connection adapts.
//!
//! [`EntropyController`] is shared and immutable; all mutable data lives in
//! the per-connection [`ConnectionState`]. Hosts bind the two through
//! [`host::CongestionOps`].

/// Fixed-point activation tables.
mod activation;

/// Tier presets and tunable parameters.
pub mod config;

/// Event handlers and the ack cycle.
pub mod controller;

/// Entropy estimators over the RTT history.
pub mod entropy;

pub mod errors;

/// Binding to a host's congestion-ops table.
pub mod host;

/// Recurrent growth-signal network.
pub mod network;

pub mod plasticity;

/// Per-connection state and its invariants.
pub mod state;

/// Diagnostics export.
pub mod stats;

/// RTT history ring and minimum RTT.
pub mod tracker;


pub use config::{ControllerConfig, Tier};
pub use controller::{EntropyController, WindowMutation};
pub use errors::ConfigError;
pub use host::{CongestionOps, Connection, EntropyOps, HostConnection};
pub use state::{ConnectionFlags, ConnectionState};
pub use stats::{DiagnosticSnapshot, VegasInfo};
