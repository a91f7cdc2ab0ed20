//! Error types for the simulation core.
//!
//! The tick path never fails: stale handles, budget pressure and out-of-bounds
//! targets all degrade to no-ops or fallbacks. Configuration is the only
//! fallible surface.

use thiserror::Error;

/// Errors raised while loading or validating a [`SimConfig`](crate::systems::SimConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration value that cannot be used (e.g. non-positive cell size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
