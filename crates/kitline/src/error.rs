//! Error types for configuration validation and simulation setup.

use crate::config::{MAX_CELLS, MAX_POSITIONS};
use thiserror::Error;

/// Rejections produced by [`SimConfig::validate`](crate::SimConfig::validate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// At least one dispenser is required to feed the belt.
    #[error("dispenser count must be positive")]
    NoDispensers,

    /// Cell count outside the supported range.
    #[error("cell count must be between 1 and {max}", max = MAX_CELLS)]
    CellCount,

    /// The belt must be long enough to give every cell a distinct position.
    #[error("belt length must be between {min} and {max}", max = MAX_POSITIONS)]
    BeltLength {
        /// Minimum admissible length for the requested cell count.
        min: usize,
    },

    /// The belt has to advance.
    #[error("belt velocity must be positive")]
    NoVelocity,

    /// A set with zero parts of every kind can never be assembled.
    #[error("a set must require at least one part")]
    EmptySet,

    /// One part per dispenser per tick must fit in the head slot.
    #[error("dispenser count {dispensers} exceeds slot capacity {capacity}")]
    HeadOverCapacity {
        dispensers: usize,
        capacity: usize,
    },
}

/// Errors surfaced by [`Simulation`](crate::Simulation).
#[derive(Debug, Error)]
pub enum SimError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A worker thread could not be spawned.
    #[error("failed to spawn {worker} worker")]
    Spawn {
        worker: String,
        #[source]
        source: std::io::Error,
    },
}
