//! Solver loop error types.
//!
//! Only startup and communication failures are errors. A failed solve is
//! reported through [`StepOutcome::Failed`](crate::solver_loop::StepOutcome)
//! and keeps the previous law in place.

use mpc_common::config::ConfigError;
use mpc_common::description::DescriptionError;
use mpc_common::law::DimensionError;
use mpc_shared_memory::ShmError;
use thiserror::Error;

/// Fatal solver loop errors.
#[derive(Debug, Error)]
pub enum SolverLoopError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Segment attach, lock or write failure
    #[error("Shared memory error: {0}")]
    Shm(#[from] ShmError),

    /// Robot description does not declare a configured joint
    #[error("Robot description mismatch: {0}")]
    Description(#[from] DescriptionError),

    /// Vector sized for the wrong dimensions
    #[error("Dimension error: {0}")]
    Dimension(#[from] DimensionError),

    /// Robot description file could not be read
    #[error("Failed to read robot description: {0}")]
    Io(#[from] std::io::Error),

    /// Segment, configuration and solver disagree on the joint count
    #[error("{what} has {found} joints, configuration has {expected}")]
    DimsMismatch {
        /// Component with the wrong size
        what: &'static str,
        /// Joint count from the configuration
        expected: usize,
        /// Joint count found
        found: usize,
    },
}
