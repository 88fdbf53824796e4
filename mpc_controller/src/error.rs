//! Controller error types.
//!
//! Everything here is fatal for the controller process: configuration and
//! segment errors at startup, hardware I/O and lock-primitive failures at run
//! time. Solver-side problems (missing, stale or torn law) are not errors; the
//! tick falls back to the safe command instead.

use mpc_common::config::ConfigError;
use mpc_common::description::DescriptionError;
use mpc_common::law::DimensionError;
use mpc_shared_memory::ShmError;
use thiserror::Error;

use crate::hardware::HardwareError;
use crate::telemetry::TelemetryError;

/// Errors raised by [`ControllerLoop`](crate::controller::ControllerLoop).
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Segment attach or lock failure
    #[error("Shared memory error: {0}")]
    Shm(#[from] ShmError),

    /// Hardware read/write failure
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),

    /// Published robot description does not declare a configured joint
    #[error("Robot description mismatch: {0}")]
    Description(#[from] DescriptionError),

    /// Vector sized for the wrong dimensions
    #[error("Dimension error: {0}")]
    Dimension(#[from] DimensionError),

    /// Telemetry writer failure
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// Segment opened for a different joint count than the configuration
    #[error("Segment has {segment} joints, configuration has {config}")]
    DimsMismatch {
        /// Joint count from the configuration
        config: usize,
        /// Joint count of the opened segment
        segment: usize,
    },
}
