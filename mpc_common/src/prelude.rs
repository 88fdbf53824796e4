//! Prelude module for common re-exports.
//!
//! ```rust
//! use mpc_common::prelude::*;
//! ```

use std::time::Duration;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    load_bridge_config, BridgeConfig, CommandMode, ConfigError, ConfigLoader, LogLevel,
    SafeCommandPolicy, SharedConfig,
};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{MAX_JOINTS, MAX_STATE_DIM, STATS_WINDOW, TARGET_DIM};

// ─── Control law ────────────────────────────────────────────────────
pub use crate::law::{ControlLaw, DimensionError, Dimensions, JointState};

// ─── Statistics ─────────────────────────────────────────────────────
pub use crate::stats::RingStats;

/// Default control period as Duration.
pub const DEFAULT_CYCLE_TIME: Duration =
    Duration::from_micros(crate::consts::DEFAULT_CYCLE_TIME_US);
