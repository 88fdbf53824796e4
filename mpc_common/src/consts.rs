//! System-wide constants for the MPC bridge workspace.
//!
//! Single source of truth for capacities and defaults. Both the controller and
//! the solver process build their shared segment layout from these values, so
//! they must never be duplicated elsewhere.

use static_assertions::{const_assert, const_assert_eq};

/// Maximum number of actuated joints.
pub const MAX_JOINTS: usize = 16;

/// Maximum state dimension (position + velocity per joint).
pub const MAX_STATE_DIM: usize = 2 * MAX_JOINTS;

/// Maximum number of entries of the feedback gain matrix.
pub const MAX_GAIN_LEN: usize = MAX_JOINTS * MAX_STATE_DIM;

/// Dimension of the task-space target (end-effector position).
pub const TARGET_DIM: usize = 3;

/// Capacity of the robot description text field in bytes.
pub const DESCRIPTION_CAPACITY: usize = 64 * 1024;

/// Default shared segment name.
pub const DEFAULT_SEGMENT_NAME: &str = "crocoddyl_shm";

/// Default control period in microseconds (1 kHz).
pub const DEFAULT_CYCLE_TIME_US: u64 = 1000;

/// Default OCP node spacing in seconds.
pub const DEFAULT_OCP_TIME_STEP: f64 = 0.01;

/// Default solver loop rate in Hz.
pub const DEFAULT_SOLVER_FREQUENCY: f64 = 200.0;

/// Window length of the rolling statistics buffers.
pub const STATS_WINDOW: usize = 20;

/// Default task-space target used before any external command arrives.
pub const DEFAULT_TARGET: [f64; TARGET_DIM] = [0.8, 0.0, 0.8];

const_assert_eq!(MAX_GAIN_LEN, MAX_JOINTS * MAX_STATE_DIM);
const_assert!(DESCRIPTION_CAPACITY >= 4096);
const_assert_eq!(DESCRIPTION_CAPACITY % 8, 0);
