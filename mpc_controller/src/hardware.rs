//! Hardware interface and actuator command types.
//!
//! The controller never talks to drives directly. The host framework (or the
//! built-in [`SimulatedArm`](crate::sim::SimulatedArm)) implements
//! [`HardwareInterface`]; the controller reads one [`JointState`] and writes
//! one [`ActuatorCommand`] per tick.
//!
//! # Timing Contracts
//!
//! | Operation | Max Duration | RT Constraint |
//! |-----------|--------------|---------------|
//! | `read_state()` | small fraction of the period | **HARD** |
//! | `write_command()` | small fraction of the period | **HARD** |

use heapless::Vec as FixedVec;
use mpc_common::config::CommandMode;
use mpc_common::consts::MAX_JOINTS;
use mpc_common::law::{Dimensions, JointState};
use thiserror::Error;

/// Error types for hardware access.
#[derive(Debug, Clone, Error)]
pub enum HardwareError {
    /// Reading joint state failed
    #[error("Joint state read failed: {0}")]
    ReadFailed(String),

    /// Writing the command failed
    #[error("Command write failed: {0}")]
    WriteFailed(String),

    /// Interface joint count differs from the configuration
    #[error("Hardware exposes {actual} joints, configuration expects {expected}")]
    JointCountMismatch {
        /// Configured joint count
        expected: usize,
        /// Joint count exposed by the hardware
        actual: usize,
    },
}

/// Per-joint command written to the hardware each tick.
///
/// In [`CommandMode::Effort`] only `effort` is meaningful. In
/// [`CommandMode::Chained`] the downstream joint controller applies
/// `effort + kp·(position − q) + kd·(velocity − v)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorCommand {
    /// Channels carried by this command
    pub mode: CommandMode,
    /// Effort [Nm], or current [A] when a torque constant is configured
    pub effort: FixedVec<f64, MAX_JOINTS>,
    /// Position reference [rad] (chained mode)
    pub position: FixedVec<f64, MAX_JOINTS>,
    /// Velocity reference [rad/s] (chained mode)
    pub velocity: FixedVec<f64, MAX_JOINTS>,
    /// Position gain (chained mode)
    pub kp: FixedVec<f64, MAX_JOINTS>,
    /// Velocity gain (chained mode)
    pub kd: FixedVec<f64, MAX_JOINTS>,
}

impl ActuatorCommand {
    /// Zero command for `dims`
    pub fn zeros(dims: Dimensions, mode: CommandMode) -> Self {
        Self {
            mode,
            effort: dims.joint_zeros(),
            position: dims.joint_zeros(),
            velocity: dims.joint_zeros(),
            kp: dims.joint_zeros(),
            kd: dims.joint_zeros(),
        }
    }

    /// Reset to the safe default: zero effort, zero gains, references held
    /// at the measured state so a chained controller does not pull.
    pub fn set_safe(&mut self, state: &JointState) {
        self.effort.iter_mut().for_each(|e| *e = 0.0);
        self.kp.iter_mut().for_each(|k| *k = 0.0);
        self.kd.iter_mut().for_each(|k| *k = 0.0);
        self.position.copy_from_slice(&state.position);
        self.velocity.iter_mut().for_each(|v| *v = 0.0);
    }

    /// True if every channel is zero except held references
    pub fn is_zero_effort(&self) -> bool {
        self.effort.iter().all(|e| *e == 0.0)
            && self.kp.iter().all(|k| *k == 0.0)
            && self.kd.iter().all(|k| *k == 0.0)
    }
}

/// Interface to the joints driven by the controller.
pub trait HardwareInterface {
    /// Number of joints exposed
    fn joint_count(&self) -> usize;

    /// Read position, velocity and effort of every joint into `state`.
    fn read_state(&mut self, state: &mut JointState) -> Result<(), HardwareError>;

    /// Apply `command` to the joints.
    fn write_command(&mut self, command: &ActuatorCommand) -> Result<(), HardwareError>;
}

impl<H: HardwareInterface + ?Sized> HardwareInterface for &mut H {
    fn joint_count(&self) -> usize {
        (**self).joint_count()
    }

    fn read_state(&mut self, state: &mut JointState) -> Result<(), HardwareError> {
        (**self).read_state(state)
    }

    fn write_command(&mut self, command: &ActuatorCommand) -> Result<(), HardwareError> {
        (**self).write_command(command)
    }
}
