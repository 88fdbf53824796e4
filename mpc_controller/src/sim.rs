//! Simulated joints for running the controller without hardware.
//!
//! Each joint is a unit inertia with viscous damping, integrated with
//! semi-implicit Euler once per `write_command` call:
//!
//! ```text
//! τ  = effort                                   (effort mode)
//! τ  = effort + kp·(q_ref − q) + kd·(v_ref − v) (chained mode)
//! v += (τ − b·v)·dt
//! q += v·dt
//! ```

use heapless::Vec as FixedVec;
use mpc_common::config::CommandMode;
use mpc_common::consts::MAX_JOINTS;
use mpc_common::law::{Dimensions, JointState};

use crate::hardware::{ActuatorCommand, HardwareError, HardwareInterface};

/// Default viscous damping [Nm·s/rad]
pub const DEFAULT_DAMPING: f64 = 0.5;

/// Unit-inertia joint chain.
#[derive(Debug, Clone)]
pub struct SimulatedArm {
    dt: f64,
    damping: f64,
    position: FixedVec<f64, MAX_JOINTS>,
    velocity: FixedVec<f64, MAX_JOINTS>,
    effort: FixedVec<f64, MAX_JOINTS>,
    steps: u64,
}

impl SimulatedArm {
    /// Arm at rest at zero, integrating with step `dt` [s].
    pub fn new(dims: Dimensions, dt: f64) -> Self {
        let state = JointState::zeros(dims);
        Self {
            dt,
            damping: DEFAULT_DAMPING,
            position: state.position,
            velocity: state.velocity,
            effort: state.effort,
            steps: 0,
        }
    }

    /// Override the damping coefficient.
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    /// Start at `position` instead of zero.
    pub fn with_position(mut self, position: &[f64]) -> Result<Self, HardwareError> {
        if position.len() != self.position.len() {
            return Err(HardwareError::JointCountMismatch {
                expected: self.position.len(),
                actual: position.len(),
            });
        }
        self.position.copy_from_slice(position);
        Ok(self)
    }

    /// Integration steps taken
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Current joint positions
    pub fn position(&self) -> &[f64] {
        &self.position
    }
}

impl HardwareInterface for SimulatedArm {
    fn joint_count(&self) -> usize {
        self.position.len()
    }

    fn read_state(&mut self, state: &mut JointState) -> Result<(), HardwareError> {
        if state.position.len() != self.position.len() {
            return Err(HardwareError::ReadFailed(format!(
                "state buffer sized for {} joints",
                state.position.len()
            )));
        }
        state.position.copy_from_slice(&self.position);
        state.velocity.copy_from_slice(&self.velocity);
        state.effort.copy_from_slice(&self.effort);
        Ok(())
    }

    fn write_command(&mut self, command: &ActuatorCommand) -> Result<(), HardwareError> {
        let n = self.position.len();
        if command.effort.len() != n {
            return Err(HardwareError::JointCountMismatch {
                expected: n,
                actual: command.effort.len(),
            });
        }
        for i in 0..n {
            let (q, v) = (self.position[i], self.velocity[i]);
            let tau = match command.mode {
                CommandMode::Effort => command.effort[i],
                CommandMode::Chained => {
                    command.effort[i]
                        + command.kp[i] * (command.position[i] - q)
                        + command.kd[i] * (command.velocity[i] - v)
                }
            };
            let v_next = v + (tau - self.damping * v) * self.dt;
            self.velocity[i] = v_next;
            self.position[i] = q + v_next * self.dt;
            self.effort[i] = tau;
        }
        self.steps += 1;
        Ok(())
    }
}
