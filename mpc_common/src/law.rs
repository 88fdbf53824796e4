//! Control-law and state types shared by the controller and the solver.
//!
//! A [`ControlLaw`] is the output of one solve: feed-forward effort `us`, the
//! two reference states `xs0`/`xs1` bracketing the next OCP step, and the
//! row-major feedback gain `Ks` (`joint_count × state_dim`). Storage is
//! fixed-capacity so a law can be copied in and out of shared memory without
//! touching the heap.

use std::iter;

use heapless::Vec as FixedVec;
use static_assertions::const_assert;
use thiserror::Error;

use crate::consts::{MAX_GAIN_LEN, MAX_JOINTS, MAX_STATE_DIM};

// Any valid `Dimensions` fits these capacities.
const_assert!(MAX_STATE_DIM >= 2 * MAX_JOINTS);
const_assert!(MAX_GAIN_LEN >= MAX_JOINTS * MAX_STATE_DIM);

/// Errors raised when building or validating dimensioned data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DimensionError {
    /// Joint count of zero.
    #[error("joint count must be at least 1")]
    NoJoints,

    /// Joint count above the compiled capacity.
    #[error("joint count {joint_count} exceeds capacity {max}")]
    TooManyJoints {
        /// Requested joint count.
        joint_count: usize,
        /// Compiled capacity.
        max: usize,
    },

    /// A vector or matrix does not have the expected length.
    #[error("{field}: expected {expected} values, got {actual}")]
    LengthMismatch {
        /// Field name.
        field: &'static str,
        /// Expected number of values.
        expected: usize,
        /// Provided number of values.
        actual: usize,
    },

    /// A value is NaN or infinite.
    #[error("{field}: non-finite value at index {index}")]
    NonFinite {
        /// Field name.
        field: &'static str,
        /// First offending index.
        index: usize,
    },
}

/// Joint count and the state dimension derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    joint_count: usize,
}

impl Dimensions {
    /// Dimensions for `joint_count` joints (state = position + velocity).
    pub const fn new(joint_count: usize) -> Result<Self, DimensionError> {
        if joint_count == 0 {
            return Err(DimensionError::NoJoints);
        }
        if joint_count > MAX_JOINTS {
            return Err(DimensionError::TooManyJoints {
                joint_count,
                max: MAX_JOINTS,
            });
        }
        Ok(Self { joint_count })
    }

    /// Number of actuated joints.
    #[inline]
    pub const fn joint_count(&self) -> usize {
        self.joint_count
    }

    /// State dimension (`2 × joint_count`).
    #[inline]
    pub const fn state_dim(&self) -> usize {
        2 * self.joint_count
    }

    /// Number of gain matrix entries (`joint_count × state_dim`).
    #[inline]
    pub const fn gain_len(&self) -> usize {
        self.joint_count * self.state_dim()
    }

    /// Zero vector with one entry per joint.
    pub fn joint_zeros(&self) -> FixedVec<f64, MAX_JOINTS> {
        iter::repeat_n(0.0, self.joint_count()).collect()
    }

    /// Zero state vector (`state_dim` entries).
    pub fn state_zeros(&self) -> FixedVec<f64, MAX_STATE_DIM> {
        iter::repeat_n(0.0, self.state_dim()).collect()
    }

    /// Zero gain matrix (`gain_len` entries).
    pub fn gain_zeros(&self) -> FixedVec<f64, MAX_GAIN_LEN> {
        iter::repeat_n(0.0, self.gain_len()).collect()
    }
}

fn check_len(field: &'static str, values: &[f64], expected: usize) -> Result<(), DimensionError> {
    if values.len() != expected {
        return Err(DimensionError::LengthMismatch {
            field,
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}

fn check_finite(field: &'static str, values: &[f64]) -> Result<(), DimensionError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(DimensionError::NonFinite { field, index }),
        None => Ok(()),
    }
}

/// Measured joint state for one tick.
#[derive(Debug, Clone, Default)]
pub struct JointState {
    /// Joint positions [rad].
    pub position: FixedVec<f64, MAX_JOINTS>,
    /// Joint velocities [rad/s].
    pub velocity: FixedVec<f64, MAX_JOINTS>,
    /// Measured joint efforts [Nm].
    pub effort: FixedVec<f64, MAX_JOINTS>,
}

impl JointState {
    /// Zero state sized for `dims`.
    pub fn zeros(dims: Dimensions) -> Self {
        Self {
            position: dims.joint_zeros(),
            velocity: dims.joint_zeros(),
            effort: dims.joint_zeros(),
        }
    }

    /// Concatenate `[position, velocity]` into `x`.
    pub fn write_state_vector(&self, x: &mut [f64]) {
        let n = self.position.len();
        x[..n].copy_from_slice(&self.position);
        x[n..2 * n].copy_from_slice(&self.velocity);
    }
}

/// Feedback law produced by one solve.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlLaw {
    /// Feed-forward effort, one entry per joint.
    pub us: FixedVec<f64, MAX_JOINTS>,
    /// Reference state at the start of the OCP step.
    pub xs0: FixedVec<f64, MAX_STATE_DIM>,
    /// Reference state at the end of the OCP step.
    pub xs1: FixedVec<f64, MAX_STATE_DIM>,
    /// Feedback gain, row-major `joint_count × state_dim`.
    pub ks: FixedVec<f64, MAX_GAIN_LEN>,
}

impl ControlLaw {
    /// All-zero law sized for `dims`.
    pub fn zeros(dims: Dimensions) -> Self {
        Self {
            us: dims.joint_zeros(),
            xs0: dims.state_zeros(),
            xs1: dims.state_zeros(),
            ks: dims.gain_zeros(),
        }
    }

    /// Build a law from slices, checking every length against `dims`.
    pub fn from_slices(
        dims: Dimensions,
        us: &[f64],
        xs0: &[f64],
        xs1: &[f64],
        ks: &[f64],
    ) -> Result<Self, DimensionError> {
        let mut law = Self::zeros(dims);
        law.set_from_slices(us, xs0, xs1, ks)?;
        Ok(law)
    }

    /// Overwrite the law in place (no reallocation; lengths must match).
    pub fn set_from_slices(
        &mut self,
        us: &[f64],
        xs0: &[f64],
        xs1: &[f64],
        ks: &[f64],
    ) -> Result<(), DimensionError> {
        check_len("us", us, self.us.len())?;
        check_len("xs0", xs0, self.xs0.len())?;
        check_len("xs1", xs1, self.xs1.len())?;
        check_len("Ks", ks, self.ks.len())?;
        self.us.copy_from_slice(us);
        self.xs0.copy_from_slice(xs0);
        self.xs1.copy_from_slice(xs1);
        self.ks.copy_from_slice(ks);
        Ok(())
    }

    /// Dimensions this law is sized for.
    pub fn dims(&self) -> Result<Dimensions, DimensionError> {
        Dimensions::new(self.us.len())
    }

    /// Gain entry at (`joint`, `state_index`).
    #[inline]
    pub fn gain(&self, joint: usize, state_index: usize) -> f64 {
        self.ks[joint * self.xs0.len() + state_index]
    }

    /// Check every field against `dims` and reject NaN/inf.
    pub fn validate(&self, dims: Dimensions) -> Result<(), DimensionError> {
        check_len("us", &self.us, dims.joint_count())?;
        check_len("xs0", &self.xs0, dims.state_dim())?;
        check_len("xs1", &self.xs1, dims.state_dim())?;
        check_len("Ks", &self.ks, dims.gain_len())?;
        check_finite("us", &self.us)?;
        check_finite("xs0", &self.xs0)?;
        check_finite("xs1", &self.xs1)?;
        check_finite("Ks", &self.ks)?;
        Ok(())
    }
}
