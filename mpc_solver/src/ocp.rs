//! Optimal-control solver seam.
//!
//! The numerical OCP formulation lives behind [`OcpSolver`]. The loop hands
//! it the measured initial state and the task target once per pass and gets
//! a [`ControlLaw`] back. [`PostureRegulator`] is the built-in stand-in used
//! when no external solver is linked.
//!
//! # Contract
//!
//! | Operation | Allocation | Lock held |
//! |-----------|------------|-----------|
//! | `solve()` | allowed | **never** |
//!
//! `solve` writes its result into the caller's law buffer; on `Err` the
//! buffer content is unspecified and the loop does not publish it.

use mpc_common::config::{OcpConfig, ReferenceSolverConfig};
use mpc_common::consts::{MAX_JOINTS, TARGET_DIM};
use mpc_common::law::{ControlLaw, DimensionError, Dimensions};
use heapless::Vec as FixedVec;
use thiserror::Error;
use tracing::debug;

/// Solve failures. Never fatal for the loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    /// Initial state or target contains NaN/inf
    #[error("non-finite {field} at index {index}")]
    InvalidInput {
        /// `x0` or `target`
        field: &'static str,
        /// First offending index
        index: usize,
    },

    /// Solver did not converge
    #[error("solver did not converge after {iterations} iterations")]
    NotConverged {
        /// Iterations spent
        iterations: usize,
    },

    /// Input or result has the wrong shape, or the result is non-finite
    #[error("dimension error: {0}")]
    Dimension(#[from] DimensionError),

    /// Solver-specific failure
    #[error("{0}")]
    Backend(String),
}

/// Initial guess for one solve.
#[derive(Debug, Clone, Copy)]
pub enum WarmStart<'a> {
    /// Solver's default initial guess (first solve)
    Default,
    /// Previous solution
    Previous(&'a ControlLaw),
}

/// Black-box OCP solver invoked once per loop pass.
pub trait OcpSolver {
    /// Dimensions of the problem
    fn dims(&self) -> Dimensions;

    /// Solve from initial state `x0` towards `target`, writing the law into
    /// `law` (sized for [`dims`](Self::dims)).
    fn solve(
        &mut self,
        x0: &[f64],
        target: &[f64; TARGET_DIM],
        warm_start: WarmStart<'_>,
        law: &mut ControlLaw,
    ) -> Result<(), SolveError>;

    /// Name for logs
    fn name(&self) -> &str {
        "ocp"
    }
}

impl<S: OcpSolver + ?Sized> OcpSolver for Box<S> {
    fn dims(&self) -> Dimensions {
        (**self).dims()
    }

    fn solve(
        &mut self,
        x0: &[f64],
        target: &[f64; TARGET_DIM],
        warm_start: WarmStart<'_>,
        law: &mut ControlLaw,
    ) -> Result<(), SolveError> {
        (**self).solve(x0, target, warm_start, law)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

fn check_finite(field: &'static str, values: &[f64]) -> Result<(), SolveError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(SolveError::InvalidInput { field, index }),
        None => Ok(()),
    }
}

/// Joint-space posture regulator in feedback-law form.
///
/// Holds a fixed posture `q*` (configured, or the first measured position):
///
/// ```text
/// us  = 0
/// xs0 = x0
/// xs1 = [q*, 0]
/// Ks  = [kp·I | kd·I]
/// ```
///
/// The controller blends the reference from `x0` to the posture over one OCP
/// step, so the law is exact at `t_law` and pulls towards `q*` afterwards.
/// The target is recorded but not tracked; there is no kinematic model here.
#[derive(Debug, Clone)]
pub struct PostureRegulator {
    dims: Dimensions,
    position_gain: f64,
    velocity_gain: f64,
    posture: Option<FixedVec<f64, MAX_JOINTS>>,
    horizon_length: usize,
    iterations: usize,
    last_target: Option<[f64; TARGET_DIM]>,
    warm_starts: u64,
}

impl PostureRegulator {
    /// Regulator from the `[solver]` and `[ocp]` sections.
    pub fn new(
        dims: Dimensions,
        config: &ReferenceSolverConfig,
        ocp: &OcpConfig,
    ) -> Result<Self, DimensionError> {
        let posture = match &config.posture {
            Some(p) => {
                if p.len() != dims.joint_count() {
                    return Err(DimensionError::LengthMismatch {
                        field: "posture",
                        expected: dims.joint_count(),
                        actual: p.len(),
                    });
                }
                Some(FixedVec::from_slice(p).map_err(|_| DimensionError::TooManyJoints {
                    joint_count: p.len(),
                    max: MAX_JOINTS,
                })?)
            }
            None => None,
        };
        Ok(Self {
            dims,
            position_gain: config.position_gain,
            velocity_gain: config.velocity_gain,
            posture,
            horizon_length: ocp.horizon_length,
            iterations: ocp.solver_iterations,
            last_target: None,
            warm_starts: 0,
        })
    }

    /// Posture being held, once known
    pub fn posture(&self) -> Option<&[f64]> {
        self.posture.as_deref()
    }

    /// Target of the last solve
    pub fn last_target(&self) -> Option<[f64; TARGET_DIM]> {
        self.last_target
    }

    /// Solves that were warm-started
    pub fn warm_starts(&self) -> u64 {
        self.warm_starts
    }

    /// Horizon length and iteration budget
    pub fn problem_size(&self) -> (usize, usize) {
        (self.horizon_length, self.iterations)
    }
}

impl OcpSolver for PostureRegulator {
    fn dims(&self) -> Dimensions {
        self.dims
    }

    fn solve(
        &mut self,
        x0: &[f64],
        target: &[f64; TARGET_DIM],
        warm_start: WarmStart<'_>,
        law: &mut ControlLaw,
    ) -> Result<(), SolveError> {
        let n = self.dims.joint_count();
        let nx = self.dims.state_dim();
        if x0.len() != nx {
            return Err(DimensionError::LengthMismatch {
                field: "x0",
                expected: nx,
                actual: x0.len(),
            }
            .into());
        }
        check_finite("x0", x0)?;
        check_finite("target", target)?;

        if let WarmStart::Previous(_) = warm_start {
            self.warm_starts += 1;
        }
        if self.posture.is_none() {
            let captured = FixedVec::from_slice(&x0[..n]).map_err(|_| {
                DimensionError::TooManyJoints {
                    joint_count: n,
                    max: MAX_JOINTS,
                }
            })?;
            debug!(posture = ?captured.as_slice(), "Posture captured from first state");
            self.posture = Some(captured);
        }
        self.last_target = Some(*target);

        law.us.iter_mut().for_each(|u| *u = 0.0);
        law.xs0.copy_from_slice(x0);
        law.xs1[..n].copy_from_slice(self.posture.as_deref().unwrap_or(&x0[..n]));
        law.xs1[n..].iter_mut().for_each(|v| *v = 0.0);
        law.ks.iter_mut().for_each(|k| *k = 0.0);
        for i in 0..n {
            law.ks[i * nx + i] = self.position_gain;
            law.ks[i * nx + n + i] = self.velocity_gain;
        }
        law.validate(self.dims)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "posture_regulator"
    }
}
