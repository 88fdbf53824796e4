//! # MPC Solver Library
//!
//! Non-real-time half of the MPC bridge. A free-running loop reads the
//! measured state and target from the shared segment, solves the OCP with no
//! lock held and publishes the resulting feedback law for the controller.
//!
//! - [`ocp`] - Solver trait and the built-in posture regulator
//! - [`solver_loop`] - Loop state machine, statistics and handshake side
//! - [`error`] - Fatal loop errors

pub mod error;
pub mod ocp;
pub mod solver_loop;

pub use error::SolverLoopError;
pub use ocp::{OcpSolver, PostureRegulator, SolveError, WarmStart};
pub use solver_loop::{SolverLoop, SolverState, SolverStats, StepOutcome};
