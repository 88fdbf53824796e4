//! Free-running solver-side loop.
//!
//! ```text
//! Uninitialized ─► WaitingForFirstState ─► Solving ⇄ IdleBetweenSolves
//! ```
//!
//! Each pass copies the measured state and target out of the segment, solves
//! with no lock held, and publishes the law together with the controller time
//! of the state it was computed from. A failed solve leaves the previous law
//! in place.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use heapless::Vec as FixedVec;
use mpc_common::config::BridgeConfig;
use mpc_common::consts::{MAX_STATE_DIM, STATS_WINDOW, TARGET_DIM};
use mpc_common::description::validate_joint_names;
use mpc_common::law::{ControlLaw, Dimensions};
use mpc_common::stats::RingStats;
use mpc_shared_memory::{BootstrapFlags, ExchangeSegment, VectorField};
use tracing::{debug, info, warn};

use crate::error::SolverLoopError;
use crate::ocp::{OcpSolver, SolveError, WarmStart};

/// Poll interval while no measured state is available.
const STATE_POLL: Duration = Duration::from_millis(1);

/// Solve failures are logged on the first occurrence and every this many.
const FAILURE_LOG_EVERY: u64 = 100;

/// Solver loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    /// Description not yet published
    Uninitialized,
    /// Controller has not written a measured state yet
    WaitingForFirstState,
    /// Solve in progress
    Solving,
    /// Between solves
    IdleBetweenSolves,
}

/// Result of one pass
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// No measured state yet
    WaitingForState,
    /// Law published
    Solved {
        /// Controller time the law is stamped with [s]
        law_time: f64,
        /// Wall time of the solve
        duration: Duration,
        /// Controller ticks since the previous pass
        ticks: u64,
    },
    /// Solve failed, previous law kept
    Failed(SolveError),
}

/// Rolling solver statistics.
#[derive(Debug, Default)]
pub struct SolverStats {
    /// Successful solves
    pub solves: u64,
    /// Failed solves
    pub failures: u64,
    /// Solve durations [s]
    pub solve_time: RingStats<STATS_WINDOW>,
    /// Intervals between solve starts [s]
    pub solve_interval: RingStats<STATS_WINDOW>,
    /// Controller ticks consumed per pass
    pub ticks_per_solve: RingStats<STATS_WINDOW>,
}

impl SolverStats {
    /// Mean solve frequency [Hz]
    pub fn solve_hz(&self) -> Option<f64> {
        self.solve_interval.rate_hz()
    }
}

/// Solver-side half of the bridge.
pub struct SolverLoop<S: OcpSolver> {
    segment: ExchangeSegment,
    solver: S,
    dims: Dimensions,
    state: SolverState,
    description: Option<String>,
    period: Duration,
    stats_log_interval: u64,

    x_meas: FixedVec<f64, MAX_STATE_DIM>,
    target: [f64; TARGET_DIM],
    law: ControlLaw,
    previous: ControlLaw,
    has_previous: bool,
    last_state_seq: u64,
    last_start: Option<Instant>,
    stats: SolverStats,
}

impl<S: OcpSolver> SolverLoop<S> {
    /// Configure the loop.
    ///
    /// `description` is checked against the configured joint names here and
    /// published on the first pass.
    pub fn new(
        config: &BridgeConfig,
        segment: ExchangeSegment,
        solver: S,
        description: Option<String>,
    ) -> Result<Self, SolverLoopError> {
        let dims = config.dims()?;
        for (what, found) in [("segment", segment.dims()), ("solver", solver.dims())] {
            if found != dims {
                return Err(SolverLoopError::DimsMismatch {
                    what,
                    expected: dims.joint_count(),
                    found: found.joint_count(),
                });
            }
        }
        if let Some(text) = &description {
            validate_joint_names(text, &config.robot.joint_names)?;
        }

        info!(
            segment = segment.name(),
            solver = solver.name(),
            joints = dims.joint_count(),
            frequency_hz = config.ocp.solver_frequency,
            horizon = config.ocp.horizon_length,
            iterations = config.ocp.solver_iterations,
            "Solver loop configured"
        );

        Ok(Self {
            segment,
            solver,
            dims,
            state: SolverState::Uninitialized,
            description,
            period: Duration::from_secs_f64(1.0 / config.ocp.solver_frequency),
            stats_log_interval: config.ocp.solver_frequency.ceil().max(1.0) as u64,
            x_meas: dims.state_zeros(),
            target: config.target.initial,
            law: ControlLaw::zeros(dims),
            previous: ControlLaw::zeros(dims),
            has_previous: false,
            last_state_seq: 0,
            last_start: None,
            stats: SolverStats::default(),
        })
    }

    /// Publish the description and start waiting for the controller.
    fn initialize(&mut self) -> Result<(), SolverLoopError> {
        match self.description.take() {
            Some(text) => {
                self.segment.lock()?.publish_description(&text)?;
                info!(bytes = text.len(), "Robot description published");
            }
            None => warn!("No robot description configured; controller will not cross-check joints"),
        }
        self.state = SolverState::WaitingForFirstState;
        Ok(())
    }

    /// Run one pass.
    ///
    /// # Errors
    ///
    /// Only segment and description errors. Solve failures are returned as
    /// [`StepOutcome::Failed`].
    pub fn step(&mut self) -> Result<StepOutcome, SolverLoopError> {
        if self.state == SolverState::Uninitialized {
            self.initialize()?;
        }

        let (state_seq, state_time, first_done) = {
            let guard = self.segment.lock()?;
            let seq = guard.state_seq();
            if seq == 0 {
                return Ok(StepOutcome::WaitingForState);
            }
            self.x_meas.copy_from_slice(guard.vector(VectorField::XMeas));
            self.target = guard.target();
            (seq, guard.current_time(), guard.flags().law_available())
        };

        if self.state == SolverState::WaitingForFirstState {
            info!(time = state_time, "First measured state received");
        }
        self.state = SolverState::Solving;

        let start = Instant::now();
        if let Some(prev) = self.last_start.replace(start) {
            self.stats.solve_interval.push(start.duration_since(prev).as_secs_f64());
        }
        let ticks = state_seq.wrapping_sub(self.last_state_seq);
        self.last_state_seq = state_seq;
        self.stats.ticks_per_solve.push(ticks as f64);

        let warm_start = if first_done && self.has_previous {
            WarmStart::Previous(&self.previous)
        } else {
            WarmStart::Default
        };
        let result = self
            .solver
            .solve(&self.x_meas, &self.target, warm_start, &mut self.law)
            .and_then(|()| self.law.validate(self.dims).map_err(SolveError::from));
        let duration = start.elapsed();
        self.stats.solve_time.push(duration.as_secs_f64());

        let outcome = match result {
            Ok(()) => {
                self.publish(state_time)?;
                self.stats.solves += 1;
                StepOutcome::Solved {
                    law_time: state_time,
                    duration,
                    ticks,
                }
            }
            Err(e) => {
                self.stats.failures += 1;
                if self.stats.failures % FAILURE_LOG_EVERY == 1 {
                    warn!(error = %e, failures = self.stats.failures, "Solve failed, keeping previous law");
                }
                StepOutcome::Failed(e)
            }
        };
        self.state = SolverState::IdleBetweenSolves;
        self.log_stats();
        Ok(outcome)
    }

    fn publish(&mut self, law_time: f64) -> Result<(), SolverLoopError> {
        {
            let mut guard = self.segment.lock()?;
            guard.write_law(&self.law, law_time)?;
            if guard.latch(BootstrapFlags::FIRST_UPDATE_DONE)? {
                info!("First control law published");
            }
            if guard.latch(BootstrapFlags::SOLVER_STARTED)? {
                info!("Solver started");
            }
        }
        self.previous.clone_from(&self.law);
        self.has_previous = true;
        Ok(())
    }

    fn log_stats(&self) {
        let passes = self.stats.solves + self.stats.failures;
        if passes % self.stats_log_interval != 0 {
            return;
        }
        info!(
            solves = self.stats.solves,
            failures = self.stats.failures,
            solve_ms = self.stats.solve_time.mean().map(|s| s * 1e3).unwrap_or(f64::NAN),
            solve_hz = self.stats.solve_hz().unwrap_or(0.0),
            ticks_per_solve = self.stats.ticks_per_solve.mean().unwrap_or(0.0),
            "Solver stats"
        );
        debug!(target = ?self.target, "Solver target");
    }

    /// Pass until `running` is cleared or `max_solves` passes have solved or
    /// failed, pacing at the configured frequency.
    pub fn run(
        &mut self,
        running: &AtomicBool,
        max_solves: Option<u64>,
    ) -> Result<(), SolverLoopError> {
        info!(period_us = self.period.as_micros() as u64, "Entering solver loop");
        while running.load(Ordering::Relaxed)
            && max_solves.is_none_or(|max| self.stats.solves + self.stats.failures < max)
        {
            let pass_start = Instant::now();
            match self.step()? {
                StepOutcome::WaitingForState => std::thread::sleep(STATE_POLL),
                _ => {
                    if let Some(remaining) = self.period.checked_sub(pass_start.elapsed()) {
                        std::thread::sleep(remaining);
                    }
                }
            }
        }
        info!(
            solves = self.stats.solves,
            failures = self.stats.failures,
            "Solver loop stopped"
        );
        Ok(())
    }

    /// Current state
    pub fn state(&self) -> SolverState {
        self.state
    }

    /// Statistics
    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// Last published law
    pub fn law(&self) -> Option<&ControlLaw> {
        self.has_previous.then_some(&self.previous)
    }

    /// Target used by the last pass
    pub fn target(&self) -> [f64; TARGET_DIM] {
        self.target
    }

    /// Solver
    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Mutable solver
    pub fn solver_mut(&mut self) -> &mut S {
        &mut self.solver
    }

    /// Exchange segment
    pub fn segment(&self) -> &ExchangeSegment {
        &self.segment
    }
}

impl<S: OcpSolver> std::fmt::Debug for SolverLoop<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolverLoop")
            .field("segment", &self.segment.name())
            .field("solver", &self.solver.name())
            .field("state", &self.state)
            .field("solves", &self.stats.solves)
            .finish()
    }
}
