//! Controller-side loop: one call per RT tick.
//!
//! ```text
//! read hardware ─► [lock] write x_meas, time, target; read flags + law [unlock]
//!              ─► interpolate xs0→xs1 ─► u = us + K·(x_ref − x_meas) (+ friction)
//!              ─► write command
//! ```
//!
//! The critical section only copies fixed-size data into buffers allocated in
//! [`ControllerLoop::new`]. Until the solver has started and the controller
//! has latched `START_SENDING_CMD`, the safe command is issued.

use std::time::Duration;

use heapless::Vec as FixedVec;
use mpc_common::config::{BridgeConfig, CommandMode, SafeCommandPolicy};
use mpc_common::consts::{DESCRIPTION_CAPACITY, MAX_STATE_DIM, STATS_WINDOW, TARGET_DIM};
use mpc_common::description::validate_joint_names;
use mpc_common::law::{ControlLaw, Dimensions, JointState};
use mpc_common::stats::RingStats;
use mpc_shared_memory::{BootstrapFlags, BootstrapPhase, ExchangeSegment};
use tracing::{debug, info, warn};

use crate::error::ControllerError;
use crate::feedback::{diagonal_gains, feedback_effort};
use crate::friction::FrictionModel;
use crate::hardware::{ActuatorCommand, HardwareError, HardwareInterface};
use crate::interpolate::{interpolate_reference, interpolation_alpha};
use crate::target::TargetMailbox;
use crate::telemetry::{TelemetryRecord, TelemetrySink};

/// Where the command of one tick came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Handshake incomplete or no law yet; safe command issued
    WaitingForSolver,
    /// Law torn by a crashed writer; safe command policy applied
    TornLaw,
    /// Command derived from the law
    Law {
        /// Law age [s]
        age: f64,
        /// Interpolation weight
        alpha: f64,
        /// Age beyond the staleness threshold
        stale: bool,
    },
}

/// Rolling controller statistics.
#[derive(Debug, Default)]
pub struct ControllerStats {
    /// Ticks executed
    pub ticks: u64,
    /// Ticks that issued the safe command before the handshake completed
    pub safe_ticks: u64,
    /// Ticks that found a torn law
    pub held_ticks: u64,
    /// Ticks whose law was older than the staleness threshold
    pub stale_ticks: u64,
    /// Lock acquisitions that recovered the mutex from a dead holder
    pub recovered_locks: u64,
    /// Tick periods [s]
    pub tick_period: RingStats<STATS_WINDOW>,
    /// Law age at use [s]
    pub law_age: RingStats<STATS_WINDOW>,
}

impl ControllerStats {
    /// Mean tick frequency [Hz]
    pub fn tick_hz(&self) -> Option<f64> {
        self.tick_period.rate_hz()
    }
}

/// What one critical section hands back to the tick.
struct Snapshot {
    flags: BootstrapFlags,
    law_time: Option<f64>,
    description_ready: bool,
}

/// Controller-side half of the bridge.
pub struct ControllerLoop {
    segment: ExchangeSegment,
    dims: Dimensions,
    ocp_time_step: f64,
    stale_after: f64,
    safe_policy: SafeCommandPolicy,
    joint_names: Vec<String>,
    friction: Option<FrictionModel>,
    mailbox: TargetMailbox,
    telemetry: Option<TelemetrySink>,
    stats_log_interval: u64,

    state: JointState,
    x_meas: FixedVec<f64, MAX_STATE_DIM>,
    x_ref: FixedVec<f64, MAX_STATE_DIM>,
    law: ControlLaw,
    command: ActuatorCommand,
    last_valid: ActuatorCommand,
    has_last_valid: bool,
    description: String,
    description_checked: bool,

    pending_initial: Option<[f64; TARGET_DIM]>,
    target: [f64; TARGET_DIM],
    phase: BootstrapPhase,
    stats: ControllerStats,
}

impl ControllerLoop {
    /// Configure the loop for `segment`.
    ///
    /// The configured initial target is written on the first tick.
    pub fn new(
        config: &BridgeConfig,
        segment: ExchangeSegment,
        mailbox: TargetMailbox,
        telemetry: Option<TelemetrySink>,
    ) -> Result<Self, ControllerError> {
        let dims = config.dims()?;
        if segment.dims() != dims {
            return Err(ControllerError::DimsMismatch {
                config: dims.joint_count(),
                segment: segment.dims().joint_count(),
            });
        }
        let friction = FrictionModel::from_config(&config.friction, dims)?;
        let mode = config.controller.command_mode;

        let x_meas = dims.state_zeros();
        let x_ref = dims.state_zeros();

        info!(
            segment = segment.name(),
            joints = dims.joint_count(),
            mode = ?mode,
            safe_command = ?config.controller.safe_command,
            friction = friction.is_some(),
            telemetry = telemetry.is_some(),
            "Controller loop configured"
        );

        Ok(Self {
            segment,
            dims,
            ocp_time_step: config.ocp.time_step,
            stale_after: config.controller.stale_after_steps * config.ocp.time_step,
            safe_policy: config.controller.safe_command,
            joint_names: config.robot.joint_names.clone(),
            friction,
            mailbox,
            telemetry,
            stats_log_interval: config.controller.stats_log_interval,
            state: JointState::zeros(dims),
            x_meas,
            x_ref,
            law: ControlLaw::zeros(dims),
            command: ActuatorCommand::zeros(dims, mode),
            last_valid: ActuatorCommand::zeros(dims, mode),
            has_last_valid: false,
            description: String::with_capacity(DESCRIPTION_CAPACITY),
            description_checked: false,
            pending_initial: Some(config.target.initial),
            target: config.target.initial,
            phase: BootstrapPhase::WaitingForSolver,
            stats: ControllerStats::default(),
        })
    }

    /// Reject hardware that exposes a different joint count.
    pub fn check_hardware<H: HardwareInterface>(&self, hw: &H) -> Result<(), ControllerError> {
        if hw.joint_count() != self.dims.joint_count() {
            return Err(HardwareError::JointCountMismatch {
                expected: self.dims.joint_count(),
                actual: hw.joint_count(),
            }
            .into());
        }
        Ok(())
    }

    /// Run one tick at controller time `time` [s].
    ///
    /// # Errors
    ///
    /// Hardware I/O, lock-primitive and description mismatch errors. A
    /// missing or torn law is not an error.
    pub fn update<H: HardwareInterface>(
        &mut self,
        time: f64,
        period: Duration,
        hw: &mut H,
    ) -> Result<TickOutcome, ControllerError> {
        hw.read_state(&mut self.state)?;
        self.state.write_state_vector(&mut self.x_meas);

        let pending = self
            .pending_initial
            .take()
            .or_else(|| self.mailbox.try_take());
        let snapshot = self.exchange(time, pending)?;

        if snapshot.description_ready {
            self.check_description()?;
        }
        self.track_phase(snapshot.flags);

        let ready = snapshot.flags.contains(BootstrapFlags::START_SENDING_CMD)
            && snapshot.flags.law_available();
        let outcome = if !ready {
            self.stats.safe_ticks += 1;
            self.command.set_safe(&self.state);
            self.x_ref.copy_from_slice(&self.x_meas);
            TickOutcome::WaitingForSolver
        } else if let Some(law_time) = snapshot.law_time {
            self.apply_law(time - law_time)
        } else {
            self.apply_torn_policy();
            TickOutcome::TornLaw
        };

        hw.write_command(&self.command)?;

        self.stats.ticks += 1;
        self.stats.tick_period.push(period.as_secs_f64());
        if let TickOutcome::Law { age, .. } = outcome {
            self.stats.law_age.push(age);
        }
        self.emit_telemetry(time, &outcome);
        self.log_stats();
        Ok(outcome)
    }

    /// The single critical section of a tick.
    fn exchange(
        &mut self,
        time: f64,
        pending: Option<[f64; TARGET_DIM]>,
    ) -> Result<Snapshot, ControllerError> {
        let mut guard = self.segment.lock()?;
        if guard.recovered() {
            self.stats.recovered_locks += 1;
        }

        guard.write_measured_state(&self.x_meas, time)?;
        if let Some(target) = pending {
            guard.write_target(&target);
        }
        self.target = guard.target();

        let mut flags = guard.flags();
        let law_time = if flags.law_available() {
            guard.read_law_into(&mut self.law)?
        } else {
            None
        };

        if flags.contains(BootstrapFlags::SOLVER_STARTED)
            && !flags.contains(BootstrapFlags::START_SENDING_CMD)
        {
            guard.latch(BootstrapFlags::START_SENDING_CMD)?;
            flags = guard.flags();
        }

        let mut description_ready = false;
        if !self.description_checked {
            if let Some(text) = guard.description()? {
                self.description.clear();
                self.description.push_str(text);
                description_ready = true;
            }
        }

        Ok(Snapshot {
            flags,
            law_time,
            description_ready,
        })
    }

    /// Validate the copied description; a mismatch is reported on every tick
    /// until the solver publishes a matching one.
    fn check_description(&mut self) -> Result<(), ControllerError> {
        validate_joint_names(&self.description, &self.joint_names)?;
        self.description_checked = true;
        info!(
            joints = self.joint_names.len(),
            bytes = self.description.len(),
            "Robot description matches configured joints"
        );
        Ok(())
    }

    fn track_phase(&mut self, flags: BootstrapFlags) {
        let phase = flags.phase();
        if phase != self.phase {
            info!(from = ?self.phase, to = ?phase, "Bootstrap phase changed");
            self.phase = phase;
        }
    }

    fn apply_law(&mut self, age: f64) -> TickOutcome {
        let n = self.dims.joint_count();
        let alpha = interpolation_alpha(age, self.ocp_time_step);
        interpolate_reference(&self.law.xs0, &self.law.xs1, alpha, &mut self.x_ref);

        match self.command.mode {
            CommandMode::Effort => {
                feedback_effort(&self.law, &self.x_ref, &self.x_meas, &mut self.command.effort);
            }
            CommandMode::Chained => {
                for i in 0..n {
                    let (kp, kd) = diagonal_gains(&self.law, i);
                    self.command.position[i] = self.x_ref[i];
                    self.command.velocity[i] = self.x_ref[n + i];
                    self.command.kp[i] = kp;
                    self.command.kd[i] = kd;
                    self.command.effort[i] = self.law.us[i];
                }
            }
        }
        if let Some(friction) = &self.friction {
            friction.compensate(&self.state.velocity, &mut self.command.effort);
            friction.to_current(&mut self.command.effort);
        }

        self.last_valid.clone_from(&self.command);
        self.has_last_valid = true;

        let stale = age > self.stale_after;
        if stale {
            self.stats.stale_ticks += 1;
            if self.stats.stale_ticks == 1 {
                warn!(age, threshold = self.stale_after, "Control law is stale");
            }
        }
        TickOutcome::Law { age, alpha, stale }
    }

    fn apply_torn_policy(&mut self) {
        self.stats.held_ticks += 1;
        if self.stats.held_ticks == 1 {
            warn!(policy = ?self.safe_policy, "Torn control law detected");
        }
        match self.safe_policy {
            SafeCommandPolicy::HoldLast if self.has_last_valid => {
                self.command.clone_from(&self.last_valid);
            }
            _ => {
                self.command.set_safe(&self.state);
                self.x_ref.copy_from_slice(&self.x_meas);
            }
        }
    }

    fn emit_telemetry(&mut self, time: f64, outcome: &TickOutcome) {
        let Some(sink) = self.telemetry.as_mut() else {
            return;
        };
        if !sink.should_sample() {
            return;
        }
        let n = self.dims.joint_count();
        let mut record = TelemetryRecord {
            time,
            target: self.target,
            law_age: match outcome {
                TickOutcome::Law { age, .. } => *age,
                _ => f64::NAN,
            },
            effort: self.state.effort.clone(),
            command_effort: self.command.effort.clone(),
            position: self.state.position.clone(),
            velocity: self.state.velocity.clone(),
            ..Default::default()
        };
        for i in 0..n {
            let _ = record
                .position_error
                .push(self.x_ref[i] - self.state.position[i]);
        }
        sink.send(record);
    }

    fn log_stats(&self) {
        if self.stats_log_interval == 0 || self.stats.ticks % self.stats_log_interval != 0 {
            return;
        }
        info!(
            ticks = self.stats.ticks,
            tick_hz = self.stats.tick_hz().unwrap_or(0.0),
            law_age_ms = self.stats.law_age.mean().map(|a| a * 1e3).unwrap_or(f64::NAN),
            safe = self.stats.safe_ticks,
            held = self.stats.held_ticks,
            stale = self.stats.stale_ticks,
            recovered = self.stats.recovered_locks,
            telemetry_dropped = self.telemetry.as_ref().map_or(0, |t| t.dropped()),
            "Controller stats"
        );
        debug!(target = ?self.target, phase = ?self.phase, "Controller state");
    }

    /// Last command issued
    pub fn command(&self) -> &ActuatorCommand {
        &self.command
    }

    /// Interpolated reference of the last tick
    pub fn reference(&self) -> &[f64] {
        &self.x_ref
    }

    /// Target last seen in the segment
    pub fn target(&self) -> [f64; TARGET_DIM] {
        self.target
    }

    /// Handshake phase last observed
    pub fn phase(&self) -> BootstrapPhase {
        self.phase
    }

    /// Statistics
    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    /// Dimensions
    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    /// Exchange segment
    pub fn segment(&self) -> &ExchangeSegment {
        &self.segment
    }

    /// Detach the telemetry sink so the writer thread can finish.
    pub fn take_telemetry(&mut self) -> Option<TelemetrySink> {
        self.telemetry.take()
    }
}

impl std::fmt::Debug for ControllerLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerLoop")
            .field("segment", &self.segment.name())
            .field("dims", &self.dims)
            .field("phase", &self.phase)
            .field("ticks", &self.stats.ticks)
            .finish()
    }
}
