//! # MPC Controller Library
//!
//! Real-time half of the MPC bridge. Once per tick the controller reads the
//! joints, exchanges state and law with the solver process through the shared
//! segment, evaluates the time-interpolated affine law and issues the
//! actuator command.
//!
//! ## Module Structure
//!
//! - [`controller`] - Per-tick loop (`ControllerLoop::update`)
//! - [`cycle`] - RT setup and fixed-rate pacing
//! - [`hardware`] - Hardware trait and command type
//! - [`interpolate`] / [`feedback`] / [`friction`] - Law evaluation
//! - [`target`] - Latest-wins target mailbox
//! - [`telemetry`] - Non-blocking CSV telemetry
//! - [`sim`] - Simulated joints
//!
//! ## Zero-Allocation Tick
//!
//! All buffers are sized in `ControllerLoop::new`. The tick only copies into
//! fixed-capacity vectors; telemetry records are pushed with `try_send`.

#![deny(clippy::disallowed_types)]

pub mod controller;
pub mod cycle;
pub mod error;
pub mod feedback;
pub mod friction;
pub mod hardware;
pub mod interpolate;
pub mod sim;
pub mod target;
pub mod telemetry;

pub use controller::{ControllerLoop, ControllerStats, TickOutcome};
pub use error::ControllerError;
pub use hardware::{ActuatorCommand, HardwareError, HardwareInterface};
pub use target::TargetMailbox;
