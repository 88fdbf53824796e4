//! # MPC Exchange Segment
//!
//! Process-shared memory bridge between the free-running MPC solver and the
//! fixed-rate joint controller. Both processes map the same segment and
//! exchange measured state, target and the latest control law through it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────────┐    ┌─────────────────┐
//! │   Controller    │    │   Exchange Segment   │    │     Solver      │
//! │   (RT, 1 kHz)   │    │                      │    │  (free-running) │
//! │                 ├───►│ x_meas, t, target    ├───►│                 │
//! │ ControllerLoop  │    │                      │    │ SolverLoop      │
//! │                 │◄───┤ us, xs0, xs1, Ks, t  │◄───┤                 │
//! └─────────────────┘    │ flags, description   │    └─────────────────┘
//!                        │ robust pshared mutex │
//!                        └──────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mpc_common::law::{ControlLaw, Dimensions};
//! use mpc_shared_memory::{ExchangeSegment, VectorField};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dims = Dimensions::new(7)?;
//! let segment = ExchangeSegment::open("crocoddyl_shm", dims)?;
//!
//! let mut law = ControlLaw::zeros(dims);
//! {
//!     let mut guard = segment.lock()?;
//!     guard.write_measured_state(&[0.0; 14], 0.001)?;
//!     if let Some(law_time) = guard.read_law_into(&mut law)? {
//!         println!("law from t={law_time}, us={:?}", guard.vector(VectorField::Us));
//!     }
//! } // mutex released here
//! # Ok(())
//! # }
//! ```
//!
//! ## Safety Considerations
//!
//! - **Single guarded access**: the payload is only reachable through
//!   [`ExchangeGuard`]; no view outlives the lock
//! - **Dead holder**: the mutex is robust; a torn law is detected through the
//!   law sequence number and never handed out
//! - **Layout**: a segment created by another build or for another joint count
//!   is rejected on attach

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod handshake;
mod lock;
pub mod platform;
pub mod segment;

pub use error::{ShmError, ShmResult};
pub use handshake::{BootstrapFlags, BootstrapPhase, HandshakeError};
pub use lock::LockOutcome;
pub use segment::{
    ATTACH_SLOTS, EXCHANGE_MAGIC, ExchangeGuard, ExchangeSegment, LAYOUT_SIZE, SegmentHeader,
    SegmentOptions, VectorField,
};

/// Initialize tracing for tests and tools
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
