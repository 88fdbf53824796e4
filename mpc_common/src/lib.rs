//! MPC Common Library
//!
//! Types shared by the real-time controller and the MPC solver process.
//!
//! # Module Structure
//!
//! - [`consts`] - Capacities and defaults (single source of truth)
//! - [`config`] - TOML configuration loading and validation
//! - [`law`] - Dimensions, measured state and the affine control law
//! - [`stats`] - Fixed-capacity rolling statistics
//! - [`description`] - Robot description joint cross-validation
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use mpc_common::prelude::*;
//!
//! let dims = Dimensions::new(7).unwrap();
//! let law = ControlLaw::zeros(dims);
//! assert_eq!(law.ks.len(), 7 * 14);
//! ```

pub mod config;
pub mod consts;
pub mod description;
pub mod law;
pub mod prelude;
pub mod stats;
