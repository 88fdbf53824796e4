//! Platform-specific segment file and process helpers

pub mod linux;

pub use linux::*;
