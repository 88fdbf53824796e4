//! Error types for exchange segment operations

use mpc_common::law::DimensionError;
use nix::errno::Errno;
use thiserror::Error;

use crate::handshake::HandshakeError;

/// Errors that can occur while opening or accessing the exchange segment
#[derive(Error, Debug)]
pub enum ShmError {
    /// Segment not found
    #[error("Segment not found: {name}")]
    NotFound {
        /// Segment name
        name: String,
    },

    /// Permission denied
    #[error("Permission denied accessing segment: {name}")]
    PermissionDenied {
        /// Segment name
        name: String,
    },

    /// Segment name is empty or contains a path separator
    #[error("Invalid segment name: '{name}'")]
    InvalidName {
        /// Rejected name
        name: String,
    },

    /// Segment was created for a different joint count
    #[error("Segment dimension mismatch: expected {expected} joints, segment has {found}")]
    DimensionMismatch {
        /// Joint count this process is configured for
        expected: usize,
        /// Joint count recorded in the segment header
        found: usize,
    },

    /// Segment was created by a build with a different memory layout
    #[error("Segment layout mismatch: expected hash {expected:#018x}, found {found:#018x}")]
    LayoutMismatch {
        /// Layout hash of this build
        expected: u64,
        /// Layout hash recorded in the segment header
        found: u64,
    },

    /// Mapped file size does not match the layout
    #[error("Segment size mismatch: expected {expected} bytes, found {found}")]
    SizeMismatch {
        /// Layout size of this build
        expected: usize,
        /// Size of the file on disk
        found: usize,
    },

    /// Segment header does not carry the expected magic number
    #[error("Segment '{name}' has an invalid magic number")]
    BadMagic {
        /// Segment name
        name: String,
    },

    /// Creator did not finish initialising the segment in time
    #[error("Segment '{name}' not initialised within timeout")]
    NotReady {
        /// Segment name
        name: String,
    },

    /// Process-shared mutex operation failed
    #[error("Segment mutex {op} failed: {source}")]
    Lock {
        /// Failed operation
        op: &'static str,
        /// Error code returned by pthread
        source: Errno,
    },

    /// Bootstrap flag latched out of order
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// Law or state vector does not fit the segment dimensions
    #[error(transparent)]
    Law(#[from] DimensionError),

    /// Robot description larger than the reserved field
    #[error("Robot description of {len} bytes exceeds capacity {capacity}")]
    DescriptionTooLarge {
        /// Description length in bytes
        len: usize,
        /// Field capacity in bytes
        capacity: usize,
    },

    /// Robot description field is not valid UTF-8
    #[error("Robot description in segment is not valid UTF-8")]
    InvalidDescription,

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error
    #[error("System call error: {source}")]
    Nix {
        /// Source nix error
        #[from]
        source: nix::Error,
    },
}

impl ShmError {
    /// Map an IO error on segment `name` to the most specific variant.
    pub(crate) fn from_io(name: &str, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound {
                name: name.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                name: name.to_string(),
            },
            _ => Self::Io { source },
        }
    }
}

/// Result type for exchange segment operations
pub type ShmResult<T> = Result<T, ShmError>;
