//! Bootstrap handshake flags.
//!
//! First contact between the two processes is coordinated by four one-way
//! latches stored in the segment:
//!
//! ```text
//! solver:      DESCRIPTION_SENT ──► FIRST_UPDATE_DONE ──► SOLVER_STARTED
//!                                                              │
//! controller:                                                  ▼
//!                                                   START_SENDING_CMD
//! ```
//!
//! A flag goes false→true exactly once per segment lifetime. Latching a flag
//! before its prerequisite is rejected.

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Handshake latches stored in the segment
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BootstrapFlags: u32 {
        /// Solver published the robot description
        const DESCRIPTION_SENT = 1 << 0;
        /// At least one law has been written
        const FIRST_UPDATE_DONE = 1 << 1;
        /// Solver finished its first solve and is running
        const SOLVER_STARTED = 1 << 2;
        /// Controller commits to deriving commands from the law
        const START_SENDING_CMD = 1 << 3;
    }
}

/// Handshake ordering violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// Latch request did not name exactly one known flag
    #[error("latch request {0:#x} is not a single bootstrap flag")]
    NotSingleFlag(u32),

    /// Flag latched before its prerequisite
    #[error("{flag} latched before {requires}")]
    OutOfOrder {
        /// Requested flag
        flag: &'static str,
        /// Missing prerequisite
        requires: &'static str,
    },
}

/// Coarse progress of the handshake derived from the flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    /// No law yet
    WaitingForSolver,
    /// Solver is producing laws, controller not yet committed
    WaitingForController,
    /// Controller issues commands derived from the law
    Running,
}

impl BootstrapFlags {
    /// Display name of a single flag.
    pub fn flag_name(flag: Self) -> &'static str {
        if flag == Self::DESCRIPTION_SENT {
            "description_sent"
        } else if flag == Self::FIRST_UPDATE_DONE {
            "is_first_update_done"
        } else if flag == Self::SOLVER_STARTED {
            "solver_started"
        } else if flag == Self::START_SENDING_CMD {
            "start_sending_cmd"
        } else {
            "unknown"
        }
    }

    fn prerequisite(flag: Self) -> Option<Self> {
        if flag == Self::SOLVER_STARTED {
            Some(Self::FIRST_UPDATE_DONE)
        } else if flag == Self::START_SENDING_CMD {
            Some(Self::SOLVER_STARTED)
        } else {
            None
        }
    }

    /// Latch `flag` into `self`.
    ///
    /// Returns `Ok(true)` if the flag was newly set, `Ok(false)` if it was
    /// already set.
    pub fn latch(&mut self, flag: Self) -> Result<bool, HandshakeError> {
        if flag.bits().count_ones() != 1 || !Self::all().contains(flag) {
            return Err(HandshakeError::NotSingleFlag(flag.bits()));
        }
        if self.contains(flag) {
            return Ok(false);
        }
        if let Some(required) = Self::prerequisite(flag) {
            if !self.contains(required) {
                return Err(HandshakeError::OutOfOrder {
                    flag: Self::flag_name(flag),
                    requires: Self::flag_name(required),
                });
            }
        }
        self.insert(flag);
        Ok(true)
    }

    /// Progress of the handshake
    pub fn phase(&self) -> BootstrapPhase {
        if self.contains(Self::START_SENDING_CMD) {
            BootstrapPhase::Running
        } else if self.contains(Self::SOLVER_STARTED) {
            BootstrapPhase::WaitingForController
        } else {
            BootstrapPhase::WaitingForSolver
        }
    }

    /// True once a law has been written and may be read
    #[inline]
    pub fn law_available(&self) -> bool {
        self.contains(Self::FIRST_UPDATE_DONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_sequence() {
        let mut flags = BootstrapFlags::empty();
        assert_eq!(flags.phase(), BootstrapPhase::WaitingForSolver);

        assert_eq!(flags.latch(BootstrapFlags::DESCRIPTION_SENT), Ok(true));
        assert_eq!(flags.latch(BootstrapFlags::FIRST_UPDATE_DONE), Ok(true));
        assert!(flags.law_available());
        assert_eq!(flags.latch(BootstrapFlags::SOLVER_STARTED), Ok(true));
        assert_eq!(flags.phase(), BootstrapPhase::WaitingForController);
        assert_eq!(flags.latch(BootstrapFlags::START_SENDING_CMD), Ok(true));
        assert_eq!(flags.phase(), BootstrapPhase::Running);
        assert_eq!(flags, BootstrapFlags::all());
    }

    #[test]
    fn relatch_is_noop() {
        let mut flags = BootstrapFlags::FIRST_UPDATE_DONE;
        assert_eq!(flags.latch(BootstrapFlags::FIRST_UPDATE_DONE), Ok(false));
        assert_eq!(flags, BootstrapFlags::FIRST_UPDATE_DONE);
    }

    #[test]
    fn start_sending_requires_solver_started() {
        let mut flags = BootstrapFlags::FIRST_UPDATE_DONE;
        assert_eq!(
            flags.latch(BootstrapFlags::START_SENDING_CMD),
            Err(HandshakeError::OutOfOrder {
                flag: "start_sending_cmd",
                requires: "solver_started"
            })
        );
        assert!(!flags.contains(BootstrapFlags::START_SENDING_CMD));
    }

    #[test]
    fn solver_started_requires_first_update() {
        let mut flags = BootstrapFlags::DESCRIPTION_SENT;
        assert!(flags.latch(BootstrapFlags::SOLVER_STARTED).is_err());
    }

    #[test]
    fn description_is_independent() {
        let mut flags = BootstrapFlags::FIRST_UPDATE_DONE | BootstrapFlags::SOLVER_STARTED;
        assert_eq!(flags.latch(BootstrapFlags::DESCRIPTION_SENT), Ok(true));
    }

    #[test]
    fn rejects_compound_request() {
        let mut flags = BootstrapFlags::empty();
        let both = BootstrapFlags::DESCRIPTION_SENT | BootstrapFlags::FIRST_UPDATE_DONE;
        assert_eq!(flags.latch(both), Err(HandshakeError::NotSingleFlag(0b11)));
        assert!(flags.is_empty());
    }
}
