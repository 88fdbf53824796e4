//! Latest-wins target mailbox.
//!
//! External sources post a new task-space target at any time; the controller
//! takes it at most once per tick without blocking. Posting twice before the
//! controller looks keeps only the second target. If the mailbox is being
//! written while the controller looks, the target is picked up next tick.

use mpc_common::consts::TARGET_DIM;
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared single-slot mailbox. Clones refer to the same slot.
#[derive(Debug, Clone, Default)]
pub struct TargetMailbox {
    slot: Arc<Mutex<Option<[f64; TARGET_DIM]>>>,
}

impl TargetMailbox {
    /// Create an empty mailbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any pending target with `target`
    pub fn post(&self, target: [f64; TARGET_DIM]) {
        *self.slot.lock() = Some(target);
    }

    /// Take the pending target without blocking
    pub fn try_take(&self) -> Option<[f64; TARGET_DIM]> {
        self.slot.try_lock().and_then(|mut slot| slot.take())
    }

    /// True if a target is waiting
    pub fn has_pending(&self) -> bool {
        self.slot.lock().is_some()
    }
}

/// Parse a target from a whitespace- or comma-separated line (`x y z`).
pub fn parse_target(line: &str) -> Option<[f64; TARGET_DIM]> {
    let mut target = [0.0f64; TARGET_DIM];
    let mut parts = line
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty());
    for slot in target.iter_mut() {
        *slot = parts.next()?.parse().ok()?;
        if !slot.is_finite() {
            return None;
        }
    }
    parts.next().is_none().then_some(target)
}
