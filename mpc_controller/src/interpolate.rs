//! Time interpolation of the reference state.
//!
//! The solver publishes the two reference states bracketing the next OCP
//! step, stamped with the controller time its initial state was measured at.
//! Between solver updates the controller blends them linearly:
//!
//! ```text
//! α     = clamp((t − t_law) / Δt_ocp, 0, 1)
//! x_ref = xs0 + α · (xs1 − xs0)
//! ```
//!
//! Past one OCP step the reference holds at `xs1`.

/// Interpolation weight for a law that is `age` seconds old.
///
/// Negative ages (clock skew, law stamped in the future) clamp to 0.
#[inline]
pub fn interpolation_alpha(age: f64, ocp_time_step: f64) -> f64 {
    if !(ocp_time_step > 0.0) || !age.is_finite() {
        return if age > 0.0 { 1.0 } else { 0.0 };
    }
    (age / ocp_time_step).clamp(0.0, 1.0)
}

/// Write `xs0 + alpha·(xs1 − xs0)` into `out`.
#[inline]
pub fn interpolate_reference(xs0: &[f64], xs1: &[f64], alpha: f64, out: &mut [f64]) {
    debug_assert_eq!(xs0.len(), xs1.len());
    debug_assert_eq!(xs0.len(), out.len());
    for ((o, a), b) in out.iter_mut().zip(xs0).zip(xs1) {
        *o = a + alpha * (b - a);
    }
}
