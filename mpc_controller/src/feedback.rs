//! Affine feedback law evaluation.
//!
//! ```text
//! u = us + Ks · (x_ref − x_meas)
//! ```
//!
//! `Ks` is row-major `joint_count × state_dim`. No allocation.

use mpc_common::law::ControlLaw;

/// Evaluate the law at `x_ref`/`x_meas` into `effort`.
#[inline]
pub fn feedback_effort(law: &ControlLaw, x_ref: &[f64], x_meas: &[f64], effort: &mut [f64]) {
    let nx = x_ref.len();
    debug_assert_eq!(x_meas.len(), nx);
    debug_assert_eq!(law.ks.len(), effort.len() * nx);

    for (i, u) in effort.iter_mut().enumerate() {
        let row = &law.ks[i * nx..(i + 1) * nx];
        let correction: f64 = row
            .iter()
            .zip(x_ref.iter().zip(x_meas))
            .map(|(k, (r, m))| k * (r - m))
            .sum();
        *u = law.us[i] + correction;
    }
}

/// Diagonal position and velocity gains of joint `i`: `(K[i][i], K[i][n+i])`.
#[inline]
pub fn diagonal_gains(law: &ControlLaw, joint: usize) -> (f64, f64) {
    let n = law.us.len();
    (law.gain(joint, joint), law.gain(joint, n + joint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpc_common::law::Dimensions;

    #[test]
    fn zero_gain_returns_feedforward() {
        let dims = Dimensions::new(2).unwrap();
        let law = ControlLaw::from_slices(dims, &[1.0, -1.0], &[0.0; 4], &[0.0; 4], &[0.0; 8])
            .unwrap();
        let mut u = [0.0; 2];
        feedback_effort(&law, &[1.0, 2.0, 3.0, 4.0], &[0.0; 4], &mut u);
        assert_eq!(u, [1.0, -1.0]);
    }

    #[test]
    fn pd_rows() {
        let dims = Dimensions::new(2).unwrap();
        // [kp 0 kd 0; 0 kp 0 kd]
        let ks = [10.0, 0.0, 1.0, 0.0, 0.0, 20.0, 0.0, 2.0];
        let law = ControlLaw::from_slices(dims, &[0.5, 0.0], &[0.0; 4], &[0.0; 4], &ks).unwrap();
        let mut u = [0.0; 2];
        feedback_effort(&law, &[0.1, 0.2, 0.0, 0.0], &[0.0, 0.0, 0.5, -0.5], &mut u);
        assert!((u[0] - (0.5 + 10.0 * 0.1 + 1.0 * -0.5)).abs() < 1e-12);
        assert!((u[1] - (20.0 * 0.2 + 2.0 * 0.5)).abs() < 1e-12);

        assert_eq!(diagonal_gains(&law, 0), (10.0, 1.0));
        assert_eq!(diagonal_gains(&law, 1), (20.0, 2.0));
    }

    #[test]
    fn full_row_coupling() {
        let dims = Dimensions::new(1).unwrap();
        let law = ControlLaw::from_slices(dims, &[0.0], &[0.0; 2], &[0.0; 2], &[3.0, 4.0]).unwrap();
        let mut u = [0.0];
        feedback_effort(&law, &[1.0, 1.0], &[0.0, 0.0], &mut u);
        assert_eq!(u, [7.0]);
    }
}
