//! Joint friction compensation.
//!
//! Coulomb plus viscous model per joint, added to the commanded effort:
//!
//! ```text
//! τ_f = fs × sign(v) + fv × v        sign(0) = 0
//! ```
//!
//! With a torque constant configured the final effort is converted to motor
//! current (`i = τ / kt`).

use heapless::Vec as FixedVec;
use mpc_common::config::FrictionConfig;
use mpc_common::consts::MAX_JOINTS;
use mpc_common::law::{DimensionError, Dimensions};

/// Per-joint friction coefficients.
#[derive(Debug, Clone, PartialEq)]
pub struct FrictionModel {
    static_friction: FixedVec<f64, MAX_JOINTS>,
    viscous_friction: FixedVec<f64, MAX_JOINTS>,
    torque_constant: Option<FixedVec<f64, MAX_JOINTS>>,
}

fn to_fixed(
    field: &'static str,
    values: &[f64],
    dims: Dimensions,
) -> Result<FixedVec<f64, MAX_JOINTS>, DimensionError> {
    let expected = dims.joint_count();
    if values.len() != expected {
        return Err(DimensionError::LengthMismatch {
            field,
            expected,
            actual: values.len(),
        });
    }
    FixedVec::from_slice(values).map_err(|_| DimensionError::TooManyJoints {
        joint_count: values.len(),
        max: MAX_JOINTS,
    })
}

impl FrictionModel {
    /// Build from coefficient slices.
    pub fn new(
        dims: Dimensions,
        static_friction: &[f64],
        viscous_friction: &[f64],
        torque_constant: Option<&[f64]>,
    ) -> Result<Self, DimensionError> {
        Ok(Self {
            static_friction: to_fixed("static_friction", static_friction, dims)?,
            viscous_friction: to_fixed("viscous_friction", viscous_friction, dims)?,
            torque_constant: torque_constant
                .map(|kt| to_fixed("torque_constant", kt, dims))
                .transpose()?,
        })
    }

    /// Model from the `[friction]` section, `None` when disabled.
    pub fn from_config(
        config: &FrictionConfig,
        dims: Dimensions,
    ) -> Result<Option<Self>, DimensionError> {
        if !config.enabled {
            return Ok(None);
        }
        let kt = (!config.torque_constant.is_empty()).then_some(config.torque_constant.as_slice());
        Self::new(dims, &config.static_friction, &config.viscous_friction, kt).map(Some)
    }

    /// Friction torque of joint `i` at velocity `v`
    #[inline]
    pub fn torque(&self, joint: usize, velocity: f64) -> f64 {
        let sign = if velocity > 0.0 {
            1.0
        } else if velocity < 0.0 {
            -1.0
        } else {
            0.0
        };
        self.static_friction[joint] * sign + self.viscous_friction[joint] * velocity
    }

    /// Add friction torque to every joint of `effort`.
    #[inline]
    pub fn compensate(&self, velocity: &[f64], effort: &mut [f64]) {
        for (i, (u, v)) in effort.iter_mut().zip(velocity).enumerate() {
            *u += self.torque(i, *v);
        }
    }

    /// Convert effort to current in place, if a torque constant is configured.
    #[inline]
    pub fn to_current(&self, effort: &mut [f64]) {
        if let Some(kt) = &self.torque_constant {
            for (u, k) in effort.iter_mut().zip(kt) {
                *u /= k;
            }
        }
    }
}
