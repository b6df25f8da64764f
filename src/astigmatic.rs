//! Sinusoidal astigmatic power model.
//!
//! ```text
//! P(θ) = sphere + cylinder · sin²(axis − θ)
//! ```
//!
//! Parameters are laid out as `[sphere, cylinder, axis]` with the axis in degrees,
//! so the axis gradient carries the degree → radian factor.

use crate::lm::Model;
use crate::prescription::Prescription;

/// Parameter index of the sphere.
pub const SPHERE: usize = 0;
/// Parameter index of the cylinder.
pub const CYLINDER: usize = 1;
/// Parameter index of the axis (degrees).
pub const AXIS: usize = 2;
/// Number of model parameters.
pub const NUM_PARAMS: usize = 3;

/// Stateless astigmatic model for the Levenberg-Marquardt solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct AstigmaticModel;

impl AstigmaticModel {
    /// Expected power of `rx` along meridian `angle_deg`.
    #[inline]
    pub fn power(rx: &Prescription, angle_deg: f64) -> f64 {
        Self.value(angle_deg, &Self::params(rx))
    }

    /// Pack a prescription into the solver's parameter layout.
    pub fn params(rx: &Prescription) -> [f64; NUM_PARAMS] {
        [rx.sphere, rx.cylinder, rx.axis]
    }

    /// Unpack solver parameters; the axis is normalized into [0, 180).
    pub fn prescription(params: &[f64]) -> Prescription {
        Prescription::new(params[SPHERE], params[CYLINDER], params[AXIS])
    }
}

impl Model for AstigmaticModel {
    #[inline]
    fn value(&self, x: f64, params: &[f64]) -> f64 {
        let s = (params[AXIS] - x).to_radians().sin();
        params[SPHERE] + params[CYLINDER] * s * s
    }

    #[inline]
    fn gradient(&self, x: f64, params: &[f64], index: usize) -> f64 {
        let u = (params[AXIS] - x).to_radians();
        match index {
            SPHERE => 1.0,
            CYLINDER => {
                let s = u.sin();
                s * s
            }
            // d/d(axis°) sin²(u) = sin(2u) · π/180
            AXIS => params[CYLINDER] * (2.0 * u).sin() * 1.0_f64.to_radians(),
            _ => 0.0,
        }
    }
}
