//! Spherocylindrical prescription and cylinder sign conventions.

use crate::angle::normalize_meridian;
use crate::astigmatic::AstigmaticModel;

/// Sign convention for the cylinder component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CylinderConvention {
    /// Cylinder ≤ 0 (common in optometry).
    #[default]
    Minus,
    /// Cylinder ≥ 0 (common in ophthalmology).
    Plus,
}

/// A spherocylindrical prescription.
///
/// The power along meridian θ is `sphere + cylinder · sin²(axis − θ)`.
/// The axis is meaningless when the cylinder is (close to) zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Prescription {
    /// Spherical power in diopters.
    pub sphere: f64,
    /// Cylindrical power in diopters (either sign).
    pub cylinder: f64,
    /// Cylinder axis in degrees, in [0, 180).
    pub axis: f64,
}

impl Prescription {
    /// Create a prescription, normalizing the axis into [0, 180).
    pub fn new(sphere: f64, cylinder: f64, axis: f64) -> Self {
        Self {
            sphere,
            cylinder,
            axis: normalize_meridian(axis),
        }
    }

    /// Power predicted along meridian `angle_deg`.
    pub fn power_at(&self, angle_deg: f64) -> f64 {
        AstigmaticModel::power(self, angle_deg)
    }

    /// The same lens written in the opposite cylinder convention.
    ///
    /// Sphere becomes `sphere + cylinder`, the cylinder flips sign and the axis
    /// rotates by 90°. The power profile is unchanged.
    pub fn transposed(&self) -> Self {
        Self::new(self.sphere + self.cylinder, -self.cylinder, self.axis + 90.0)
    }

    /// Convention this prescription is currently written in. A zero cylinder
    /// counts as either; it is reported as [`CylinderConvention::Minus`].
    pub fn convention(&self) -> CylinderConvention {
        if self.cylinder > 0.0 {
            CylinderConvention::Plus
        } else {
            CylinderConvention::Minus
        }
    }

    /// Rewrite in the requested convention, transposing only when needed.
    pub fn to_convention(&self, convention: CylinderConvention) -> Self {
        let needs_flip = match convention {
            CylinderConvention::Minus => self.cylinder > 0.0,
            CylinderConvention::Plus => self.cylinder < 0.0,
        };
        if needs_flip {
            self.transposed()
        } else {
            *self
        }
    }

    /// Sphere plus half the cylinder; identical in both conventions.
    pub fn spherical_equivalent(&self) -> f64 {
        self.sphere + self.cylinder / 2.0
    }
}
