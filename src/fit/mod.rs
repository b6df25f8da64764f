//! Prescription fitting from meridian measurements.
//!
//! Fitting is two-stage: an analytical seed from the extreme readings
//! ([`guess_prescription`]), then a Levenberg-Marquardt refinement of all three
//! parameters ([`curve_fitting`]). Degenerate inputs (too few points, or no
//! measurable cylinder, where the axis gradient vanishes) skip the solver and
//! return the seed.
//!
//! [`compile_all_outlier_options`] reruns the fit with every single point and
//! every pair of points excluded, which is what the outlier resolver chooses from.

pub mod candidates;

pub use candidates::{compile_all_outlier_options, enumerate_exclusions, Exclusion, RefitCandidate};

use tracing::debug;

use crate::angle::normalize_meridian;
use crate::astigmatic::{AstigmaticModel, NUM_PARAMS};
use crate::lm::{levenberg_marquardt, CurveData, LmConfig, SolverError};
use crate::measurement::Measurement;
use crate::prescription::Prescription;

/// Configuration for prescription fitting.
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Solver settings. Defaults: λ₀=0.01, tolerance 1e-6, 300 iterations.
    pub lm: LmConfig,
    /// Below this many measurements the analytical guess is returned as-is. Default 3.
    pub min_points: usize,
    /// Guessed |cylinder| below which the solver is skipped, in diopters. Default 0.001.
    pub min_cylinder: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            lm: LmConfig::default(),
            min_points: 3,
            min_cylinder: 0.001,
        }
    }
}

/// Analytical seed prescription.
///
/// cylinder = max − min power, axis = angle of the weakest reading (first on
/// ties), sphere = mean power − cylinder / 2. Returns the zero prescription for
/// an empty slice.
pub fn guess_prescription(measurements: &[Measurement]) -> Prescription {
    let Some(first) = measurements.first() else {
        return Prescription::default();
    };

    let mut weakest = first;
    let mut max_power = first.power_d;
    let mut sum = 0.0;
    for m in measurements {
        if m.power_d < weakest.power_d {
            weakest = m;
        }
        max_power = max_power.max(m.power_d);
        sum += m.power_d;
    }

    let cylinder = max_power - weakest.power_d;
    let mean = sum / measurements.len() as f64;
    Prescription::new(mean - cylinder / 2.0, cylinder, weakest.angle_deg)
}

/// Fit a prescription to `measurements` (already outlier-filtered).
///
/// # Errors
///
/// Propagates [`SolverError::SingularSystem`] when the data cannot constrain the
/// model, e.g. every reading taken along one meridian.
pub fn curve_fitting(
    measurements: &[Measurement],
    config: &FitConfig,
) -> Result<Prescription, SolverError> {
    let guess = guess_prescription(measurements);
    if measurements.len() < config.min_points || guess.cylinder.abs() < config.min_cylinder {
        debug!(
            "curve fit: degenerate input ({} points, guessed cyl {:.4} D), using guess",
            measurements.len(),
            guess.cylinder
        );
        return Ok(guess);
    }

    let x: Vec<f64> = measurements
        .iter()
        .map(|m| normalize_meridian(m.angle_deg))
        .collect();
    let y: Vec<f64> = measurements.iter().map(|m| m.power_d).collect();
    let sigma = vec![1.0; measurements.len()];
    let data = CurveData::new(&x, &y, &sigma);

    let mut params = AstigmaticModel::params(&guess);
    let report = levenberg_marquardt(
        &AstigmaticModel,
        &data,
        &mut params,
        &[true; NUM_PARAMS],
        &config.lm,
    )?;
    let fitted = AstigmaticModel::prescription(&params);

    debug!(
        "curve fit: {} pts, ({:.3}, {:.3} x {:.1}) -> ({:.3}, {:.3} x {:.1}), χ²={:.2e}, {} iters",
        measurements.len(),
        guess.sphere,
        guess.cylinder,
        guess.axis,
        fitted.sphere,
        fitted.cylinder,
        fitted.axis,
        report.chi2,
        report.iterations
    );

    Ok(fitted)
}
