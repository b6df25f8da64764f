//! Leave-one-out and leave-two-out refit candidates.
//!
//! For `n` measurements this produces `n + n(n-1)/2` independent refits. With
//! `n` around 20 that is the dominant cost of outlier resolution, so the
//! `parallel` feature spreads it over the rayon pool. Results always come back
//! in enumeration order (singles by index, then pairs lexicographically), which
//! is the tie-break order every rule relies on.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::debug;

use crate::lm::SolverError;
use crate::measurement::{inliers, Measurement, OutlierMask};
use crate::prescription::Prescription;
use crate::quality::{fit_quality_with_penalties, ScoreConfig};

use super::{curve_fitting, FitConfig};

/// The point(s) left out of a refit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Exclusion {
    first: usize,
    second: Option<usize>,
}

impl Exclusion {
    /// Leave out one measurement.
    pub fn single(index: usize) -> Self {
        Self {
            first: index,
            second: None,
        }
    }

    /// Leave out two measurements. The indices are stored in ascending order.
    pub fn pair(a: usize, b: usize) -> Self {
        Self {
            first: a.min(b),
            second: Some(a.max(b)),
        }
    }

    pub fn first(&self) -> usize {
        self.first
    }

    pub fn second(&self) -> Option<usize> {
        self.second
    }

    pub fn is_pair(&self) -> bool {
        self.second.is_some()
    }

    /// Number of excluded points (1 or 2).
    pub fn len(&self) -> usize {
        if self.is_pair() {
            2
        } else {
            1
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, index: usize) -> bool {
        self.first == index || self.second == Some(index)
    }

    /// Excluded indices, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> {
        std::iter::once(self.first).chain(self.second)
    }
}

/// A prescription refitted with one or two measurements left out.
#[derive(Debug, Clone)]
pub struct RefitCandidate {
    /// Which measurement(s) were left out.
    pub exclusion: Exclusion,
    /// Fit of the remaining measurements.
    pub prescription: Prescription,
    /// Fit-quality score including user-error and exclusion penalties.
    pub score: f64,
    /// Fit-quality score without penalties.
    pub base_score: f64,
    /// Mean |power − refit curve| over the excluded point(s), in diopters.
    pub excluded_distance: f64,
    /// |current cyl| − |refit cyl|; positive when leaving the point(s) out lowers
    /// the cylinder.
    pub cylinder_reduction: f64,
}

impl RefitCandidate {
    pub fn is_pair(&self) -> bool {
        self.exclusion.is_pair()
    }
}

/// Every leave-one-out exclusion followed by every leave-two-out pair `i < k`.
pub fn enumerate_exclusions(n: usize) -> Vec<Exclusion> {
    let mut out = Vec::with_capacity(n + n * n.saturating_sub(1) / 2);
    out.extend((0..n).map(Exclusion::single));
    for i in 0..n {
        for k in (i + 1)..n {
            out.push(Exclusion::pair(i, k));
        }
    }
    out
}

fn refit_without(
    measurements: &[Measurement],
    exclusion: Exclusion,
    known_user_errors: usize,
    current_fit: &Prescription,
    fit_config: &FitConfig,
    score_config: &ScoreConfig,
) -> Result<RefitCandidate, SolverError> {
    let mask = OutlierMask::from_exclusion(measurements.len(), &exclusion);
    // axes are only comparable within one cylinder convention
    let rx = curve_fitting(&inliers(measurements, &mask), fit_config)?
        .to_convention(current_fit.convention());
    let quality =
        fit_quality_with_penalties(measurements, &mask, &rx, known_user_errors, score_config);

    let excluded_distance = exclusion
        .iter()
        .map(|i| {
            let m = &measurements[i];
            (m.power_d - rx.power_at(m.angle_deg)).abs()
        })
        .sum::<f64>()
        / exclusion.len() as f64;

    Ok(RefitCandidate {
        exclusion,
        prescription: rx,
        score: quality.score,
        base_score: quality.base,
        excluded_distance,
        cylinder_reduction: current_fit.cylinder.abs() - rx.cylinder.abs(),
    })
}

/// Refit and score every leave-one-out and leave-two-out subset.
///
/// `current_fit` is the fit of the full set. Every refit is written in its
/// cylinder convention, and records how far its cylinder moved from it.
///
/// # Errors
///
/// The first solver failure in enumeration order is returned unmodified.
pub fn compile_all_outlier_options(
    measurements: &[Measurement],
    known_user_errors: usize,
    current_fit: &Prescription,
    fit_config: &FitConfig,
    score_config: &ScoreConfig,
) -> Result<Vec<RefitCandidate>, SolverError> {
    let exclusions = enumerate_exclusions(measurements.len());

    let refit = |e: &Exclusion| {
        refit_without(
            measurements,
            *e,
            known_user_errors,
            current_fit,
            fit_config,
            score_config,
        )
    };

    #[cfg(feature = "parallel")]
    let results: Vec<Result<RefitCandidate, SolverError>> =
        exclusions.par_iter().map(refit).collect();
    #[cfg(not(feature = "parallel"))]
    let results: Vec<Result<RefitCandidate, SolverError>> =
        exclusions.iter().map(refit).collect();

    let candidates = results.into_iter().collect::<Result<Vec<_>, _>>()?;

    debug!(
        "compiled {} refit candidates for {} measurements",
        candidates.len(),
        measurements.len()
    );

    Ok(candidates)
}
