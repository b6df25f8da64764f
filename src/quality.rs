//! Local-roughness fit-quality score.
//!
//! Each non-outlier reading is compared with the average of its two neighbours
//! a fixed angular offset away on either side (22.5° by default, one step of an
//! eight-meridian scan). A neighbour is a real non-outlier reading when one lies
//! within tolerance of the offset, otherwise the fitted curve's value there. The
//! score is the mean |neighbour average − reading| and is distinct from the
//! least-squares residual the solver minimizes: lower means smoother.

use crate::angle::{meridian_distance, normalize_meridian};
use crate::measurement::{Measurement, OutlierMask};
use crate::prescription::Prescription;

/// Configuration for fit-quality scoring.
#[derive(Debug, Clone)]
pub struct ScoreConfig {
    /// Angular offset of the neighbours on either side, in degrees. Default 22.5.
    pub neighbor_offset_deg: f64,
    /// How close a reading must be to the offset to stand in as a real
    /// neighbour, in degrees. Default 1.0.
    pub neighbor_tolerance_deg: f64,
    /// Penalty per known user-entry error. Default 0.23.
    pub user_error_penalty: f64,
    /// Penalty when exactly one outlier is flagged. Default 0.10.
    pub single_outlier_penalty: f64,
    /// Penalty when exactly two outliers are flagged and the base score is
    /// below `pair_penalty_base_limit`. Default 0.35.
    pub pair_outlier_penalty: f64,
    /// Penalty when exactly two outliers are flagged on an already rough fit. Default 0.10.
    pub rough_pair_outlier_penalty: f64,
    /// Base score separating the two pair penalties. Default 0.60.
    pub pair_penalty_base_limit: f64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            neighbor_offset_deg: 22.5,
            neighbor_tolerance_deg: 1.0,
            user_error_penalty: 0.23,
            single_outlier_penalty: 0.10,
            pair_outlier_penalty: 0.35,
            rough_pair_outlier_penalty: 0.10,
            pair_penalty_base_limit: 0.60,
        }
    }
}

/// Base and penalized fit-quality scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitQuality {
    /// Mean local residual.
    pub base: f64,
    /// `base` plus user-error and exclusion penalties.
    pub score: f64,
}

/// Power at `target_deg`: the nearest non-outlier reading within tolerance
/// (other than `skip`), else the fitted curve.
fn neighbor_power(
    measurements: &[Measurement],
    mask: &OutlierMask,
    fit: &Prescription,
    skip: usize,
    target_deg: f64,
    tolerance_deg: f64,
) -> f64 {
    let mut best: Option<(f64, f64)> = None; // (distance, power)
    for (j, m) in measurements.iter().enumerate() {
        if j == skip || mask.is_outlier(j) {
            continue;
        }
        let d = meridian_distance(m.angle_deg, target_deg);
        if d <= tolerance_deg && best.map_or(true, |(bd, _)| d < bd) {
            best = Some((d, m.power_d));
        }
    }
    best.map_or_else(|| fit.power_at(target_deg), |(_, p)| p)
}

/// Mean local residual of the non-outlier readings against their neighbours.
///
/// Returns 0 when every reading is flagged.
pub fn fit_quality(
    measurements: &[Measurement],
    mask: &OutlierMask,
    fit: &Prescription,
    config: &ScoreConfig,
) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (i, m) in measurements.iter().enumerate() {
        if mask.is_outlier(i) {
            continue;
        }
        let below = normalize_meridian(m.angle_deg - config.neighbor_offset_deg);
        let above = normalize_meridian(m.angle_deg + config.neighbor_offset_deg);
        let tol = config.neighbor_tolerance_deg;
        let avg = 0.5
            * (neighbor_power(measurements, mask, fit, i, below, tol)
                + neighbor_power(measurements, mask, fit, i, above, tol));
        sum += (avg - m.power_d).abs();
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// [`fit_quality`] plus penalties for known user-entry errors and for the
/// number of outliers already flagged in `mask`.
pub fn fit_quality_with_penalties(
    measurements: &[Measurement],
    mask: &OutlierMask,
    fit: &Prescription,
    known_user_errors: usize,
    config: &ScoreConfig,
) -> FitQuality {
    let base = fit_quality(measurements, mask, fit, config);
    let mut score = base + config.user_error_penalty * known_user_errors as f64;
    match mask.count() {
        1 => score += config.single_outlier_penalty,
        2 if base < config.pair_penalty_base_limit => score += config.pair_outlier_penalty,
        2 => score += config.rough_pair_outlier_penalty,
        _ => {}
    }
    FitQuality { base, score }
}
