//! Outlier resolution over leave-one/two-out refits.
//!
//! One call to [`resolve_outliers`] makes exactly one decision: it clears the
//! mask, refits the data with every single point and every pair of points left
//! out, and walks an ordered cascade of rules. The first rule that fires flags
//! its candidate's point(s) and returns that candidate's refit; if none fires the
//! current fit is returned with nothing flagged. Callers re-invoke until the
//! decision stops changing (see [`crate::session::MeasurementSession`]).
//!
//! # Rules (default priority)
//!
//! 1. [`OutlierRule::CylinderPush`]: a point inflating the cylinder.
//! 2. [`OutlierRule::AxisPush`]: a point dragging the axis away from consensus.
//! 3. [`OutlierRule::FarFromCurve`]: a point far from the curve fitted without it.
//! 4. [`OutlierRule::FitQualityDeforming`]: a point whose removal clearly smooths the fit.
//!
//! All thresholds are empirical defaults collected in [`OutlierThresholds`].

pub mod rules;

pub use rules::{apply_rule, RuleContext};

use tracing::debug;

use crate::fit::{compile_all_outlier_options, Exclusion, FitConfig};
use crate::lm::SolverError;
use crate::measurement::{Measurement, OutlierMask};
use crate::prescription::Prescription;
use crate::quality::{fit_quality_with_penalties, FitQuality, ScoreConfig};

/// One rule of the outlier cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutlierRule {
    /// Leaving the point out lowers the cylinder by more than the push threshold.
    CylinderPush,
    /// Leaving the point out moves the axis far from where every other refit agrees.
    AxisPush,
    /// The point sits far from the curve fitted without it.
    FarFromCurve,
    /// Leaving the point out improves the fit-quality score by a clear margin.
    FitQualityDeforming,
}

impl OutlierRule {
    /// Default evaluation order.
    pub const DEFAULT_ORDER: [OutlierRule; 4] = [
        OutlierRule::CylinderPush,
        OutlierRule::AxisPush,
        OutlierRule::FarFromCurve,
        OutlierRule::FitQualityDeforming,
    ];
}

/// Empirically tuned thresholds for the rule cascade.
///
/// Distances and cylinder values are in diopters, axis values in degrees, scores
/// in fit-quality units.
#[derive(Debug, Clone)]
pub struct OutlierThresholds {
    /// Resolution needs strictly more measurements than this. Default 6.
    pub min_measurements: usize,
    /// Cylinder reduction needed to flag a point. Default 0.50.
    pub cyl_push_small: f64,
    /// Cylinder reduction needed when the current |cylinder| is large. Default 0.75.
    pub cyl_push_large: f64,
    /// |cylinder| above which `cyl_push_large` applies. Default 2.5.
    pub cyl_push_large_above: f64,
    /// Current score above which the axis-push and far-from-curve rules run. Default 0.40.
    pub rough_fit_score: f64,
    /// Current |cylinder| above which the axis-push rule runs. Default 0.51.
    pub axis_push_min_cylinder: f64,
    /// Standard deviations an axis standout must clear. Default 1.8.
    pub axis_push_sigma: f64,
    /// Largest cylinder increase an axis-push refit may carry. Default 0.12.
    pub axis_push_max_cyl_increase: f64,
    /// Absolute distance floor for the far-from-curve rule. Default 0.50.
    pub far_from_curve_floor: f64,
    /// Distance each point of a far-from-curve pair must exceed. Default 0.65.
    pub far_from_curve_threshold: f64,
    /// Standard deviations a far-from-curve standout must clear. Default 1.8.
    pub far_from_curve_sigma: f64,
    /// Largest cylinder increase a far-from-curve refit may carry. Default 0.25.
    pub far_from_curve_max_cyl_increase: f64,
    /// Minimum spread (max − min) of a candidate metric for a rule to run. Default 0.05.
    pub min_spread: f64,
    /// Score improvement a single exclusion needs to count as deforming. Default 0.15.
    pub min_deforming_fit_delta: f64,
    /// Multiplier on `min_deforming_fit_delta` for pairs. Default 1.5.
    pub pair_deforming_delta_factor: f64,
    /// How far a pair's score must undercut the best single's. Default 0.20.
    pub pair_deforming_margin: f64,
}

impl Default for OutlierThresholds {
    fn default() -> Self {
        Self {
            min_measurements: 6,
            cyl_push_small: 0.50,
            cyl_push_large: 0.75,
            cyl_push_large_above: 2.5,
            rough_fit_score: 0.40,
            axis_push_min_cylinder: 0.51,
            axis_push_sigma: 1.8,
            axis_push_max_cyl_increase: 0.12,
            far_from_curve_floor: 0.50,
            far_from_curve_threshold: 0.65,
            far_from_curve_sigma: 1.8,
            far_from_curve_max_cyl_increase: 0.25,
            min_spread: 0.05,
            min_deforming_fit_delta: 0.15,
            pair_deforming_delta_factor: 1.5,
            pair_deforming_margin: 0.20,
        }
    }
}

/// Configuration for outlier resolution.
#[derive(Debug, Clone)]
pub struct OutlierConfig {
    pub thresholds: OutlierThresholds,
    /// Rules in evaluation order; the first that fires wins.
    pub rules: Vec<OutlierRule>,
    /// Discard a rule's pick when its refit's base score is worse than the
    /// current one, and keep walking the cascade. Default true.
    pub require_score_improvement: bool,
    /// Settings for every refit.
    pub fit: FitConfig,
    /// Settings for every score.
    pub score: ScoreConfig,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            thresholds: OutlierThresholds::default(),
            rules: OutlierRule::DEFAULT_ORDER.to_vec(),
            require_score_improvement: true,
            fit: FitConfig::default(),
            score: ScoreConfig::default(),
        }
    }
}

/// A fired rule: which point(s) to flag and the refit without them.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub rule: OutlierRule,
    pub exclusion: Exclusion,
    pub prescription: Prescription,
    /// Penalized score of the refit.
    pub score: f64,
    /// Unpenalized score of the refit.
    pub base_score: f64,
    /// Human-readable reason for audit trails.
    pub reason: String,
}

/// Outcome of one resolution pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The refit when a rule fired, otherwise the current fit.
    pub prescription: Prescription,
    pub decision: Option<Decision>,
    /// Score of the current fit over all measurements.
    pub current_quality: FitQuality,
}

/// Run one pass of outlier resolution.
///
/// `mask` is reset first, then at most the point(s) of the winning candidate are
/// flagged. With `thresholds.min_measurements` or fewer readings nothing is
/// evaluated.
///
/// # Errors
///
/// Solver failures from any refit propagate unmodified.
pub fn resolve_outliers(
    measurements: &[Measurement],
    mask: &mut OutlierMask,
    known_user_errors: usize,
    current_fit: &Prescription,
    config: &OutlierConfig,
) -> Result<Resolution, SolverError> {
    *mask = OutlierMask::new(measurements.len());

    let current_quality = fit_quality_with_penalties(
        measurements,
        mask,
        current_fit,
        known_user_errors,
        &config.score,
    );
    let unchanged = Resolution {
        prescription: *current_fit,
        decision: None,
        current_quality,
    };

    if measurements.len() <= config.thresholds.min_measurements {
        debug!(
            "outliers: {} measurements, need more than {}; nothing to resolve",
            measurements.len(),
            config.thresholds.min_measurements
        );
        return Ok(unchanged);
    }

    let candidates = compile_all_outlier_options(
        measurements,
        known_user_errors,
        current_fit,
        &config.fit,
        &config.score,
    )?;
    if candidates.is_empty() {
        return Ok(unchanged);
    }

    let ctx = RuleContext {
        measurements,
        candidates: &candidates,
        current: current_fit,
        current_quality,
        thresholds: &config.thresholds,
    };

    for &rule in &config.rules {
        let Some(decision) = apply_rule(rule, &ctx) else {
            continue;
        };
        if config.require_score_improvement && decision.base_score > current_quality.base {
            debug!(
                "outliers: {:?} picked {:?} but its score {:.3} is worse than {:.3}; skipping",
                rule, decision.exclusion, decision.base_score, current_quality.base
            );
            continue;
        }
        for i in decision.exclusion.iter() {
            mask.flag(i);
        }
        debug!(
            "outliers: {:?} flagged {:?}, score {:.3} -> {:.3}: {}",
            rule, decision.exclusion, current_quality.score, decision.score, decision.reason
        );
        return Ok(Resolution {
            prescription: decision.prescription,
            decision: Some(decision),
            current_quality,
        });
    }

    debug!(
        "outliers: no rule fired (score {:.3}, {} candidates)",
        current_quality.score,
        candidates.len()
    );
    Ok(unchanged)
}
