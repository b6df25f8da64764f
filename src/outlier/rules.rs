//! The outlier rule cascade.
//!
//! Each rule is a pure function of a [`RuleContext`] returning at most one
//! [`Decision`]. Within a rule, selection is a best-of over candidates in
//! enumeration order, so ties go to the earliest single (by index) or pair
//! (lexicographic).

use crate::angle::meridian_distance;
use crate::fit::{Exclusion, RefitCandidate};
use crate::measurement::Measurement;
use crate::prescription::Prescription;
use crate::quality::FitQuality;

use super::{Decision, OutlierRule, OutlierThresholds};

/// Everything a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub measurements: &'a [Measurement],
    /// Candidates in enumeration order.
    pub candidates: &'a [RefitCandidate],
    pub current: &'a Prescription,
    pub current_quality: FitQuality,
    pub thresholds: &'a OutlierThresholds,
}

impl<'a> RuleContext<'a> {
    fn singles(&self) -> impl Iterator<Item = &'a RefitCandidate> {
        self.candidates.iter().filter(|c| !c.is_pair())
    }

    fn pairs(&self) -> impl Iterator<Item = &'a RefitCandidate> {
        self.candidates.iter().filter(|c| c.is_pair())
    }

    /// |power − candidate curve| for one excluded measurement.
    fn point_distance(&self, candidate: &RefitCandidate, index: usize) -> f64 {
        let m = &self.measurements[index];
        (m.power_d - candidate.prescription.power_at(m.angle_deg)).abs()
    }

    fn describe(&self, exclusion: &Exclusion) -> String {
        exclusion
            .iter()
            .map(|i| {
                let m = &self.measurements[i];
                format!("#{} at {:.1}° ({:+.2} D)", i, m.angle_deg, m.power_d)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Evaluate one rule.
pub fn apply_rule(rule: OutlierRule, ctx: &RuleContext<'_>) -> Option<Decision> {
    match rule {
        OutlierRule::CylinderPush => cylinder_push(ctx),
        OutlierRule::AxisPush => axis_push(ctx),
        OutlierRule::FarFromCurve => far_from_curve(ctx),
        OutlierRule::FitQualityDeforming => fit_quality_deforming(ctx),
    }
}

// ── Selection helpers ───────────────────────────────────────────────────────

/// Candidate with the largest finite metric; earliest wins ties.
fn max_by_metric<'a>(
    candidates: impl Iterator<Item = &'a RefitCandidate>,
    metric: impl Fn(&RefitCandidate) -> f64,
) -> Option<(&'a RefitCandidate, f64)> {
    let mut best: Option<(&'a RefitCandidate, f64)> = None;
    for c in candidates {
        let v = metric(c);
        if v.is_finite() && best.map_or(true, |(_, b)| v > b) {
            best = Some((c, v));
        }
    }
    best
}

/// Candidate with the smallest finite metric; earliest wins ties.
fn min_by_metric<'a>(
    candidates: impl Iterator<Item = &'a RefitCandidate>,
    metric: impl Fn(&RefitCandidate) -> f64,
) -> Option<(&'a RefitCandidate, f64)> {
    max_by_metric(candidates, |c| -metric(c)).map(|(c, v)| (c, -v))
}

/// Population mean and standard deviation.
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn spread(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    max - min
}

/// How much larger the candidate's |cylinder| is than the current one.
fn cylinder_increase(c: &RefitCandidate) -> f64 {
    -c.cylinder_reduction
}

fn decide(rule: OutlierRule, c: &RefitCandidate, reason: String) -> Decision {
    Decision {
        rule,
        exclusion: c.exclusion,
        prescription: c.prescription,
        score: c.score,
        base_score: c.base_score,
        reason,
    }
}

// ── Rules ───────────────────────────────────────────────────────────────────

/// A point whose removal lowers the cylinder by more than the push threshold.
///
/// The threshold grows for high cylinders. A pair wins only when its reduction
/// beats both the threshold and the best single by another `cyl_push_small`.
fn cylinder_push(ctx: &RuleContext<'_>) -> Option<Decision> {
    let t = ctx.thresholds;
    let threshold = if ctx.current.cylinder.abs() > t.cyl_push_large_above {
        t.cyl_push_large
    } else {
        t.cyl_push_small
    };

    let best_single = max_by_metric(ctx.singles(), |c| c.cylinder_reduction);
    let best_pair = max_by_metric(ctx.pairs(), |c| c.cylinder_reduction);
    let single_margin = best_single.map_or(f64::NEG_INFINITY, |(_, m)| m);

    let reason = |c: &RefitCandidate| {
        format!(
            "Lowering Cyl because it was pushing the cyl higher: {} (cyl {:.2} -> {:.2})",
            ctx.describe(&c.exclusion),
            ctx.current.cylinder,
            c.prescription.cylinder
        )
    };

    if let Some((pair, margin)) = best_pair {
        if margin - single_margin.max(threshold) > t.cyl_push_small {
            return Some(decide(OutlierRule::CylinderPush, pair, reason(pair)));
        }
    }
    match best_single {
        Some((single, margin)) if margin > threshold => {
            Some(decide(OutlierRule::CylinderPush, single, reason(single)))
        }
        _ => None,
    }
}

/// A single whose axis disagrees with every other refit.
///
/// For each single candidate, its mean meridian distance to all other singles'
/// axes; the largest must clear mean + σ-multiplier·σ, and its cylinder may not
/// grow by more than `axis_push_max_cyl_increase`.
fn axis_push(ctx: &RuleContext<'_>) -> Option<Decision> {
    let t = ctx.thresholds;
    if ctx.current_quality.score <= t.rough_fit_score
        || ctx.current.cylinder.abs() <= t.axis_push_min_cylinder
    {
        return None;
    }

    let singles: Vec<&RefitCandidate> = ctx.singles().collect();
    if singles.len() < 3 {
        return None;
    }

    let n = singles.len();
    let averages: Vec<f64> = singles
        .iter()
        .enumerate()
        .map(|(i, a)| {
            singles
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, b)| meridian_distance(a.prescription.axis, b.prescription.axis))
                .sum::<f64>()
                / (n - 1) as f64
        })
        .collect();

    let (mean, sd) = mean_std(&averages);
    if sd <= 0.0 {
        return None;
    }

    let mut best = 0usize;
    for (i, &v) in averages.iter().enumerate() {
        if v > averages[best] {
            best = i;
        }
    }

    let candidate = singles[best];
    if averages[best] - mean > t.axis_push_sigma * sd
        && cylinder_increase(candidate) <= t.axis_push_max_cyl_increase
    {
        let reason = format!(
            "Changing Axis because it was pulling the axis away: {} (axis {:.0} -> {:.0})",
            ctx.describe(&candidate.exclusion),
            ctx.current.axis,
            candidate.prescription.axis
        );
        return Some(decide(OutlierRule::AxisPush, candidate, reason));
    }
    None
}

/// A point that stands out by its distance to the curve fitted without it.
///
/// The bar is the larger of `far_from_curve_floor` and mean + σ-multiplier·σ of
/// the single distances. A pair is preferred when its mean distance clears the
/// same bar, beats the best single, and both of its points are individually
/// beyond `far_from_curve_threshold`.
fn far_from_curve(ctx: &RuleContext<'_>) -> Option<Decision> {
    let t = ctx.thresholds;
    if ctx.current_quality.score <= t.rough_fit_score {
        return None;
    }

    let distances: Vec<f64> = ctx.singles().map(|c| c.excluded_distance).collect();
    if distances.is_empty() || spread(&distances) < t.min_spread {
        return None;
    }

    let (mean, sd) = mean_std(&distances);
    let bar = t.far_from_curve_floor.max(mean + t.far_from_curve_sigma * sd);
    let cylinder_ok =
        |c: &RefitCandidate| cylinder_increase(c) <= t.far_from_curve_max_cyl_increase;
    let reason = |c: &RefitCandidate| {
        format!(
            "Removing point because it was far from the curve: {} ({:.2} D off)",
            ctx.describe(&c.exclusion),
            c.excluded_distance
        )
    };

    let best_single = max_by_metric(ctx.singles(), |c| c.excluded_distance);
    let single_distance = best_single.map_or(f64::NEG_INFINITY, |(_, d)| d);

    let best_pair = max_by_metric(ctx.pairs(), |c| c.excluded_distance);
    if let Some((pair, d)) = best_pair {
        let both_far = pair
            .exclusion
            .iter()
            .all(|i| ctx.point_distance(pair, i) > t.far_from_curve_threshold);
        if d > bar && d > single_distance && both_far && cylinder_ok(pair) {
            return Some(decide(OutlierRule::FarFromCurve, pair, reason(pair)));
        }
    }

    match best_single {
        Some((single, d)) if d > bar && cylinder_ok(single) => {
            Some(decide(OutlierRule::FarFromCurve, single, reason(single)))
        }
        _ => None,
    }
}

/// A point whose removal lowers the score by at least `min_deforming_fit_delta`.
///
/// A pair needs `pair_deforming_delta_factor` times the delta and must undercut
/// the best single by `pair_deforming_margin`.
fn fit_quality_deforming(ctx: &RuleContext<'_>) -> Option<Decision> {
    let t = ctx.thresholds;
    let scores: Vec<f64> = ctx.singles().map(|c| c.score).collect();
    if scores.is_empty() || spread(&scores) < t.min_spread {
        return None;
    }

    let current = ctx.current_quality.score;
    let reason = |c: &RefitCandidate| {
        format!(
            "Improving fit because it was deforming the fit: {} (score {:.2} -> {:.2})",
            ctx.describe(&c.exclusion),
            current,
            c.score
        )
    };

    let best_single = min_by_metric(ctx.singles(), |c| c.score);
    let single_score = best_single.map_or(f64::INFINITY, |(_, s)| s);

    if let Some((pair, s)) = min_by_metric(ctx.pairs(), |c| c.score) {
        let delta = t.min_deforming_fit_delta * t.pair_deforming_delta_factor;
        if current - s >= delta && single_score - s >= t.pair_deforming_margin {
            return Some(decide(OutlierRule::FitQualityDeforming, pair, reason(pair)));
        }
    }

    match best_single {
        Some((single, s)) if current - s >= t.min_deforming_fit_delta => {
            Some(decide(OutlierRule::FitQualityDeforming, single, reason(single)))
        }
        _ => None,
    }
}
