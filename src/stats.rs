//! Residual statistics of a fit, for reporting only.

use crate::measurement::{Measurement, OutlierMask};
use crate::prescription::Prescription;

/// Residual of one non-outlier reading against the fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointResidual {
    /// Index into the measurement slice.
    pub index: usize,
    pub angle_deg: f64,
    pub power_d: f64,
    /// Power the fit predicts at `angle_deg`.
    pub expected_d: f64,
    /// `power_d − expected_d`.
    pub residual_d: f64,
}

/// Residual summary of a fit over its non-outlier readings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FitSnapshot {
    /// Per-point residuals in measurement order.
    pub residuals: Vec<PointResidual>,
    pub mean: f64,
    pub mean_abs: f64,
    /// Population standard deviation of the signed residuals.
    pub std_dev: f64,
    /// Indices into `residuals`, largest |residual| first (ties by index).
    pub ranked: Vec<usize>,
}

impl FitSnapshot {
    /// Summarize `fit` against the readings not flagged in `mask`.
    pub fn compute(measurements: &[Measurement], mask: &OutlierMask, fit: &Prescription) -> Self {
        let residuals: Vec<PointResidual> = measurements
            .iter()
            .enumerate()
            .filter(|(i, _)| !mask.is_outlier(*i))
            .map(|(index, m)| {
                let expected_d = fit.power_at(m.angle_deg);
                PointResidual {
                    index,
                    angle_deg: m.angle_deg,
                    power_d: m.power_d,
                    expected_d,
                    residual_d: m.power_d - expected_d,
                }
            })
            .collect();

        if residuals.is_empty() {
            return Self::default();
        }

        let n = residuals.len() as f64;
        let mean = residuals.iter().map(|r| r.residual_d).sum::<f64>() / n;
        let mean_abs = residuals.iter().map(|r| r.residual_d.abs()).sum::<f64>() / n;
        let var = residuals
            .iter()
            .map(|r| (r.residual_d - mean).powi(2))
            .sum::<f64>()
            / n;

        let mut ranked: Vec<usize> = (0..residuals.len()).collect();
        // stable sort keeps index order among equal magnitudes
        ranked.sort_by(|&a, &b| {
            residuals[b]
                .residual_d
                .abs()
                .total_cmp(&residuals[a].residual_d.abs())
        });

        Self {
            residuals,
            mean,
            mean_abs,
            std_dev: var.sqrt(),
            ranked,
        }
    }

    /// The `n` worst residuals, largest magnitude first.
    pub fn worst(&self, n: usize) -> Vec<&PointResidual> {
        self.ranked
            .iter()
            .take(n)
            .map(|&i| &self.residuals[i])
            .collect()
    }
}
