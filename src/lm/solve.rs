//! Levenberg-Marquardt iteration.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

use super::{CurveData, LmConfig, LmReport, LmStatus, Model, SolverError};

/// Weighted chi-square of `params` against `data`.
pub fn chi_square<M: Model + ?Sized>(model: &M, data: &CurveData<'_>, params: &[f64]) -> f64 {
    data.x
        .iter()
        .zip(data.y)
        .zip(data.sigma)
        .map(|((&x, &y), &sigma)| {
            let r = (y - model.value(x, params)) / sigma;
            r * r
        })
        .sum()
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), SolverError> {
    if expected == actual {
        Ok(())
    } else {
        Err(SolverError::DimensionMismatch {
            what,
            expected,
            actual,
        })
    }
}

/// Fit `params` to `data` in place.
///
/// Only parameters with `vary[i] == true` are updated; the others stay at their
/// input value. A rejected trial step (higher or NaN χ²) leaves `params`
/// untouched. Hitting `config.max_iterations` is a normal exit.
///
/// # Errors
///
/// [`SolverError::SingularSystem`] if the damped normal equations cannot be
/// solved, [`SolverError::DimensionMismatch`] if the slices disagree in length.
pub fn levenberg_marquardt<M: Model + ?Sized>(
    model: &M,
    data: &CurveData<'_>,
    params: &mut [f64],
    vary: &[bool],
    config: &LmConfig,
) -> Result<LmReport, SolverError> {
    check_len("y", data.x.len(), data.y.len())?;
    check_len("sigma", data.x.len(), data.sigma.len())?;
    check_len("vary", params.len(), vary.len())?;

    let free: Vec<usize> = vary
        .iter()
        .enumerate()
        .filter(|(_, &v)| v)
        .map(|(i, _)| i)
        .collect();

    let mut lambda = config.lambda_init;
    let mut chi2 = chi_square(model, data, params);

    if free.is_empty() {
        return Ok(LmReport {
            lambda,
            chi2,
            iterations: 0,
            status: LmStatus::NoFreeParameters,
        });
    }

    let nf = free.len();
    let mut grads = vec![0.0f64; nf];
    let mut trial = params.to_vec();
    let mut stable = 0u32;
    let mut iterations = 0u32;
    let mut status = LmStatus::MaxIterations;

    while iterations < config.max_iterations {
        iterations += 1;

        // Gauss-Newton normal equations over the free parameters
        let mut hessian = DMatrix::<f64>::zeros(nf, nf);
        let mut gradient = DVector::<f64>::zeros(nf);
        for ((&x, &y), &sigma) in data.x.iter().zip(data.y).zip(data.sigma) {
            let weight = 1.0 / (sigma * sigma);
            let residual = y - model.value(x, params);
            for (k, &p) in free.iter().enumerate() {
                grads[k] = model.gradient(x, params, p);
            }
            for r in 0..nf {
                gradient[r] += weight * residual * grads[r];
                for c in 0..nf {
                    hessian[(r, c)] += weight * grads[r] * grads[c];
                }
            }
        }
        for r in 0..nf {
            hessian[(r, r)] *= 1.0 + lambda;
        }

        let Some(step) = hessian
            .lu()
            .solve(&gradient)
            .filter(|d| d.iter().all(|v| v.is_finite()))
        else {
            debug!(
                "LM: singular normal equations at iteration {} (λ={:.3e}, χ²={:.6e})",
                iterations, lambda, chi2
            );
            return Err(SolverError::SingularSystem {
                iteration: iterations,
            });
        };

        trial.copy_from_slice(params);
        for (k, &p) in free.iter().enumerate() {
            trial[p] += step[k];
        }
        let trial_chi2 = chi_square(model, data, &trial);
        let delta = (trial_chi2 - chi2).abs();

        // NaN compares false: never accepted
        let accepted = trial_chi2 < chi2;
        if accepted {
            for &p in &free {
                params[p] = trial[p];
            }
            chi2 = trial_chi2;
            lambda *= 0.1;
        } else {
            lambda *= 10.0;
        }

        trace!(
            "LM iter {}: χ²={:.6e}, trial χ²={:.6e}, λ={:.3e}, accepted={}",
            iterations,
            chi2,
            trial_chi2,
            lambda,
            accepted
        );

        // NaN delta also fails this test and resets the streak
        if delta <= config.tolerance {
            stable += 1;
            if stable >= config.stable_iterations {
                status = LmStatus::Converged;
                break;
            }
        } else {
            stable = 0;
        }
    }

    debug!(
        "LM: {:?} after {} iterations, χ²={:.6e}, λ={:.3e}",
        status, iterations, chi2, lambda
    );

    Ok(LmReport {
        lambda,
        chi2,
        iterations,
        status,
    })
}
