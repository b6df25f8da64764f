//! Generic damped Gauss-Newton (Levenberg-Marquardt) curve fitting.
//!
//! Minimizes the weighted chi-square
//!
//! ```text
//! χ² = Σᵢ ((yᵢ − f(xᵢ, a)) / σᵢ)²
//! ```
//!
//! over any model implementing [`Model`]. The solver is independent of the
//! parameter count; the astigmatic fit is only one user.
//!
//! Each iteration builds the Gauss-Newton normal equations over the free
//! parameters, damps the diagonal by `(1 + λ)`, solves by LU decomposition and
//! keeps the trial step only if it lowers χ². Accepted steps shrink λ by 10×,
//! rejected steps grow it by 10×.

mod solve;

pub use solve::{chi_square, levenberg_marquardt};

use thiserror::Error;

/// A model that can be fitted: a scalar function of one abscissa and a
/// parameter vector, with analytic partial derivatives.
pub trait Model {
    /// Model value at `x`.
    fn value(&self, x: f64, params: &[f64]) -> f64;
    /// Partial derivative of [`Model::value`] with respect to `params[index]`.
    fn gradient(&self, x: f64, params: &[f64], index: usize) -> f64;
}

/// Observations to fit: abscissae, ordinates and per-sample standard deviations.
#[derive(Debug, Clone, Copy)]
pub struct CurveData<'a> {
    pub x: &'a [f64],
    pub y: &'a [f64],
    pub sigma: &'a [f64],
}

impl<'a> CurveData<'a> {
    pub fn new(x: &'a [f64], y: &'a [f64], sigma: &'a [f64]) -> Self {
        Self { x, y, sigma }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Configuration for the Levenberg-Marquardt solver.
#[derive(Debug, Clone)]
pub struct LmConfig {
    /// Initial damping factor λ₀. Default 0.01.
    pub lambda_init: f64,
    /// Convergence tolerance on |Δχ²| between the current and trial parameters.
    /// Default 1e-6.
    pub tolerance: f64,
    /// Number of consecutive iterations within `tolerance` required to stop. Default 4.
    pub stable_iterations: u32,
    /// Iteration cap. Reaching it is not an error. Default 300.
    pub max_iterations: u32,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            lambda_init: 0.01,
            tolerance: 1e-6,
            stable_iterations: 4,
            max_iterations: 300,
        }
    }
}

/// How the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmStatus {
    /// χ² stayed within tolerance for the required number of iterations.
    Converged,
    /// The iteration cap was reached first.
    MaxIterations,
    /// Every parameter was held fixed; nothing to do.
    NoFreeParameters,
}

/// Summary of a finished solve.
#[derive(Debug, Clone)]
pub struct LmReport {
    /// Damping factor at exit.
    pub lambda: f64,
    /// χ² of the returned parameters.
    pub chi2: f64,
    /// Iterations performed.
    pub iterations: u32,
    pub status: LmStatus,
}

/// Errors raised by the solver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    /// The damped normal equations could not be solved: the data do not
    /// constrain every free parameter (e.g. all samples at one angle).
    #[error("could not compute a fit for this data: singular system at iteration {iteration}")]
    SingularSystem { iteration: u32 },
    /// Input slices disagree in length.
    #[error("{what} has length {actual}, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}
