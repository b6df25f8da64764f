//! A measurement session: the readings, their outlier mask and the decision
//! trace, with the fit → resolve → refit loop driven from one place.

use tracing::debug;

use crate::fit::curve_fitting;
use crate::lm::SolverError;
use crate::measurement::{inliers, Measurement, OutlierMask};
use crate::outlier::{resolve_outliers, OutlierConfig, OutlierRule};
use crate::prescription::{CylinderConvention, Prescription};
use crate::stats::FitSnapshot;

/// Configuration for a [`MeasurementSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Resolver settings, including the fit and score settings it uses.
    pub outlier: OutlierConfig,
    /// Upper bound on resolver rounds per [`MeasurementSession::resolve_outliers`]. Default 5.
    pub max_rounds: usize,
    /// Cylinder sign convention of reported prescriptions. Default minus.
    pub convention: CylinderConvention,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outlier: OutlierConfig::default(),
            max_rounds: 5,
            convention: CylinderConvention::Minus,
        }
    }
}

/// One adopted resolver decision.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    /// 1-based resolver round.
    pub round: usize,
    pub rule: OutlierRule,
    /// Indices flagged by this decision, ascending.
    pub flagged: Vec<usize>,
    pub reason: String,
}

/// Result of [`MeasurementSession::resolve_outliers`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    /// Final prescription, in the session's convention.
    pub prescription: Prescription,
    /// Indices of the measurements flagged as outliers, ascending.
    pub outliers: Vec<usize>,
    /// Resolver rounds run, including the one that ended the loop.
    pub rounds: usize,
}

/// Owns the measurements of one eye and every piece of state derived from them.
#[derive(Debug, Clone)]
pub struct MeasurementSession {
    measurements: Vec<Measurement>,
    mask: OutlierMask,
    known_user_errors: usize,
    config: SessionConfig,
    trace: Vec<TraceEntry>,
}

impl MeasurementSession {
    pub fn new(measurements: Vec<Measurement>) -> Self {
        Self::with_config(measurements, SessionConfig::default())
    }

    pub fn with_config(measurements: Vec<Measurement>, config: SessionConfig) -> Self {
        let mask = OutlierMask::new(measurements.len());
        Self {
            measurements,
            mask,
            known_user_errors: 0,
            config,
            trace: Vec::new(),
        }
    }

    /// Set the number of readings the operator already knows to be mistaken.
    /// Each one costs a fixed penalty in every fit-quality score.
    pub fn with_known_user_errors(mut self, count: usize) -> Self {
        self.known_user_errors = count;
        self
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn mask(&self) -> &OutlierMask {
        &self.mask
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn known_user_errors(&self) -> usize {
        self.known_user_errors
    }

    /// Adopted decisions, oldest first.
    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Curve fit over the measurements not currently flagged, in the session's
    /// convention.
    ///
    /// # Errors
    ///
    /// Propagates the solver's [`SolverError`].
    pub fn fit(&self) -> Result<Prescription, SolverError> {
        let kept = inliers(&self.measurements, &self.mask);
        let rx = curve_fitting(&kept, &self.config.outlier.fit)?;
        Ok(rx.to_convention(self.config.convention))
    }

    /// Fit everything, then run resolver rounds until no rule fires, the
    /// flagged set repeats, or `max_rounds` is reached.
    ///
    /// The mask and trace are replaced by the outcome of this call.
    ///
    /// # Errors
    ///
    /// Propagates the solver's [`SolverError`]. The session is left with a
    /// clear mask and empty trace in that case.
    pub fn resolve_outliers(&mut self) -> Result<SessionOutcome, SolverError> {
        self.mask = OutlierMask::new(self.measurements.len());
        self.trace.clear();

        let mut current = curve_fitting(&self.measurements, &self.config.outlier.fit)?;
        let mut adopted = OutlierMask::new(self.measurements.len());
        let mut trace = Vec::new();
        let mut rounds = 0;

        while rounds < self.config.max_rounds {
            rounds += 1;
            let mut scratch = OutlierMask::new(self.measurements.len());
            let resolution = resolve_outliers(
                &self.measurements,
                &mut scratch,
                self.known_user_errors,
                &current,
                &self.config.outlier,
            )?;

            let Some(decision) = resolution.decision else {
                debug!("session: round {rounds}, no rule fired");
                break;
            };
            if scratch == adopted {
                debug!("session: round {rounds}, same points flagged again; stopping");
                break;
            }

            let flagged = scratch.excluded_indices();
            debug!(
                "session: round {rounds}, {:?} flagged {:?}",
                decision.rule, flagged
            );
            trace.push(TraceEntry {
                round: rounds,
                rule: decision.rule,
                flagged,
                reason: decision.reason,
            });
            adopted = scratch;
            current = resolution.prescription;
        }

        self.mask = adopted;
        self.trace = trace;

        Ok(SessionOutcome {
            prescription: current.to_convention(self.config.convention),
            outliers: self.mask.excluded_indices(),
            rounds,
        })
    }

    /// Residual summary of the current state: the fit over non-outliers,
    /// evaluated against the non-outliers.
    ///
    /// # Errors
    ///
    /// Propagates the solver's [`SolverError`].
    pub fn snapshot(&self) -> Result<FitSnapshot, SolverError> {
        let fit = self.fit()?;
        Ok(FitSnapshot::compute(&self.measurements, &self.mask, &fit))
    }
}
