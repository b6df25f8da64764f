//! # spherocyl
//!
//! Spherocylindrical **prescription fitting** from per-meridian power readings,
//! with automatic **outlier resolution**.
//!
//! An instrument reads the refractive power of the eye along several meridians.
//! Along meridian θ a spherocylindrical lens has power
//!
//! ```text
//! P(θ) = sphere + cylinder · sin²(axis − θ)
//! ```
//!
//! `spherocyl` recovers `(sphere, cylinder, axis)` from the readings with a
//! Levenberg-Marquardt fit, then decides which (if any) readings are mistaken
//! by refitting with every single reading and every pair of readings left out
//! and running a prioritized cascade of rules over those refits.
//!
//! ## Features
//!
//! - **Generic solver**: [`lm::levenberg_marquardt`] fits any [`lm::Model`]
//! - **Circular axis math**: meridians are periodic with period 180°
//! - **Explicit outlier state**: an [`OutlierMask`] owned by the caller, never
//!   hidden in the measurements
//! - **Configurable cascade**: rule order and every threshold live in
//!   [`OutlierConfig`]
//! - **Parallel refits**: enable the `parallel` feature to evaluate candidates on
//!   the rayon pool; results are identical to the sequential path
//!
//! ## Example
//!
//! ```
//! use spherocyl::{Measurement, MeasurementSession, Prescription};
//!
//! let truth = Prescription::new(-1.0, -2.0, 30.0);
//! let mut readings: Vec<Measurement> = (0..9)
//!     .map(|i| {
//!         let angle = i as f64 * 20.0;
//!         Measurement::new(angle, truth.power_at(angle))
//!     })
//!     .collect();
//! // one reading is off by 3 D
//! readings[4].power_d += 3.0;
//!
//! let mut session = MeasurementSession::new(readings);
//! let outcome = session.resolve_outliers().unwrap();
//! assert_eq!(outcome.outliers, vec![4]);
//! println!("Rx: {:?}", outcome.prescription);
//! for entry in session.trace() {
//!     println!("round {}: {}", entry.round, entry.reason);
//! }
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Seed**: cylinder from the power range, axis at the weakest reading
//! 2. **Refine**: Levenberg-Marquardt on all three parameters
//! 3. **Candidates**: refit with each single and each pair of readings excluded
//! 4. **Score**: local-roughness fit quality of every refit
//! 5. **Decide**: cylinder push, axis push, far from curve, fit-quality
//!    deforming; the first rule that fires flags its reading(s)
//! 6. **Repeat**: the session reruns the resolver from the adopted fit until
//!    the decision stops changing
//!

pub mod angle;
pub mod astigmatic;
pub mod fit;
pub mod lm;
mod measurement;
pub mod outlier;
mod prescription;
pub mod quality;
pub mod session;
pub mod stats;

pub use fit::{curve_fitting, guess_prescription, FitConfig};
pub use lm::SolverError;
pub use measurement::*;
pub use outlier::{
    resolve_outliers, Decision, OutlierConfig, OutlierRule, OutlierThresholds, Resolution,
};
pub use prescription::*;
pub use quality::{FitQuality, ScoreConfig};
pub use session::{MeasurementSession, SessionConfig, SessionOutcome, TraceEntry};
pub use stats::FitSnapshot;
