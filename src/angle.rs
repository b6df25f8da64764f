//! Meridian angle utilities.
//!
//! A meridian and its 180°-rotated counterpart are the same physical line, so all
//! angles here are in degrees and periodic with period 180°.

/// Half-turn period of a meridian, in degrees.
pub const MERIDIAN_PERIOD_DEG: f64 = 180.0;

/// Normalizes an angle in degrees into the range [0, 180).
#[inline]
pub fn normalize_meridian(angle_deg: f64) -> f64 {
    let norm = angle_deg.rem_euclid(MERIDIAN_PERIOD_DEG);
    // rem_euclid can round up to the period itself for tiny negative inputs
    if norm >= MERIDIAN_PERIOD_DEG {
        0.0
    } else {
        norm
    }
}

/// Smallest unsigned distance between two meridians, in degrees.
///
/// Treats θ and θ + 180° as identical, so the result lies in [0, 90].
#[inline]
pub fn meridian_distance(a_deg: f64, b_deg: f64) -> f64 {
    let diff = (a_deg - b_deg).abs().rem_euclid(MERIDIAN_PERIOD_DEG);
    if diff > MERIDIAN_PERIOD_DEG / 2.0 {
        MERIDIAN_PERIOD_DEG - diff
    } else {
        diff
    }
}
