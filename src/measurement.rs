//! Define a meridian measurement: the optical power read along one angular
//! direction of the eye.
//! Measurements are the output of the optical recognition pipeline and are the input to fitting.
//!

use crate::fit::Exclusion;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Meridian angle in degrees. Periodic with period 180°; values outside
    /// [0, 180) are accepted and normalized where it matters.
    pub angle_deg: f64,
    /// Refractive power along the meridian, in diopters.
    pub power_d: f64,
}

impl Measurement {
    pub fn new(angle_deg: f64, power_d: f64) -> Self {
        Self { angle_deg, power_d }
    }
}

/// Per-measurement outlier flags for one session (`true` = excluded).
///
/// Kept apart from [`Measurement`] so that whoever owns the mask is the only
/// writer: the resolver receives it by `&mut`, everything else reads it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutlierMask {
    flags: Vec<bool>,
}

impl OutlierMask {
    /// A mask with no outliers flagged for `len` measurements.
    pub fn new(len: usize) -> Self {
        Self {
            flags: vec![false; len],
        }
    }

    /// A mask with exactly the points of `exclusion` flagged.
    pub fn from_exclusion(len: usize, exclusion: &Exclusion) -> Self {
        let mut mask = Self::new(len);
        for i in exclusion.iter() {
            mask.flag(i);
        }
        mask
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Whether measurement `index` is flagged. Indices past the end are not.
    pub fn is_outlier(&self, index: usize) -> bool {
        self.flags.get(index).copied().unwrap_or(false)
    }

    /// Flag measurement `index` as an outlier. Out-of-range indices are ignored.
    pub fn flag(&mut self, index: usize) {
        if let Some(f) = self.flags.get_mut(index) {
            *f = true;
        }
    }

    /// Clear every flag, keeping the length.
    pub fn clear(&mut self) {
        self.flags.iter_mut().for_each(|f| *f = false);
    }

    /// Number of flagged measurements.
    pub fn count(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }

    /// Indices of flagged measurements, ascending.
    pub fn excluded_indices(&self) -> Vec<usize> {
        self.flags
            .iter()
            .enumerate()
            .filter(|(_, &f)| f)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Measurements not flagged in `mask`, in their original order.
pub fn inliers(measurements: &[Measurement], mask: &OutlierMask) -> Vec<Measurement> {
    measurements
        .iter()
        .enumerate()
        .filter(|(i, _)| !mask.is_outlier(*i))
        .map(|(_, m)| *m)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_flag_and_clear() {
        let mut mask = OutlierMask::new(4);
        assert_eq!(mask.count(), 0);
        mask.flag(1);
        mask.flag(3);
        mask.flag(10);
        assert_eq!(mask.count(), 2);
        assert_eq!(mask.excluded_indices(), vec![1, 3]);
        assert!(mask.is_outlier(3));
        assert!(!mask.is_outlier(10));
        mask.clear();
        assert_eq!(mask.count(), 0);
        assert_eq!(mask.len(), 4);
    }

    #[test]
    fn inliers_skip_flagged() {
        let ms: Vec<Measurement> = (0..5)
            .map(|i| Measurement::new(i as f64 * 30.0, i as f64))
            .collect();
        let mask = OutlierMask::from_exclusion(5, &Exclusion::pair(0, 3));
        let kept = inliers(&ms, &mask);
        let powers: Vec<f64> = kept.iter().map(|m| m.power_d).collect();
        assert_eq!(powers, vec![1.0, 2.0, 4.0]);
    }
}
