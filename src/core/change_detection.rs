//! Bi-temporal backscatter change detection.
//!
//! The normalized difference ratio `(post - pre) / (post + pre)` is computed
//! per polarization, then the bands are merged with a pixel-wise minimum. The
//! minimum keeps whichever polarization shows the strongest drop, so a pixel
//! needs only one band to cross the flood threshold.

use crate::types::{Composite, FloodError, FloodResult, Polarization, Raster, SarReal};

/// Normalized difference of a single pixel pair, NaN when `post + pre == 0`
pub fn normalized_difference(pre: SarReal, post: SarReal) -> SarReal {
    let sum = post + pre;
    if sum == 0.0 {
        SarReal::NAN
    } else {
        (post - pre) / sum
    }
}

/// Minimum that propagates NaN from either side.
///
/// `f32::min` returns the non-NaN operand, which would let an undefined
/// ratio in one band be masked by the other.
pub fn nan_propagating_min(a: SarReal, b: SarReal) -> SarReal {
    if a.is_nan() || b.is_nan() {
        SarReal::NAN
    } else {
        a.min(b)
    }
}

/// Change detector over smoothed pre/post composites
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    polarizations: Vec<Polarization>,
}

impl ChangeDetector {
    pub fn new(polarizations: &[Polarization]) -> Self {
        Self {
            polarizations: polarizations.to_vec(),
        }
    }

    /// Dual-pol VV/VH detector
    pub fn dual_pol() -> Self {
        Self::new(&[Polarization::VV, Polarization::VH])
    }

    /// NDR for one polarization band
    pub fn ndr(&self, pre: &Raster<SarReal>, post: &Raster<SarReal>) -> FloodResult<Raster<SarReal>> {
        pre.zip_with(post, |&a, &b| normalized_difference(a, b))
    }

    /// Pixel-wise minimum across polarization ratios
    pub fn combine(&self, ratios: &[Raster<SarReal>]) -> FloodResult<Raster<SarReal>> {
        let (first, rest) = ratios.split_first().ok_or_else(|| {
            FloodError::Processing("No polarization ratios to combine".to_string())
        })?;
        rest.iter().try_fold(first.clone(), |acc, next| {
            acc.zip_with(next, |&a, &b| nan_propagating_min(a, b))
        })
    }

    /// Final change ratio from smoothed pre- and post-event composites
    pub fn detect(&self, pre: &Composite, post: &Composite) -> FloodResult<Raster<SarReal>> {
        log::info!("Computing change ratio over {:?}", self.polarizations);

        let ratios = self
            .polarizations
            .iter()
            .map(|pol| {
                let band = pol.band_name();
                self.ndr(pre.band(band)?, post.band(band)?)
            })
            .collect::<FloodResult<Vec<_>>>()?;

        let combined = self.combine(&ratios)?;

        let undefined = combined
            .data()
            .indexed_iter()
            .filter(|((i, j), v)| combined.is_valid(*i, *j) && v.is_nan())
            .count();
        if undefined > 0 {
            log::warn!("{} pixels have an undefined change ratio (zero denominator)", undefined);
        }
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};
    use std::collections::BTreeMap;

    fn grid() -> GeoTransform {
        GeoTransform::north_up(0.0, 2.0, 1.0, 1.0)
    }

    fn raster(data: Array2<f32>) -> Raster<f32> {
        Raster::new(data, grid(), 10.0)
    }

    #[test]
    fn test_normalized_difference() {
        assert_relative_eq!(normalized_difference(1.0, 0.5), -1.0 / 3.0, epsilon = 1e-6);
        assert_relative_eq!(normalized_difference(2.0, 2.0), 0.0);
        assert!(normalized_difference(1.0, -1.0).is_nan());
        assert!(normalized_difference(0.0, 0.0).is_nan());
    }

    #[test]
    fn test_min_combination_is_inclusive() {
        let detector = ChangeDetector::dual_pol();
        let vv = raster(array![[-0.4f32, -0.1], [0.2, f32::NAN]]);
        let vh = raster(array![[-0.1f32, -0.05], [-0.3, 0.1]]);
        let combined = detector.combine(&[vv, vh]).unwrap();

        assert_relative_eq!(combined.get(0, 0).unwrap(), -0.4);
        assert_relative_eq!(combined.get(0, 1).unwrap(), -0.1);
        assert_relative_eq!(combined.get(1, 0).unwrap(), -0.3);
        assert!(combined.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_detect_per_polarization() {
        let mut pre_bands = BTreeMap::new();
        pre_bands.insert("VV".to_string(), raster(array![[1.0f32, 1.0], [1.0, 1.0]]));
        pre_bands.insert("VH".to_string(), raster(array![[1.0f32, 1.0], [1.0, 0.0]]));
        let mut post_bands = BTreeMap::new();
        post_bands.insert("VV".to_string(), raster(array![[0.5f32, 1.0], [1.0, 1.0]]));
        post_bands.insert("VH".to_string(), raster(array![[1.0f32, 0.2], [1.0, 0.0]]));

        let pre = Composite::new(pre_bands, 1);
        let post = Composite::new(post_bands, 1);
        let ratio = ChangeDetector::dual_pol().detect(&pre, &post).unwrap();

        assert_relative_eq!(ratio.get(0, 0).unwrap(), -1.0 / 3.0, epsilon = 1e-6);
        assert_relative_eq!(ratio.get(0, 1).unwrap(), -0.8 / 1.2, epsilon = 1e-6);
        assert_relative_eq!(ratio.get(1, 0).unwrap(), 0.0);
        // VH is 0/0 here, so the combined ratio is undefined
        assert!(ratio.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_missing_band_is_an_error() {
        let mut bands = BTreeMap::new();
        bands.insert("VV".to_string(), raster(Array2::ones((2, 2))));
        let composite = Composite::new(bands, 1);
        assert!(ChangeDetector::dual_pol().detect(&composite, &composite).is_err());
    }
}
