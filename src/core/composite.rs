use crate::types::{Composite, FloodError, FloodResult, Raster, SarReal};
use ndarray::Array2;
use num_traits::Float;
use std::collections::BTreeMap;

/// Median of the finite samples, `None` when there are none.
///
/// Even-length inputs take the mean of the two central samples.
pub fn median_of<T: Float>(values: &mut Vec<T>) -> Option<T> {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n % 2 == 1 {
        Some(values[n / 2])
    } else {
        let two = T::one() + T::one();
        Some((values[n / 2 - 1] + values[n / 2]) / two)
    }
}

/// Temporal median compositor
pub struct MedianCompositor;

impl MedianCompositor {
    /// Pixel-wise median across a stack of same-grid rasters.
    ///
    /// A pixel with no valid finite sample in any layer is absent in the output.
    pub fn composite_band(stack: &[&Raster<SarReal>]) -> FloodResult<Raster<SarReal>> {
        let first = stack.first().ok_or_else(|| {
            FloodError::Processing("Cannot composite an empty image stack".to_string())
        })?;
        for layer in &stack[1..] {
            first.ensure_same_grid(*layer)?;
        }

        let (rows, cols) = first.shape();
        let mut data = Array2::<SarReal>::zeros((rows, cols));
        let mut valid = Array2::from_elem((rows, cols), false);
        let mut samples = Vec::with_capacity(stack.len());

        for i in 0..rows {
            for j in 0..cols {
                samples.clear();
                samples.extend(stack.iter().filter_map(|layer| layer.get(i, j)));
                if let Some(median) = median_of(&mut samples) {
                    data[[i, j]] = median;
                    valid[[i, j]] = true;
                }
            }
        }

        Raster::with_validity(data, valid, *first.geo_transform(), first.pixel_spacing())
    }

    /// Composite each named band across scenes
    pub fn composite_scenes(
        scenes: &[&BTreeMap<String, Raster<SarReal>>],
        bands: &[String],
    ) -> FloodResult<Composite> {
        log::debug!("Median compositing {} scenes over bands {:?}", scenes.len(), bands);

        let mut out = BTreeMap::new();
        for band in bands {
            let stack: Vec<&Raster<SarReal>> = scenes
                .iter()
                .map(|scene| {
                    scene.get(band).ok_or_else(|| {
                        FloodError::Processing(format!("Scene is missing band {}", band))
                    })
                })
                .collect::<FloodResult<_>>()?;
            let composite = Self::composite_band(&stack)?;
            if composite.is_empty() {
                log::warn!("Band {} composite has no valid pixels", band);
            }
            out.insert(band.clone(), composite);
        }

        Ok(Composite::new(out, scenes.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use ndarray::array;

    fn grid() -> GeoTransform {
        GeoTransform::north_up(0.0, 2.0, 1.0, 1.0)
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median_of(&mut vec![3.0f32, 1.0, 2.0]), Some(2.0));
        assert_eq!(median_of(&mut vec![4.0f32, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median_of(&mut vec![f32::NAN, 5.0]), Some(5.0));
        assert_eq!(median_of::<f32>(&mut vec![]), None);
    }

    #[test]
    fn test_composite_respects_validity() {
        let a = Raster::new(array![[1.0f32, 10.0], [5.0, 7.0]], grid(), 10.0);
        let b = Raster::with_validity(
            array![[3.0f32, 99.0], [6.0, 0.0]],
            array![[true, false], [true, false]],
            grid(),
            10.0,
        )
        .unwrap();
        let c = Raster::with_validity(
            array![[2.0f32, 0.0], [4.0, 0.0]],
            array![[true, false], [true, false]],
            grid(),
            10.0,
        )
        .unwrap();

        let median = MedianCompositor::composite_band(&[&a, &b, &c]).unwrap();
        assert_eq!(median.get(0, 0), Some(2.0));
        // Only one valid sample, the masked 99.0 never enters
        assert_eq!(median.get(0, 1), Some(10.0));
        assert_eq!(median.get(1, 0), Some(5.0));
        assert_eq!(median.get(1, 1), Some(7.0));
    }

    #[test]
    fn test_no_qualifying_sample_is_nodata() {
        let a = Raster::nodata((2, 2), 0.0f32, grid(), 10.0);
        let b = Raster::nodata((2, 2), 0.0f32, grid(), 10.0);
        let median = MedianCompositor::composite_band(&[&a, &b]).unwrap();
        assert!(median.is_empty());
    }

    #[test]
    fn test_empty_stack_is_an_error() {
        assert!(MedianCompositor::composite_band(&[]).is_err());
    }
}
