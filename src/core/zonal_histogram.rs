//! Zonal frequency histogram of land-cover classes inside the flood mask.
//!
//! The categorical raster is masked by the flood mask, resampled (nearest
//! neighbour) onto a grid at the sampling scale, and every present sample is
//! tallied by class code. The histogram is a `BTreeMap`, so iteration is in
//! ascending class-code order.

use crate::config::FloodConfig;
use crate::core::control::EvalControl;
use crate::types::{ClassCode, FloodError, FloodResult, Raster};
use std::collections::BTreeMap;

/// Class code -> pixel count at the sampling scale, absent pixels excluded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassHistogram {
    counts: BTreeMap<ClassCode, u64>,
}

impl ClassHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_counts(counts: BTreeMap<ClassCode, u64>) -> Self {
        Self { counts }
    }

    pub fn increment(&mut self, code: ClassCode) {
        *self.counts.entry(code).or_insert(0) += 1;
    }

    pub fn get(&self, code: ClassCode) -> u64 {
        self.counts.get(&code).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Ascending class-code order
    pub fn iter(&self) -> impl Iterator<Item = (ClassCode, u64)> + '_ {
        self.counts.iter().map(|(&code, &count)| (code, count))
    }
}

/// Sampling scale and pixel budget
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramParams {
    pub scale_m: f64,
    pub max_pixels: u64,
}

impl Default for HistogramParams {
    fn default() -> Self {
        Self {
            scale_m: 10.0,
            max_pixels: 1_000_000_000,
        }
    }
}

impl From<&FloodConfig> for HistogramParams {
    fn from(config: &FloodConfig) -> Self {
        Self {
            scale_m: config.scale_m,
            max_pixels: config.max_pixels,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ZonalHistogramAggregator {
    params: HistogramParams,
}

impl ZonalHistogramAggregator {
    pub fn new(params: HistogramParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &HistogramParams {
        &self.params
    }

    /// Land cover restricted to flood-mask pixels; absent elsewhere
    pub fn overlay(
        &self,
        land_cover: &Raster<ClassCode>,
        flood_mask: &Raster<bool>,
    ) -> FloodResult<Raster<ClassCode>> {
        land_cover.update_mask(flood_mask)
    }

    /// Sampling grid dimensions at the configured scale
    pub fn sample_grid(&self, raster_shape: (usize, usize), pixel_spacing: f64) -> FloodResult<(u64, u64, f64)> {
        let scale = self.params.scale_m;
        if !(scale.is_finite() && scale > 0.0) || !(pixel_spacing.is_finite() && pixel_spacing > 0.0) {
            return Err(FloodError::Processing(format!(
                "Invalid sampling scale {} or pixel spacing {}",
                scale, pixel_spacing
            )));
        }
        // Source pixels per sample along each axis
        let step = scale / pixel_spacing;
        let (rows, cols) = raster_shape;
        let sample_rows = (rows as f64 / step).ceil() as u64;
        let sample_cols = (cols as f64 / step).ceil() as u64;
        Ok((sample_rows, sample_cols, step))
    }

    /// Frequency histogram of present pixels
    pub fn frequency_histogram(&self, classes: &Raster<ClassCode>) -> FloodResult<ClassHistogram> {
        self.frequency_histogram_with_control(classes, &EvalControl::new())
    }

    pub fn frequency_histogram_with_control(
        &self,
        classes: &Raster<ClassCode>,
        control: &EvalControl,
    ) -> FloodResult<ClassHistogram> {
        let (sample_rows, sample_cols, step) = self.sample_grid(classes.shape(), classes.pixel_spacing())?;
        let requested = sample_rows.saturating_mul(sample_cols);
        if requested > self.params.max_pixels {
            log::warn!(
                "Histogram at {} m needs {} pixels, budget is {}",
                self.params.scale_m,
                requested,
                self.params.max_pixels
            );
            return Err(FloodError::ResourceLimitExceeded {
                requested,
                budget: self.params.max_pixels,
            });
        }

        log::info!(
            "Computing class histogram on {}x{} samples at {} m",
            sample_rows,
            sample_cols,
            self.params.scale_m
        );

        let (rows, cols) = classes.shape();
        let mut histogram = ClassHistogram::new();
        for si in 0..sample_rows {
            control.check()?;
            let src_row = (((si as f64 + 0.5) * step) as usize).min(rows.saturating_sub(1));
            for sj in 0..sample_cols {
                let src_col = (((sj as f64 + 0.5) * step) as usize).min(cols.saturating_sub(1));
                if let Some(code) = classes.get(src_row, src_col) {
                    histogram.increment(code);
                }
            }
        }

        if histogram.is_empty() {
            log::warn!("Class histogram is empty: no flooded pixels in the AOI");
        } else {
            log::info!(
                "Class histogram: {} classes, {} pixels",
                histogram.len(),
                histogram.total()
            );
        }
        Ok(histogram)
    }
}

impl Default for ZonalHistogramAggregator {
    fn default() -> Self {
        Self::new(HistogramParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use ndarray::{array, Array2};

    fn grid() -> GeoTransform {
        GeoTransform::north_up(0.0, 4.0, 1.0, 1.0)
    }

    #[test]
    fn test_overlay_counts_flooded_classes() {
        let land_cover = Raster::new(
            array![
                [10, 10, 40, 40],
                [10, 80, 40, 40],
                [90, 90, 50, 50],
                [90, 90, 50, 999]
            ],
            grid(),
            10.0,
        );
        let flood = Raster::new(
            array![
                [true, false, true, true],
                [false, true, false, false],
                [true, true, false, false],
                [false, false, false, true]
            ],
            grid(),
            10.0,
        )
        .self_mask();

        let aggregator = ZonalHistogramAggregator::default();
        let flooded = aggregator.overlay(&land_cover, &flood).unwrap();
        let histogram = aggregator.frequency_histogram(&flooded).unwrap();

        assert_eq!(histogram.get(10), 1);
        assert_eq!(histogram.get(40), 2);
        assert_eq!(histogram.get(80), 1);
        assert_eq!(histogram.get(90), 2);
        assert_eq!(histogram.get(50), 0);
        assert_eq!(histogram.get(999), 1);
        assert_eq!(histogram.total(), flood.count_true() as u64);

        let codes: Vec<ClassCode> = histogram.iter().map(|(c, _)| c).collect();
        assert_eq!(codes, vec![10, 40, 80, 90, 999]);
    }

    #[test]
    fn test_empty_mask_gives_empty_histogram() {
        let land_cover = Raster::new(Array2::from_elem((4, 4), 40), grid(), 10.0);
        let flood = Raster::new(Array2::from_elem((4, 4), false), grid(), 10.0).self_mask();
        let aggregator = ZonalHistogramAggregator::default();
        let flooded = aggregator.overlay(&land_cover, &flood).unwrap();
        assert!(aggregator.frequency_histogram(&flooded).unwrap().is_empty());
    }

    #[test]
    fn test_pixel_budget_exceeded() {
        let aggregator = ZonalHistogramAggregator::new(HistogramParams {
            scale_m: 10.0,
            max_pixels: 15,
        });
        let classes = Raster::new(Array2::from_elem((4, 4), 40), grid(), 10.0);
        let result = aggregator.frequency_histogram(&classes);
        assert!(matches!(
            result,
            Err(FloodError::ResourceLimitExceeded { requested: 16, budget: 15 })
        ));
    }

    #[test]
    fn test_coarser_scale_subsamples() {
        // 10 m source, 20 m sampling: one sample per 2x2 block
        let aggregator = ZonalHistogramAggregator::new(HistogramParams {
            scale_m: 20.0,
            max_pixels: 4,
        });
        let classes = Raster::new(
            Array2::from_shape_fn((4, 4), |(i, j)| if i < 2 && j < 2 { 10 } else { 40 }),
            grid(),
            10.0,
        );
        let histogram = aggregator.frequency_histogram(&classes).unwrap();
        assert_eq!(histogram.total(), 4);
        assert_eq!(histogram.get(10), 1);
        assert_eq!(histogram.get(40), 3);
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let classes = Raster::new(
            Array2::from_shape_fn((16, 16), |(i, j)| ((i * 16 + j) % 7) as ClassCode * 10),
            grid(),
            10.0,
        );
        let aggregator = ZonalHistogramAggregator::default();
        let a = aggregator.frequency_histogram(&classes).unwrap();
        let b = aggregator.frequency_histogram(&classes).unwrap();
        assert_eq!(a, b);
    }
}
