use crate::core::control::EvalControl;
use crate::types::{FloodError, FloodResult, Raster, SarReal};
use ndarray::Array2;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Speckle filtering parameters
#[derive(Debug, Clone)]
pub struct SpeckleFilterParams {
    /// Kernel radius in meters
    pub radius_m: f64,
    pub kernel: KernelShape,
    /// Upper bound on the bounding window, (2r+1)² cells
    pub max_kernel_cells: u64,
}

impl Default for SpeckleFilterParams {
    fn default() -> Self {
        Self {
            radius_m: 30.0,
            kernel: KernelShape::Circle,
            max_kernel_cells: 1_000_000_000,
        }
    }
}

/// Cells in the (2r+1)x(2r+1) window bounding a kernel of `radius_m` at
/// `pixel_spacing`, `None` when the count does not fit in a `u64`
pub fn kernel_window_cells(radius_m: f64, pixel_spacing: f64) -> Option<u64> {
    let radius_px = radius_m / pixel_spacing;
    // Larger radii overflow the squared window anyway
    if !radius_px.is_finite() || radius_px < 0.0 || radius_px >= u32::MAX as f64 {
        return None;
    }
    let side = (radius_px.floor() as u64).checked_mul(2)?.checked_add(1)?;
    side.checked_mul(side)
}

/// Neighbourhood shape of the focal window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelShape {
    /// Cells whose centre lies within the radius
    Circle,
    /// Full (2r+1)x(2r+1) window
    Square,
}

/// Focal mean speckle filter.
///
/// Every present pixel becomes the mean of the present, finite neighbours
/// inside the kernel. Neighbours beyond the raster edge are simply missing, so
/// edge pixels average fewer samples. Absent pixels stay absent.
pub struct SpeckleFilter {
    params: SpeckleFilterParams,
}

impl SpeckleFilter {
    /// Create a new speckle filter with default parameters
    pub fn new() -> Self {
        Self {
            params: SpeckleFilterParams::default(),
        }
    }

    /// Create a speckle filter with custom parameters
    pub fn with_params(params: SpeckleFilterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SpeckleFilterParams {
        &self.params
    }

    /// Kernel offsets (drow, dcol) for a given ground pixel spacing
    pub fn kernel_offsets(&self, pixel_spacing: f64) -> FloodResult<Vec<(isize, isize)>> {
        if !(self.params.radius_m.is_finite() && self.params.radius_m > 0.0) {
            return Err(FloodError::Processing(format!(
                "Filter radius must be positive, got {}",
                self.params.radius_m
            )));
        }
        if !(pixel_spacing.is_finite() && pixel_spacing > 0.0) {
            return Err(FloodError::Processing(format!(
                "Invalid pixel spacing {}",
                pixel_spacing
            )));
        }

        let budget = self.params.max_kernel_cells;
        let window = kernel_window_cells(self.params.radius_m, pixel_spacing).unwrap_or(u64::MAX);
        if window > budget {
            log::warn!(
                "Filter radius {} m at {} m spacing needs a {}-cell window, budget is {}",
                self.params.radius_m,
                pixel_spacing,
                window,
                budget
            );
            return Err(FloodError::ResourceLimitExceeded {
                requested: window,
                budget,
            });
        }

        // window fits in a u64, so r fits in an isize
        let radius_px = self.params.radius_m / pixel_spacing;
        let r = radius_px.floor() as isize;
        let r_sq = radius_px * radius_px;

        let mut offsets = Vec::new();
        for dr in -r..=r {
            for dc in -r..=r {
                let inside = match self.params.kernel {
                    KernelShape::Circle => (dr as f64).powi(2) + (dc as f64).powi(2) <= r_sq,
                    KernelShape::Square => true,
                };
                if inside {
                    offsets.push((dr, dc));
                }
            }
        }
        Ok(offsets)
    }

    /// Apply the focal mean
    pub fn apply_filter(&self, image: &Raster<SarReal>) -> FloodResult<Raster<SarReal>> {
        self.apply_filter_with_control(image, &EvalControl::new())
    }

    /// Apply the focal mean, stopping early when `control` says so
    pub fn apply_filter_with_control(
        &self,
        image: &Raster<SarReal>,
        control: &EvalControl,
    ) -> FloodResult<Raster<SarReal>> {
        let offsets = self.kernel_offsets(image.pixel_spacing())?;
        let (height, width) = image.shape();

        log::info!(
            "Applying {:?} focal mean, radius {} m ({} kernel cells) to {}x{} raster",
            self.params.kernel,
            self.params.radius_m,
            offsets.len(),
            height,
            width
        );
        log::debug!("Filter parameters: {:?}", self.params);

        let filter_row = |i: usize| -> Vec<SarReal> {
            if control.should_stop() {
                return Vec::new();
            }
            (0..width)
                .map(|j| {
                    if image.is_valid(i, j) {
                        Self::local_mean(image, i, j, &offsets)
                    } else {
                        SarReal::NAN
                    }
                })
                .collect()
        };

        #[cfg(feature = "parallel")]
        let rows: Vec<Vec<SarReal>> = (0..height).into_par_iter().map(filter_row).collect();
        #[cfg(not(feature = "parallel"))]
        let rows: Vec<Vec<SarReal>> = (0..height).map(filter_row).collect();

        control.check()?;

        let flat: Vec<SarReal> = rows.into_iter().flatten().collect();
        let data = Array2::from_shape_vec((height, width), flat)
            .map_err(|e| FloodError::Processing(format!("Failed to reshape filtered data: {}", e)))?;

        if let (Some(before), Some(after)) = (
            Self::estimate_number_of_looks(image),
            Self::estimate_number_of_looks_values(&data, image),
        ) {
            log::debug!("Equivalent number of looks: {:.2} -> {:.2}", before, after);
        }

        let filtered = Raster::with_validity(
            data,
            image.validity().clone(),
            *image.geo_transform(),
            image.pixel_spacing(),
        )?;
        log::info!("Speckle filtering completed successfully");
        Ok(filtered)
    }

    /// Mean of the present, finite kernel neighbours around (i, j)
    fn local_mean(image: &Raster<SarReal>, i: usize, j: usize, offsets: &[(isize, isize)]) -> SarReal {
        let (height, width) = image.shape();
        let mut sum = 0.0f64;
        let mut count = 0usize;

        for &(dr, dc) in offsets {
            let ii = i as isize + dr;
            let jj = j as isize + dc;
            if ii < 0 || jj < 0 || ii >= height as isize || jj >= width as isize {
                continue;
            }
            if let Some(v) = image.get(ii as usize, jj as usize) {
                if v.is_finite() {
                    sum += v as f64;
                    count += 1;
                }
            }
        }

        if count > 0 {
            (sum / count as f64) as SarReal
        } else {
            SarReal::NAN
        }
    }

    /// Equivalent number of looks (mean² / variance) over present pixels
    pub fn estimate_number_of_looks(image: &Raster<SarReal>) -> Option<f64> {
        Self::estimate_number_of_looks_values(image.data(), image)
    }

    fn estimate_number_of_looks_values(values: &Array2<SarReal>, mask: &Raster<SarReal>) -> Option<f64> {
        let samples: Vec<f64> = values
            .indexed_iter()
            .filter(|((i, j), v)| mask.is_valid(*i, *j) && v.is_finite())
            .map(|(_, &v)| v as f64)
            .collect();
        if samples.len() < 2 {
            return None;
        }
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let variance = samples
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / (samples.len() - 1) as f64;
        if variance > 0.0 {
            Some(mean * mean / variance)
        } else {
            None
        }
    }
}

impl Default for SpeckleFilter {
    fn default() -> Self {
        Self::new()
    }
}
