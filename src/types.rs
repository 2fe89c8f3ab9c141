use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Real-valued backscatter, ratio or elevation sample
pub type SarReal = f32;

/// Categorical land-cover class code
pub type ClassCode = i32;

/// Polarization modes for Sentinel-1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
}

impl Polarization {
    /// Band name used by composites for this polarization
    pub fn band_name(&self) -> &'static str {
        match self {
            Polarization::VV => "VV",
            Polarization::VH => "VH",
            Polarization::HV => "HV",
            Polarization::HH => "HH",
        }
    }
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.band_name())
    }
}

impl std::str::FromStr for Polarization {
    type Err = FloodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VV" => Ok(Polarization::VV),
            "VH" => Ok(Polarization::VH),
            "HV" => Ok(Polarization::HV),
            "HH" => Ok(Polarization::HH),
            _ => Err(FloodError::MalformedConfig(format!(
                "Invalid polarization: {}",
                s
            ))),
        }
    }
}

/// Sentinel-1 acquisition mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcquisitionMode {
    IW, // Interferometric Wide swath
    EW, // Extra Wide swath
    SM, // StripMap
    WV, // Wave
}

impl std::fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }
}

/// Area of interest: a closed polygon in map coordinates (lon, lat).
///
/// The ring is stored without the closing vertex repeated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aoi {
    pub vertices: Vec<(f64, f64)>,
}

impl Aoi {
    pub fn new(vertices: Vec<(f64, f64)>) -> Self {
        Self { vertices }
    }

    /// Axis-aligned rectangle, same argument order as `[west, south, east, north]`
    pub fn rectangle(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self::new(vec![
            (min_lon, min_lat),
            (max_lon, min_lat),
            (max_lon, max_lat),
            (min_lon, max_lat),
        ])
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox {
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
        };
        for &(x, y) in &self.vertices {
            bbox.min_lon = bbox.min_lon.min(x);
            bbox.max_lon = bbox.max_lon.max(x);
            bbox.min_lat = bbox.min_lat.min(y);
            bbox.max_lat = bbox.max_lat.max(y);
        }
        bbox
    }

    /// Unsigned polygon area (shoelace), in squared map units
    pub fn area(&self) -> f64 {
        let n = self.vertices.len();
        if n < 3 {
            return 0.0;
        }
        let twice: f64 = (0..n)
            .map(|i| {
                let (x0, y0) = self.vertices[i];
                let (x1, y1) = self.vertices[(i + 1) % n];
                x0 * y1 - x1 * y0
            })
            .sum();
        (twice / 2.0).abs()
    }

    /// Even-odd point-in-polygon test
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let n = self.vertices.len();
        let mut inside = false;
        let mut j = n.wrapping_sub(1);
        for i in 0..n {
            let (xi, yi) = self.vertices[i];
            let (xj, yj) = self.vertices[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Reject polygons that cannot scope a query
    pub fn validate(&self) -> FloodResult<()> {
        if self.vertices.len() < 3 {
            return Err(FloodError::MalformedConfig(format!(
                "AOI needs at least 3 vertices, got {}",
                self.vertices.len()
            )));
        }
        if self
            .vertices
            .iter()
            .any(|(x, y)| !x.is_finite() || !y.is_finite())
        {
            return Err(FloodError::MalformedConfig(
                "AOI contains non-finite coordinates".to_string(),
            ));
        }
        if self.area() <= 0.0 {
            return Err(FloodError::MalformedConfig(
                "AOI polygon has zero area".to_string(),
            ));
        }
        Ok(())
    }
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform without rotation
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            top_left_x,
            pixel_width,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    /// Map coordinates of the centre of cell (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (
            self.top_left_x + c * self.pixel_width + r * self.rotation_x,
            self.top_left_y + c * self.rotation_y + r * self.pixel_height,
        )
    }

    /// Fractional (row, col) of a map coordinate; `None` for a singular transform
    pub fn to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let dx = x - self.top_left_x;
        let dy = y - self.top_left_y;
        let col = (self.pixel_height * dx - self.rotation_x * dy) / det;
        let row = (self.pixel_width * dy - self.rotation_y * dx) / det;
        Some((row, col))
    }

    /// Same grid up to a millionth of a pixel
    pub fn approx_eq(&self, other: &GeoTransform) -> bool {
        let tol = 1e-6 * self.pixel_width.abs().max(self.pixel_height.abs());
        let close = |a: f64, b: f64| (a - b).abs() <= tol;
        close(self.top_left_x, other.top_left_x)
            && close(self.top_left_y, other.top_left_y)
            && close(self.pixel_width, other.pixel_width)
            && close(self.pixel_height, other.pixel_height)
            && close(self.rotation_x, other.rotation_x)
            && close(self.rotation_y, other.rotation_y)
    }
}

/// A single-band gridded field with a parallel validity mask.
///
/// A cell whose validity flag is `false` is absent: it carries no value and
/// is skipped by every reduction. Values in invalid cells are never read.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T> {
    data: Array2<T>,
    valid: Array2<bool>,
    geo_transform: GeoTransform,
    /// Ground sampling distance in meters
    pixel_spacing: f64,
}

impl<T: Clone> Raster<T> {
    /// Fully valid raster
    pub fn new(data: Array2<T>, geo_transform: GeoTransform, pixel_spacing: f64) -> Self {
        let valid = Array2::from_elem(data.dim(), true);
        Self {
            data,
            valid,
            geo_transform,
            pixel_spacing,
        }
    }

    /// Raster with an explicit validity mask
    pub fn with_validity(
        data: Array2<T>,
        valid: Array2<bool>,
        geo_transform: GeoTransform,
        pixel_spacing: f64,
    ) -> FloodResult<Self> {
        if data.dim() != valid.dim() {
            return Err(FloodError::ShapeMismatch {
                expected: data.dim(),
                actual: valid.dim(),
            });
        }
        Ok(Self {
            data,
            valid,
            geo_transform,
            pixel_spacing,
        })
    }

    /// Raster where every cell is absent
    pub fn nodata(shape: (usize, usize), fill: T, geo_transform: GeoTransform, pixel_spacing: f64) -> Self {
        Self {
            data: Array2::from_elem(shape, fill),
            valid: Array2::from_elem(shape, false),
            geo_transform,
            pixel_spacing,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    pub fn validity(&self) -> &Array2<bool> {
        &self.valid
    }

    pub fn geo_transform(&self) -> &GeoTransform {
        &self.geo_transform
    }

    pub fn pixel_spacing(&self) -> f64 {
        self.pixel_spacing
    }

    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.valid.get((row, col)).copied().unwrap_or(false)
    }

    /// Value at (row, col), `None` when absent or out of bounds
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        if self.is_valid(row, col) {
            self.data.get((row, col)).cloned()
        } else {
            None
        }
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.valid.iter().any(|&v| v)
    }

    /// Fail unless `other` sits on this raster's grid: same shape, transform
    /// and spacing. Cell-wise operations rely on it.
    pub fn ensure_same_grid<U>(&self, other: &Raster<U>) -> FloodResult<()> {
        if self.data.dim() != other.data.dim() {
            return Err(FloodError::ShapeMismatch {
                expected: self.data.dim(),
                actual: other.data.dim(),
            });
        }
        let spacing_tol = 1e-9 * self.pixel_spacing.abs().max(1.0);
        if !self.geo_transform.approx_eq(&other.geo_transform)
            || (self.pixel_spacing - other.pixel_spacing).abs() > spacing_tol
        {
            return Err(FloodError::GridMismatch(format!(
                "expected {:?} at {} m, got {:?} at {} m",
                self.geo_transform, self.pixel_spacing, other.geo_transform, other.pixel_spacing
            )));
        }
        Ok(())
    }

    /// Per-cell transform; validity is carried over unchanged
    pub fn map<U, F>(&self, f: F) -> Raster<U>
    where
        F: Fn(&T) -> U,
    {
        Raster {
            data: self.data.map(f),
            valid: self.valid.clone(),
            geo_transform: self.geo_transform,
            pixel_spacing: self.pixel_spacing,
        }
    }

    /// Combine two same-grid rasters; a cell is valid only where both inputs are
    pub fn zip_with<U, V, F>(&self, other: &Raster<U>, f: F) -> FloodResult<Raster<V>>
    where
        U: Clone,
        V: Clone + Default,
        F: Fn(&T, &U) -> V,
    {
        self.ensure_same_grid(other)?;
        let mut data = Array2::from_elem(self.data.dim(), V::default());
        Zip::from(&mut data)
            .and(&self.data)
            .and(&other.data)
            .for_each(|out, a, b| *out = f(a, b));
        let valid = Zip::from(&self.valid)
            .and(&other.valid)
            .map_collect(|&a, &b| a && b);
        Ok(Raster {
            data,
            valid,
            geo_transform: self.geo_transform,
            pixel_spacing: self.pixel_spacing,
        })
    }

    /// Keep only cells present in `mask` whose mask value is `true`
    pub fn update_mask(&self, mask: &Raster<bool>) -> FloodResult<Raster<T>> {
        self.ensure_same_grid(mask)?;
        let valid = Zip::from(&self.valid)
            .and(&mask.valid)
            .and(&mask.data)
            .map_collect(|&own, &present, &value| own && present && value);
        Ok(Raster {
            data: self.data.clone(),
            valid,
            geo_transform: self.geo_transform,
            pixel_spacing: self.pixel_spacing,
        })
    }

    /// Drop cells whose centre falls outside the polygon
    pub fn clip(&self, aoi: &Aoi) -> Raster<T> {
        let gt = self.geo_transform;
        let mut valid = self.valid.clone();
        valid.indexed_iter_mut().for_each(|((row, col), v)| {
            if *v {
                let (x, y) = gt.pixel_center(row, col);
                *v = aoi.contains(x, y);
            }
        });
        Raster {
            data: self.data.clone(),
            valid,
            geo_transform: self.geo_transform,
            pixel_spacing: self.pixel_spacing,
        }
    }
}

impl<T: Clone + Default> Raster<T> {
    /// Nearest-neighbour resample onto `reference`'s grid.
    ///
    /// Each target cell takes the source cell under its centre. Target cells
    /// outside the source extent, or over absent source cells, are absent.
    pub fn regrid_to<U>(&self, reference: &Raster<U>) -> FloodResult<Raster<T>> {
        if self.ensure_same_grid(reference).is_ok() {
            return Ok(self.clone());
        }

        let target_gt = reference.geo_transform;
        let (rows, cols) = reference.data.dim();
        let (src_rows, src_cols) = self.data.dim();
        log::debug!(
            "Regridding {}x{} raster at {} m onto {}x{} grid at {} m",
            src_rows,
            src_cols,
            self.pixel_spacing,
            rows,
            cols,
            reference.pixel_spacing
        );

        let mut data = Array2::from_elem((rows, cols), T::default());
        let mut valid = Array2::from_elem((rows, cols), false);
        for ((row, col), out) in data.indexed_iter_mut() {
            let (x, y) = target_gt.pixel_center(row, col);
            let (r, c) = self.geo_transform.to_pixel(x, y).ok_or_else(|| {
                FloodError::GridMismatch(format!("Singular source transform {:?}", self.geo_transform))
            })?;
            if !(r >= 0.0 && c >= 0.0) {
                continue;
            }
            let (r, c) = (r.floor() as usize, c.floor() as usize);
            if r >= src_rows || c >= src_cols || !self.valid[[r, c]] {
                continue;
            }
            *out = self.data[[r, c]].clone();
            valid[[row, col]] = true;
        }

        Ok(Raster {
            data,
            valid,
            geo_transform: target_gt,
            pixel_spacing: reference.pixel_spacing,
        })
    }
}

impl Raster<bool> {
    /// Present and true cells
    pub fn count_true(&self) -> usize {
        Zip::from(&self.valid)
            .and(&self.data)
            .fold(0, |acc, &v, &d| if v && d { acc + 1 } else { acc })
    }

    /// Turn `false` cells into absent cells
    pub fn self_mask(&self) -> Raster<bool> {
        let valid = Zip::from(&self.valid)
            .and(&self.data)
            .map_collect(|&v, &d| v && d);
        Raster {
            data: self.data.clone(),
            valid,
            geo_transform: self.geo_transform,
            pixel_spacing: self.pixel_spacing,
        }
    }
}

/// Multi-band raster produced by compositing source acquisitions
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    bands: BTreeMap<String, Raster<SarReal>>,
    /// Number of source images that entered the composite
    pub source_count: usize,
}

impl Composite {
    pub fn new(bands: BTreeMap<String, Raster<SarReal>>, source_count: usize) -> Self {
        Self {
            bands,
            source_count,
        }
    }

    pub fn band(&self, name: &str) -> FloodResult<&Raster<SarReal>> {
        self.bands.get(name).ok_or_else(|| {
            FloodError::Processing(format!(
                "Band {} not present in composite (available: {:?})",
                name,
                self.band_names()
            ))
        })
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.keys().map(|k| k.as_str()).collect()
    }

    pub fn bands(&self) -> impl Iterator<Item = (&str, &Raster<SarReal>)> {
        self.bands.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Error types for flood mapping
#[derive(Debug, thiserror::Error)]
pub enum FloodError {
    #[error("No qualifying source image for {product} in {window}")]
    DataUnavailable { product: String, window: String },

    #[error("Aggregation needs {requested} pixels, budget is {budget}")]
    ResourceLimitExceeded { requested: u64, budget: u64 },

    #[error("Evaluation cancelled")]
    Cancelled,

    #[error("Evaluation exceeded its time budget after {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("Malformed configuration: {0}")]
    MalformedConfig(String),

    #[error("Raster shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Raster grid mismatch: {0}")]
    GridMismatch(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Result type for flood mapping operations
pub type FloodResult<T> = Result<T, FloodError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn unit_grid() -> GeoTransform {
        GeoTransform::north_up(0.0, 4.0, 1.0, 1.0)
    }

    #[test]
    fn test_aoi_contains_and_area() {
        let aoi = Aoi::rectangle(0.0, 0.0, 2.0, 2.0);
        assert!(aoi.contains(1.0, 1.0));
        assert!(!aoi.contains(3.0, 1.0));
        assert_eq!(aoi.area(), 4.0);
        assert!(aoi.validate().is_ok());
    }

    #[test]
    fn test_degenerate_aoi_rejected() {
        let line = Aoi::new(vec![(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
        assert!(matches!(line.validate(), Err(FloodError::MalformedConfig(_))));
        let short = Aoi::new(vec![(0.0, 0.0), (1.0, 1.0)]);
        assert!(matches!(short.validate(), Err(FloodError::MalformedConfig(_))));
    }

    #[test]
    fn test_clip_drops_outside_cells() {
        let raster = Raster::new(Array2::<f32>::ones((4, 4)), unit_grid(), 10.0);
        // Left half of the 4x4 grid (x in 0..2)
        let clipped = raster.clip(&Aoi::rectangle(0.0, 0.0, 2.0, 4.0));
        assert_eq!(clipped.valid_count(), 8);
        assert_eq!(clipped.get(0, 0), Some(1.0));
        assert_eq!(clipped.get(0, 3), None);
    }

    #[test]
    fn test_self_mask_and_update_mask() {
        let mask = Raster::new(array![[true, false], [false, true]], unit_grid(), 10.0).self_mask();
        assert_eq!(mask.valid_count(), 2);
        assert_eq!(mask.count_true(), 2);

        let classes = Raster::new(array![[10, 20], [30, 40]], unit_grid(), 10.0);
        let overlay = classes.update_mask(&mask).unwrap();
        assert_eq!(overlay.get(0, 0), Some(10));
        assert_eq!(overlay.get(0, 1), None);
        assert_eq!(overlay.get(1, 1), Some(40));
    }

    #[test]
    fn test_zip_with_shape_mismatch() {
        let a = Raster::new(Array2::<f32>::zeros((2, 2)), unit_grid(), 10.0);
        let b = Raster::new(Array2::<f32>::zeros((3, 2)), unit_grid(), 10.0);
        assert!(matches!(
            a.zip_with(&b, |x, y| x + y),
            Err(FloodError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_zip_with_rejects_shifted_grid() {
        let a = Raster::new(Array2::<f32>::zeros((4, 4)), unit_grid(), 10.0);
        let shifted = Raster::new(Array2::<f32>::zeros((4, 4)), GeoTransform::north_up(2.0, 4.0, 1.0, 1.0), 10.0);
        assert!(matches!(
            a.zip_with(&shifted, |x, y| x + y),
            Err(FloodError::GridMismatch(_))
        ));

        let mask = Raster::new(Array2::from_elem((4, 4), true), unit_grid(), 30.0);
        assert!(matches!(a.update_mask(&mask), Err(FloodError::GridMismatch(_))));
    }

    #[test]
    fn test_regrid_coarse_to_fine() {
        // 2x2 cells of 3 units over a 6x6 fine grid
        let coarse = Raster::new(
            array![[1.0f32, 2.0], [3.0, 4.0]],
            GeoTransform::north_up(0.0, 6.0, 3.0, 3.0),
            30.0,
        );
        let fine = Raster::new(Array2::<f32>::zeros((6, 6)), GeoTransform::north_up(0.0, 6.0, 1.0, 1.0), 10.0);
        let regridded = coarse.regrid_to(&fine).unwrap();

        assert_eq!(regridded.shape(), (6, 6));
        assert_eq!(regridded.pixel_spacing(), 10.0);
        assert_eq!(regridded.get(0, 0), Some(1.0));
        assert_eq!(regridded.get(2, 2), Some(1.0));
        assert_eq!(regridded.get(2, 3), Some(2.0));
        assert_eq!(regridded.get(5, 0), Some(3.0));
        assert_eq!(regridded.get(5, 5), Some(4.0));
        assert!(regridded.zip_with(&fine, |a, b| a + b).is_ok());
    }

    #[test]
    fn test_regrid_shifted_grid_leaves_gap_absent() {
        // Source starts two units east of the target
        let source = Raster::new(Array2::from_elem((4, 4), 7i32), GeoTransform::north_up(2.0, 4.0, 1.0, 1.0), 10.0);
        let target = Raster::new(Array2::<f32>::zeros((4, 4)), unit_grid(), 10.0);
        let regridded = source.regrid_to(&target).unwrap();

        assert_eq!(regridded.get(0, 0), None);
        assert_eq!(regridded.get(0, 1), None);
        assert_eq!(regridded.get(0, 2), Some(7));
        assert_eq!(regridded.get(3, 3), Some(7));
        assert_eq!(regridded.valid_count(), 8);
    }

    #[test]
    fn test_regrid_same_grid_is_identity() {
        let mut valid = Array2::from_elem((2, 2), true);
        valid[[1, 0]] = false;
        let source = Raster::with_validity(array![[1.0f32, 2.0], [3.0, 4.0]], valid, unit_grid(), 10.0).unwrap();
        assert_eq!(source.regrid_to(&source).unwrap(), source);
    }

    #[test]
    fn test_polarization_parse() {
        assert_eq!("vh".parse::<Polarization>().unwrap(), Polarization::VH);
        assert!("XX".parse::<Polarization>().is_err());
    }
}
