//! Run configuration for a single AOI / date-window pair.
//!
//! Every tunable of the detection chain lives in [`FloodConfig`]. The value is
//! built once, validated, and then passed by reference into each stage.

use crate::core::speckle_filter::kernel_window_cells;
use crate::types::{AcquisitionMode, Aoi, FloodError, FloodResult, Polarization};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Inclusive start / exclusive end acquisition date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Parse a pair of `YYYY-MM-DD` strings
    pub fn parse(start: &str, end: &str) -> FloodResult<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| FloodError::MalformedConfig(format!("Invalid date '{}': {}", s, e)))
        };
        Ok(Self::new(parse(start)?, parse(end)?))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    pub fn validate(&self) -> FloodResult<()> {
        if self.start >= self.end {
            return Err(FloodError::MalformedConfig(format!(
                "Time window start {} is not before end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Catalogue identifiers for the four inputs of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductIds {
    pub optical: String,
    pub radar: String,
    pub elevation: String,
    pub land_cover: String,
}

impl Default for ProductIds {
    fn default() -> Self {
        Self {
            optical: "COPERNICUS/S2_SR_HARMONIZED".to_string(),
            radar: "COPERNICUS/S1_GRD".to_string(),
            elevation: "USGS/SRTMGL1_003".to_string(),
            land_cover: "ESA/WorldCover/v100/2020".to_string(),
        }
    }
}

/// Flood mapping configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloodConfig {
    pub aoi: Aoi,
    /// Post-event acquisitions
    pub flood_window: TimeWindow,
    /// Pre-event (dry reference) acquisitions
    pub reference_window: TimeWindow,
    /// Maximum scene cloud percentage for optical scenes
    pub cloud_percentage_max: f64,
    pub acquisition_mode: AcquisitionMode,
    /// Every polarization listed must be present in a radar scene
    pub polarizations: Vec<Polarization>,
    /// Focal mean radius in meters
    pub smoothing_radius_m: f64,
    /// NDR below this value counts as a backscatter drop
    pub change_threshold: f32,
    /// Elevation (meters) below which flooding is plausible
    pub elevation_threshold_m: f32,
    /// Sampling scale for the zonal histogram, meters
    pub scale_m: f64,
    pub max_pixels: u64,
    /// Build the optical RGB preview layer
    pub optical_preview: bool,
    /// Wall-clock budget for the forcing evaluation
    #[serde(with = "optional_seconds")]
    pub evaluation_timeout: Option<Duration>,
    pub products: ProductIds,
}

impl Default for FloodConfig {
    fn default() -> Self {
        // Nyando basin, May 2022 event
        Self {
            aoi: Aoi::rectangle(34.85, -0.25, 35.3, -0.05),
            flood_window: TimeWindow::new(ymd(2022, 5, 1), ymd(2022, 5, 20)),
            reference_window: TimeWindow::new(ymd(2022, 3, 15), ymd(2022, 3, 30)),
            cloud_percentage_max: 10.0,
            acquisition_mode: AcquisitionMode::IW,
            polarizations: vec![Polarization::VV, Polarization::VH],
            smoothing_radius_m: 30.0,
            change_threshold: -0.25,
            elevation_threshold_m: 1200.0,
            scale_m: 10.0,
            max_pixels: 1_000_000_000,
            optical_preview: true,
            evaluation_timeout: None,
            products: ProductIds::default(),
        }
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

impl FloodConfig {
    /// Load a configuration from a TOML file; missing keys take defaults
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> FloodResult<Self> {
        log::info!("Loading flood configuration from: {}", path.as_ref().display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> FloodResult<Self> {
        let config: FloodConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on values that would make any provider query meaningless
    pub fn validate(&self) -> FloodResult<()> {
        self.aoi.validate()?;
        self.flood_window.validate()?;
        self.reference_window.validate()?;

        if self.polarizations.is_empty() {
            return Err(FloodError::MalformedConfig(
                "At least one polarization is required".to_string(),
            ));
        }
        if !(self.smoothing_radius_m.is_finite() && self.smoothing_radius_m > 0.0) {
            return Err(FloodError::MalformedConfig(format!(
                "Smoothing radius must be positive, got {}",
                self.smoothing_radius_m
            )));
        }
        if !(self.scale_m.is_finite() && self.scale_m > 0.0) {
            return Err(FloodError::MalformedConfig(format!(
                "Sampling scale must be positive, got {}",
                self.scale_m
            )));
        }
        if self.max_pixels == 0 {
            return Err(FloodError::MalformedConfig(
                "Pixel budget must be positive".to_string(),
            ));
        }
        // Nominal check at the sampling scale; the filter re-checks against
        // the radar grid's actual spacing
        match kernel_window_cells(self.smoothing_radius_m, self.scale_m) {
            Some(cells) if cells <= self.max_pixels => {}
            _ => {
                return Err(FloodError::MalformedConfig(format!(
                    "Smoothing radius {} m needs a kernel larger than the {} pixel budget",
                    self.smoothing_radius_m, self.max_pixels
                )))
            }
        }
        if !self.change_threshold.is_finite() || !self.elevation_threshold_m.is_finite() {
            return Err(FloodError::MalformedConfig(
                "Thresholds must be finite".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.cloud_percentage_max) {
            return Err(FloodError::MalformedConfig(format!(
                "Cloud percentage ceiling must be within 0..=100, got {}",
                self.cloud_percentage_max
            )));
        }
        Ok(())
    }

    /// Hectares represented by one pixel at the sampling scale
    pub fn hectares_per_pixel(&self) -> f64 {
        self.scale_m * self.scale_m / 10_000.0
    }
}

mod optional_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<f64> = Option::deserialize(d)?;
        match secs {
            Some(s) if s.is_finite() && s >= 0.0 => Ok(Some(Duration::from_secs_f64(s))),
            Some(s) => Err(serde::de::Error::custom(format!(
                "timeout must be a non-negative number of seconds, got {}",
                s
            ))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = FloodConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.change_threshold, -0.25);
        assert_eq!(config.elevation_threshold_m, 1200.0);
        assert_eq!(config.smoothing_radius_m, 30.0);
        assert_eq!(config.scale_m, 10.0);
        assert_eq!(config.max_pixels, 1_000_000_000);
        assert!((config.hectares_per_pixel() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_inverted_window_rejected() {
        let mut config = FloodConfig::default();
        config.flood_window = TimeWindow::parse("2022-05-20", "2022-05-01").unwrap();
        assert!(matches!(config.validate(), Err(FloodError::MalformedConfig(_))));
    }

    #[test]
    fn test_bad_date_string_rejected() {
        assert!(matches!(
            TimeWindow::parse("2022-13-01", "2022-05-01"),
            Err(FloodError::MalformedConfig(_))
        ));
    }

    #[test]
    fn test_toml_overrides_keep_defaults() {
        let config = FloodConfig::from_toml_str(
            r#"
            change_threshold = -0.3
            scale_m = 20.0
            evaluation_timeout = 90.0
            polarizations = ["VV"]
            "#,
        )
        .unwrap();
        assert_eq!(config.change_threshold, -0.3);
        assert_eq!(config.scale_m, 20.0);
        assert_eq!(config.polarizations, vec![Polarization::VV]);
        assert_eq!(config.evaluation_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.elevation_threshold_m, 1200.0);
        assert_eq!(config.acquisition_mode, AcquisitionMode::IW);
    }

    #[test]
    fn test_toml_file_with_windows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [flood_window]
            start = "2023-04-01"
            end = "2023-04-15"

            [aoi]
            vertices = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]
            "#
        )
        .unwrap();

        let config = FloodConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.flood_window.to_string(), "2023-04-01..2023-04-15");
        assert_eq!(config.aoi.vertices.len(), 4);
    }

    #[test]
    fn test_oversized_smoothing_radius_rejected() {
        let mut config = FloodConfig::default();
        config.smoothing_radius_m = 1e20;
        assert!(matches!(config.validate(), Err(FloodError::MalformedConfig(_))));

        // 30 m at 10 m is a 7x7 window
        let mut config = FloodConfig::default();
        config.max_pixels = 48;
        assert!(config.validate().is_err());
        config.max_pixels = 49;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_toml_value_fails_fast() {
        let result = FloodConfig::from_toml_str("scale_m = 0.0");
        assert!(matches!(result, Err(FloodError::MalformedConfig(_))));
    }
}
