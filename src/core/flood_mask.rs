use crate::config::FloodConfig;
use crate::types::{Aoi, FloodResult, Raster, SarReal};

/// Thresholds combining change ratio and terrain into a flood mask
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloodMaskParams {
    /// Change ratio must be strictly below this
    pub change_threshold: SarReal,
    /// Elevation must be strictly below this (meters)
    pub elevation_threshold_m: SarReal,
}

impl Default for FloodMaskParams {
    fn default() -> Self {
        Self {
            change_threshold: -0.25,
            elevation_threshold_m: 1200.0,
        }
    }
}

impl From<&FloodConfig> for FloodMaskParams {
    fn from(config: &FloodConfig) -> Self {
        Self {
            change_threshold: config.change_threshold,
            elevation_threshold_m: config.elevation_threshold_m,
        }
    }
}

/// Builds self-masked boolean rasters: only `true` pixels are present.
#[derive(Debug, Clone)]
pub struct FloodMaskBuilder {
    params: FloodMaskParams,
}

impl FloodMaskBuilder {
    pub fn new(params: FloodMaskParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FloodMaskParams {
        &self.params
    }

    /// Low-lying terrain, restricted to the AOI.
    ///
    /// Depends only on the static elevation layer, so one mask serves every
    /// run over the same AOI and threshold.
    pub fn elevation_mask(&self, elevation: &Raster<SarReal>, aoi: &Aoi) -> Raster<bool> {
        let threshold = self.params.elevation_threshold_m;
        let mask = elevation.map(|&h| h < threshold).clip(aoi).self_mask();
        log::debug!(
            "Elevation mask: {} of {} pixels below {} m",
            mask.valid_count(),
            elevation.valid_count(),
            threshold
        );
        mask
    }

    /// `(change < threshold) AND low-lying`, restricted to the AOI.
    ///
    /// Both inputs must share one grid. Undefined (NaN) ratios compare false
    /// and never enter the mask.
    pub fn flood_mask(
        &self,
        change_ratio: &Raster<SarReal>,
        elevation_mask: &Raster<bool>,
        aoi: &Aoi,
    ) -> FloodResult<Raster<bool>> {
        let threshold = self.params.change_threshold;
        let drop = change_ratio.map(|&r| r < threshold);
        let combined = drop.zip_with(elevation_mask, |&d, &low| d && low)?;
        let mask = combined.self_mask().clip(aoi);

        let flooded = mask.count_true();
        if flooded == 0 {
            log::warn!("Flood mask is empty");
        }
        log::info!(
            "🌊 Flood mask: {} flooded of {} low-lying pixels (threshold {})",
            flooded,
            elevation_mask.count_true(),
            threshold
        );
        Ok(mask)
    }
}

impl Default for FloodMaskBuilder {
    fn default() -> Self {
        Self::new(FloodMaskParams::default())
    }
}
