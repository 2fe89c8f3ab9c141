use crate::config::TimeWindow;
use crate::types::{AcquisitionMode, Aoi, ClassCode, Composite, FloodResult, Polarization, Raster, SarReal};

/// Scene-level filters applied before compositing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualityPredicates {
    /// Upper bound (exclusive) on scene cloud percentage
    pub cloud_percentage_max: Option<f64>,
    pub acquisition_mode: Option<AcquisitionMode>,
    /// A scene must carry every listed polarization
    pub required_polarizations: Vec<Polarization>,
    /// Bands kept in the composite; empty keeps all
    pub bands: Vec<String>,
}

impl QualityPredicates {
    /// Cloud-screened multi-band optical query
    pub fn optical(cloud_percentage_max: f64, bands: &[&str]) -> Self {
        Self {
            cloud_percentage_max: Some(cloud_percentage_max),
            bands: bands.iter().map(|b| b.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Dual-polarization radar query
    pub fn radar(mode: AcquisitionMode, polarizations: &[Polarization]) -> Self {
        Self {
            acquisition_mode: Some(mode),
            required_polarizations: polarizations.to_vec(),
            bands: polarizations.iter().map(|p| p.band_name().to_string()).collect(),
            ..Self::default()
        }
    }
}

impl std::fmt::Display for QualityPredicates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(cloud) = self.cloud_percentage_max {
            parts.push(format!("cloud<{}", cloud));
        }
        if let Some(mode) = self.acquisition_mode {
            parts.push(format!("mode={}", mode));
        }
        if !self.required_polarizations.is_empty() {
            let pols: Vec<String> = self.required_polarizations.iter().map(|p| p.to_string()).collect();
            parts.push(format!("pol={{{}}}", pols.join(",")));
        }
        if !self.bands.is_empty() {
            parts.push(format!("bands=[{}]", self.bands.join(",")));
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// Source of AOI-clipped imagery.
///
/// Implementations own retrieval, retries and caching. The detection chain
/// only ever asks for composites over a window and for time-invariant layers.
///
/// Grids: all bands of one composite share a grid, and the pre- and
/// post-event radar composites must share it too. Static and categorical
/// layers may come at their native resolution and extent; the pipeline
/// resamples them onto the radar grid before any cell-wise step.
pub trait RasterDataProvider {
    /// Median composite of every scene matching AOI, window and predicates.
    ///
    /// Fails with `DataUnavailable` when no scene qualifies.
    fn fetch_composite(
        &self,
        product: &str,
        aoi: &Aoi,
        window: &TimeWindow,
        predicates: &QualityPredicates,
    ) -> FloodResult<Composite>;

    /// Time-invariant continuous layer such as elevation
    fn fetch_static(&self, product: &str, aoi: &Aoi) -> FloodResult<Raster<SarReal>>;

    /// Time-invariant categorical layer such as land cover
    fn fetch_categorical(&self, product: &str, aoi: &Aoi) -> FloodResult<Raster<ClassCode>>;
}
