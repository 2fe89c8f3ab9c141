use crate::config::TimeWindow;
use crate::core::composite::MedianCompositor;
use crate::io::provider::{QualityPredicates, RasterDataProvider};
use crate::types::{
    AcquisitionMode, Aoi, BoundingBox, ClassCode, Composite, FloodError, FloodResult, Polarization,
    Raster, SarReal,
};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

/// Acquisition metadata used by the scene filters
#[derive(Debug, Clone, PartialEq)]
pub struct SceneMetadata {
    pub acquired: NaiveDate,
    pub footprint: BoundingBox,
    pub cloud_percentage: Option<f64>,
    pub acquisition_mode: Option<AcquisitionMode>,
    pub polarizations: Vec<Polarization>,
}

impl SceneMetadata {
    fn matches(&self, aoi_bbox: &BoundingBox, window: &TimeWindow, predicates: &QualityPredicates) -> bool {
        if !self.footprint.intersects(aoi_bbox) || !window.contains(self.acquired) {
            return false;
        }
        if let Some(max_cloud) = predicates.cloud_percentage_max {
            // Scenes without a cloud estimate cannot satisfy the bound
            match self.cloud_percentage {
                Some(cloud) if cloud < max_cloud => {}
                _ => return false,
            }
        }
        if let Some(mode) = predicates.acquisition_mode {
            if self.acquisition_mode != Some(mode) {
                return false;
            }
        }
        predicates
            .required_polarizations
            .iter()
            .all(|p| self.polarizations.contains(p))
    }
}

/// One acquisition: metadata plus named bands on a shared grid
#[derive(Debug, Clone)]
pub struct Scene {
    pub metadata: SceneMetadata,
    pub bands: BTreeMap<String, Raster<SarReal>>,
}

/// In-memory raster catalogue.
///
/// Holds individual acquisitions per product and answers composite queries by
/// filtering them and taking the temporal median. All scenes of a product are
/// expected to share one grid.
#[derive(Debug, Clone, Default)]
pub struct SceneCatalog {
    collections: HashMap<String, Vec<Scene>>,
    statics: HashMap<String, Raster<SarReal>>,
    categorical: HashMap<String, Raster<ClassCode>>,
}

impl SceneCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_scene(&mut self, product: &str, scene: Scene) {
        self.collections.entry(product.to_string()).or_default().push(scene);
    }

    pub fn add_static(&mut self, product: &str, raster: Raster<SarReal>) {
        self.statics.insert(product.to_string(), raster);
    }

    pub fn add_categorical(&mut self, product: &str, raster: Raster<ClassCode>) {
        self.categorical.insert(product.to_string(), raster);
    }

    pub fn scene_count(&self, product: &str) -> usize {
        self.collections.get(product).map_or(0, |c| c.len())
    }
}

impl RasterDataProvider for SceneCatalog {
    fn fetch_composite(
        &self,
        product: &str,
        aoi: &Aoi,
        window: &TimeWindow,
        predicates: &QualityPredicates,
    ) -> FloodResult<Composite> {
        log::info!("Querying {} for {} ({})", product, window, predicates);

        let aoi_bbox = aoi.bounding_box();
        let selected: Vec<&Scene> = self
            .collections
            .get(product)
            .map(|scenes| {
                scenes
                    .iter()
                    .filter(|s| s.metadata.matches(&aoi_bbox, window, predicates))
                    .collect()
            })
            .unwrap_or_default();

        if selected.is_empty() {
            return Err(FloodError::DataUnavailable {
                product: product.to_string(),
                window: window.to_string(),
            });
        }
        log::debug!("{} of {} scenes qualify", selected.len(), self.scene_count(product));

        let bands: Vec<String> = if predicates.bands.is_empty() {
            selected[0].bands.keys().cloned().collect()
        } else {
            predicates.bands.clone()
        };

        let band_maps: Vec<&BTreeMap<String, Raster<SarReal>>> =
            selected.iter().map(|s| &s.bands).collect();
        let composite = MedianCompositor::composite_scenes(&band_maps, &bands)?;

        let clipped = composite
            .bands()
            .map(|(name, raster)| (name.to_string(), raster.clip(aoi)))
            .collect();
        Ok(Composite::new(clipped, composite.source_count))
    }

    fn fetch_static(&self, product: &str, aoi: &Aoi) -> FloodResult<Raster<SarReal>> {
        log::info!("Fetching static layer {}", product);
        self.statics
            .get(product)
            .map(|r| r.clip(aoi))
            .ok_or_else(|| FloodError::DataUnavailable {
                product: product.to_string(),
                window: "static".to_string(),
            })
    }

    fn fetch_categorical(&self, product: &str, aoi: &Aoi) -> FloodResult<Raster<ClassCode>> {
        log::info!("Fetching categorical layer {}", product);
        self.categorical
            .get(product)
            .map(|r| r.clip(aoi))
            .ok_or_else(|| FloodError::DataUnavailable {
                product: product.to_string(),
                window: "static".to_string(),
            })
    }
}
