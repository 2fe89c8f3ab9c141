//! floodmap: SAR change-detection flood mapping
//!
//! Compares pre- and post-event Sentinel-1 backscatter composites over an area
//! of interest, keeps low-lying pixels whose backscatter dropped, and reports
//! the flooded area per land-cover class.
//!
//! The chain is planned lazily with [`FloodPipeline::plan`] and forced with
//! [`FloodPipeline::evaluate`]. Imagery comes from any
//! [`RasterDataProvider`]; results go to any [`VisualizationSink`].

pub mod config;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use config::{FloodConfig, ProductIds, TimeWindow};
pub use types::{
    AcquisitionMode, Aoi, BoundingBox, ClassCode, Composite, FloodError, FloodResult,
    GeoTransform, Polarization, Raster, SarReal,
};

pub use crate::core::{
    run_flood_mapping, AreaReport, ClassHistogram, EvalControl, FloodPipeline, FloodRun,
    ReportOutcome,
};
pub use io::{LogSink, QualityPredicates, RasterDataProvider, SceneCatalog, VisualizationSink};
