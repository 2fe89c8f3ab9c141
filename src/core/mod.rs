//! Core flood detection and quantification stages

pub mod area_report;
pub mod change_detection;
pub mod composite;
pub mod control;
pub mod flood_mask;
pub mod layers;
pub mod pipeline;
pub mod speckle_filter;
pub mod zonal_histogram;

// Re-export main types
pub use area_report::{AreaEntry, AreaReport, ClassNameResolver, ReportBuilder, ReportOutcome};
pub use change_detection::{nan_propagating_min, normalized_difference, ChangeDetector};
pub use composite::MedianCompositor;
pub use control::EvalControl;
pub use flood_mask::{FloodMaskBuilder, FloodMaskParams};
pub use pipeline::{run_flood_mapping, FloodPipeline, FloodRun, NodeId, PlanOutputs, RasterExpr, RasterGraph};
pub use speckle_filter::{kernel_window_cells, KernelShape, SpeckleFilter, SpeckleFilterParams};
pub use zonal_histogram::{ClassHistogram, HistogramParams, ZonalHistogramAggregator};
