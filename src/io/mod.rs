pub mod catalog;
pub mod provider;
pub mod sink;

pub use catalog::{Scene, SceneCatalog, SceneMetadata};
pub use provider::{QualityPredicates, RasterDataProvider};
pub use sink::{ChartRequest, ChartType, LayerData, LogSink, MapLayer, VisParams, VisualizationSink};
