use crate::core::area_report::{AreaReport, ReportOutcome};
use crate::types::{ClassCode, Composite, FloodResult, Raster, SarReal};

pub const CHART_TITLE: &str = "Flooded Area by Land Cover Type";
pub const CATEGORY_AXIS_TITLE: &str = "Land Cover";
pub const VALUE_AXIS_TITLE: &str = "Flooded Area (ha)";
pub const NO_FLOOD_MESSAGE: &str = "No flooded area detected.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartType {
    /// Vertical bars
    Column,
    /// Horizontal bars
    Bar,
}

/// Chart rendering request handed to the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRequest {
    pub chart_type: ChartType,
    pub title: String,
    pub category_axis_title: String,
    pub value_axis_title: String,
    pub show_legend: bool,
    pub colors: Vec<String>,
    /// (label, hectares) in report order
    pub rows: Vec<(String, f64)>,
    /// Shown instead of the chart when there is nothing to plot
    pub no_data_message: String,
}

impl ChartRequest {
    pub fn column_chart(report: &AreaReport) -> Self {
        Self {
            chart_type: ChartType::Column,
            title: CHART_TITLE.to_string(),
            category_axis_title: CATEGORY_AXIS_TITLE.to_string(),
            value_axis_title: VALUE_AXIS_TITLE.to_string(),
            show_legend: false,
            colors: vec!["#1f77b4".to_string()],
            rows: report
                .entries
                .iter()
                .map(|e| (e.label.clone(), e.area_ha))
                .collect(),
            no_data_message: NO_FLOOD_MESSAGE.to_string(),
        }
    }
}

/// Display range and colour ramp for a map layer
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VisParams {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub palette: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerData {
    Rgb(Composite),
    Continuous(Raster<SarReal>),
    Mask(Raster<bool>),
    Categorical(Raster<ClassCode>),
}

/// Map layer handed to the external renderer
#[derive(Debug, Clone, PartialEq)]
pub struct MapLayer {
    pub name: String,
    pub data: LayerData,
    pub vis: VisParams,
}

/// Presentation layer for charts, messages and map layers
pub trait VisualizationSink {
    fn render_chart(&mut self, chart: &ChartRequest) -> FloodResult<()>;

    fn show_message(&mut self, message: &str) -> FloodResult<()>;

    fn add_layer(&mut self, _layer: &MapLayer) -> FloodResult<()> {
        Ok(())
    }
}

/// Hand a report to a sink: a chart when there is flooding, the no-data
/// message otherwise.
pub fn emit_report<S: VisualizationSink + ?Sized>(outcome: &ReportOutcome, sink: &mut S) -> FloodResult<()> {
    match outcome {
        ReportOutcome::Report(report) => sink.render_chart(&ChartRequest::column_chart(report)),
        ReportOutcome::NoFloodDetected => sink.show_message(NO_FLOOD_MESSAGE),
    }
}

/// Sink that writes everything through the `log` facade
#[derive(Debug, Default)]
pub struct LogSink;

impl VisualizationSink for LogSink {
    fn render_chart(&mut self, chart: &ChartRequest) -> FloodResult<()> {
        log::info!("📊 {}", chart.title);
        log::info!("   {} | {}", chart.category_axis_title, chart.value_axis_title);
        for (label, area) in &chart.rows {
            log::info!("   {:<20} {:>12.2}", label, area);
        }
        Ok(())
    }

    fn show_message(&mut self, message: &str) -> FloodResult<()> {
        log::warn!("⚠️  {}", message);
        Ok(())
    }

    fn add_layer(&mut self, layer: &MapLayer) -> FloodResult<()> {
        log::debug!("Map layer '{}' ({:?})", layer.name, layer.vis);
        Ok(())
    }
}
