//! Deferred flood-mapping pipeline.
//!
//! [`FloodPipeline::plan`] only validates the configuration and records an
//! expression graph (composite -> smooth -> change -> mask -> overlay ->
//! histogram). Nothing is fetched until [`FloodPipeline::evaluate`], which
//! forces the whole graph in one call. Provider failures such as
//! `DataUnavailable` therefore surface from `evaluate`, never from `plan`.
//!
//! Evaluation state lives in a per-call cache that is dropped on return; a
//! cancelled or timed-out run leaves nothing behind.

use crate::config::{FloodConfig, TimeWindow};
use crate::core::area_report::{ReportBuilder, ReportOutcome};
use crate::core::change_detection::ChangeDetector;
use crate::core::control::EvalControl;
use crate::core::flood_mask::{FloodMaskBuilder, FloodMaskParams};
use crate::core::layers;
use crate::core::speckle_filter::{KernelShape, SpeckleFilter, SpeckleFilterParams};
use crate::core::zonal_histogram::{ClassHistogram, HistogramParams, ZonalHistogramAggregator};
use crate::io::provider::{QualityPredicates, RasterDataProvider};
use crate::io::sink::{emit_report, MapLayer, VisualizationSink};
use crate::types::{Aoi, ClassCode, Composite, FloodError, FloodResult, Polarization, Raster, SarReal};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Index of a node in a [`RasterGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Unevaluated raster operation
#[derive(Debug, Clone, PartialEq)]
pub enum RasterExpr {
    FetchComposite {
        product: String,
        window: TimeWindow,
        predicates: QualityPredicates,
    },
    FetchStatic {
        product: String,
    },
    FetchCategorical {
        product: String,
    },
    /// Focal mean of every band of a composite
    Smooth {
        source: NodeId,
        radius_m: f64,
        kernel: KernelShape,
        max_kernel_cells: u64,
    },
    Band {
        source: NodeId,
        band: String,
    },
    /// Nearest-neighbour resample of `source` onto the grid of `reference`
    Regrid {
        source: NodeId,
        reference: NodeId,
    },
    ChangeRatio {
        pre: NodeId,
        post: NodeId,
        polarizations: Vec<Polarization>,
    },
    ElevationMask {
        elevation: NodeId,
        params: FloodMaskParams,
    },
    FloodMask {
        change: NodeId,
        lowlands: NodeId,
        params: FloodMaskParams,
    },
    Overlay {
        classes: NodeId,
        mask: NodeId,
    },
    Histogram {
        classes: NodeId,
        params: HistogramParams,
    },
}

impl RasterExpr {
    pub fn inputs(&self) -> Vec<NodeId> {
        match self {
            RasterExpr::FetchComposite { .. }
            | RasterExpr::FetchStatic { .. }
            | RasterExpr::FetchCategorical { .. } => Vec::new(),
            RasterExpr::Smooth { source, .. } | RasterExpr::Band { source, .. } => vec![*source],
            RasterExpr::Regrid { source, reference } => vec![*source, *reference],
            RasterExpr::ChangeRatio { pre, post, .. } => vec![*pre, *post],
            RasterExpr::ElevationMask { elevation, .. } => vec![*elevation],
            RasterExpr::FloodMask { change, lowlands, .. } => vec![*change, *lowlands],
            RasterExpr::Overlay { classes, mask } => vec![*classes, *mask],
            RasterExpr::Histogram { classes, .. } => vec![*classes],
        }
    }
}

impl fmt::Display for RasterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RasterExpr::FetchComposite { product, window, predicates } => {
                write!(f, "median({} @ {} [{}])", product, window, predicates)
            }
            RasterExpr::FetchStatic { product } => write!(f, "static({})", product),
            RasterExpr::FetchCategorical { product } => write!(f, "categorical({})", product),
            RasterExpr::Smooth { source, radius_m, kernel, .. } => {
                write!(f, "focal_mean({}, {} m, {:?})", source, radius_m, kernel)
            }
            RasterExpr::Band { source, band } => write!(f, "band({}, {})", source, band),
            RasterExpr::Regrid { source, reference } => {
                write!(f, "regrid_nearest({}, grid of {})", source, reference)
            }
            RasterExpr::ChangeRatio { pre, post, polarizations } => {
                write!(f, "min_ndr({}, {}, {:?})", pre, post, polarizations)
            }
            RasterExpr::ElevationMask { elevation, params } => {
                write!(f, "self_mask({} < {})", elevation, params.elevation_threshold_m)
            }
            RasterExpr::FloodMask { change, lowlands, params } => {
                write!(f, "self_mask({} < {} and {})", change, params.change_threshold, lowlands)
            }
            RasterExpr::Overlay { classes, mask } => write!(f, "update_mask({}, {})", classes, mask),
            RasterExpr::Histogram { classes, params } => write!(
                f,
                "frequency_histogram({}, scale {} m, max {} px)",
                classes, params.scale_m, params.max_pixels
            ),
        }
    }
}

/// Append-only expression graph scoped to one AOI.
///
/// Nodes may only reference earlier nodes, so insertion order is a valid
/// evaluation order.
#[derive(Debug, Clone)]
pub struct RasterGraph {
    aoi: Aoi,
    nodes: Vec<RasterExpr>,
}

impl RasterGraph {
    pub fn new(aoi: Aoi) -> Self {
        Self {
            aoi,
            nodes: Vec::new(),
        }
    }

    pub fn aoi(&self) -> &Aoi {
        &self.aoi
    }

    pub fn push(&mut self, expr: RasterExpr) -> FloodResult<NodeId> {
        let id = NodeId(self.nodes.len());
        if let Some(bad) = expr.inputs().into_iter().find(|input| input.0 >= id.0) {
            return Err(FloodError::Processing(format!(
                "Node {} references {} which is not defined yet",
                id, bad
            )));
        }
        self.nodes.push(expr);
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&RasterExpr> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Force `targets` and everything they depend on
    pub fn evaluate<P: RasterDataProvider + ?Sized>(
        &self,
        provider: &P,
        control: &EvalControl,
        targets: &[NodeId],
    ) -> FloodResult<Evaluation> {
        let mut evaluator = Evaluator {
            graph: self,
            provider,
            control,
            cache: vec![None; self.nodes.len()],
        };
        for &target in targets {
            evaluator.ensure(target)?;
        }
        Ok(Evaluation {
            values: evaluator.cache,
        })
    }
}

impl fmt::Display for RasterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.nodes.iter().enumerate() {
            writeln!(f, "{} = {}", NodeId(i), node)?;
        }
        Ok(())
    }
}

/// Materialized node value
#[derive(Debug, Clone)]
pub enum Value {
    Composite(Composite),
    Continuous(Raster<SarReal>),
    Mask(Raster<bool>),
    Categorical(Raster<ClassCode>),
    Histogram(ClassHistogram),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Composite(_) => "composite",
            Value::Continuous(_) => "continuous raster",
            Value::Mask(_) => "mask",
            Value::Categorical(_) => "categorical raster",
            Value::Histogram(_) => "histogram",
        }
    }
}

/// Values produced by one forcing call
#[derive(Debug)]
pub struct Evaluation {
    values: Vec<Option<Value>>,
}

macro_rules! value_accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self, id: NodeId) -> FloodResult<&$ty> {
            match self.value(id)? {
                Value::$variant(v) => Ok(v),
                other => Err(FloodError::Processing(format!(
                    "Node {} holds a {}, not a {}",
                    id,
                    other.kind(),
                    stringify!($variant)
                ))),
            }
        }
    };
}

impl Evaluation {
    pub fn value(&self, id: NodeId) -> FloodResult<&Value> {
        self.values
            .get(id.0)
            .and_then(|v| v.as_ref())
            .ok_or_else(|| FloodError::Processing(format!("Node {} was not evaluated", id)))
    }

    value_accessor!(composite, Composite, Composite);
    value_accessor!(continuous, Continuous, Raster<SarReal>);
    value_accessor!(mask, Mask, Raster<bool>);
    value_accessor!(categorical, Categorical, Raster<ClassCode>);
    value_accessor!(histogram, Histogram, ClassHistogram);
}

struct Evaluator<'a, P: RasterDataProvider + ?Sized> {
    graph: &'a RasterGraph,
    provider: &'a P,
    control: &'a EvalControl,
    cache: Vec<Option<Value>>,
}

impl<'a, P: RasterDataProvider + ?Sized> Evaluator<'a, P> {
    fn ensure(&mut self, id: NodeId) -> FloodResult<()> {
        match self.cache.get(id.0) {
            None => return Err(FloodError::Processing(format!("Unknown node {}", id))),
            Some(Some(_)) => return Ok(()),
            Some(None) => {}
        }
        let graph = self.graph;
        let expr = &graph.nodes[id.0];
        for input in expr.inputs() {
            self.ensure(input)?;
        }
        self.control.check()?;

        log::debug!("Evaluating {} = {}", id, expr);
        let value = self.compute(expr)?;
        self.cache[id.0] = Some(value);
        Ok(())
    }

    fn input(&self, id: NodeId) -> FloodResult<&Value> {
        self.cache
            .get(id.0)
            .and_then(|v| v.as_ref())
            .ok_or_else(|| FloodError::Processing(format!("Input {} not evaluated", id)))
    }

    fn composite(&self, id: NodeId) -> FloodResult<&Composite> {
        match self.input(id)? {
            Value::Composite(c) => Ok(c),
            other => Err(type_error(id, other, "composite")),
        }
    }

    fn continuous(&self, id: NodeId) -> FloodResult<&Raster<SarReal>> {
        match self.input(id)? {
            Value::Continuous(r) => Ok(r),
            other => Err(type_error(id, other, "continuous raster")),
        }
    }

    fn mask(&self, id: NodeId) -> FloodResult<&Raster<bool>> {
        match self.input(id)? {
            Value::Mask(m) => Ok(m),
            other => Err(type_error(id, other, "mask")),
        }
    }

    fn categorical(&self, id: NodeId) -> FloodResult<&Raster<ClassCode>> {
        match self.input(id)? {
            Value::Categorical(c) => Ok(c),
            other => Err(type_error(id, other, "categorical raster")),
        }
    }

    fn compute(&self, expr: &RasterExpr) -> FloodResult<Value> {
        let aoi = self.graph.aoi();
        let value = match expr {
            RasterExpr::FetchComposite { product, window, predicates } => Value::Composite(
                self.provider.fetch_composite(product, aoi, window, predicates)?,
            ),
            RasterExpr::FetchStatic { product } => {
                Value::Continuous(self.provider.fetch_static(product, aoi)?)
            }
            RasterExpr::FetchCategorical { product } => {
                Value::Categorical(self.provider.fetch_categorical(product, aoi)?)
            }
            RasterExpr::Smooth { source, radius_m, kernel, max_kernel_cells } => {
                let filter = SpeckleFilter::with_params(SpeckleFilterParams {
                    radius_m: *radius_m,
                    kernel: *kernel,
                    max_kernel_cells: *max_kernel_cells,
                });
                let composite = self.composite(*source)?;
                let bands: BTreeMap<String, Raster<SarReal>> = composite
                    .bands()
                    .map(|(name, band)| {
                        Ok((name.to_string(), filter.apply_filter_with_control(band, self.control)?))
                    })
                    .collect::<FloodResult<_>>()?;
                Value::Composite(Composite::new(bands, composite.source_count))
            }
            RasterExpr::Band { source, band } => {
                Value::Continuous(self.composite(*source)?.band(band)?.clone())
            }
            RasterExpr::Regrid { source, reference } => {
                let grid = self.continuous(*reference)?;
                match self.input(*source)? {
                    Value::Continuous(r) => Value::Continuous(r.regrid_to(grid)?),
                    Value::Categorical(c) => Value::Categorical(c.regrid_to(grid)?),
                    Value::Mask(m) => Value::Mask(m.regrid_to(grid)?),
                    other => return Err(type_error(*source, other, "raster")),
                }
            }
            RasterExpr::ChangeRatio { pre, post, polarizations } => Value::Continuous(
                ChangeDetector::new(polarizations).detect(self.composite(*pre)?, self.composite(*post)?)?,
            ),
            RasterExpr::ElevationMask { elevation, params } => Value::Mask(
                FloodMaskBuilder::new(*params).elevation_mask(self.continuous(*elevation)?, aoi),
            ),
            RasterExpr::FloodMask { change, lowlands, params } => Value::Mask(
                FloodMaskBuilder::new(*params).flood_mask(
                    self.continuous(*change)?,
                    self.mask(*lowlands)?,
                    aoi,
                )?,
            ),
            RasterExpr::Overlay { classes, mask } => {
                Value::Categorical(self.categorical(*classes)?.update_mask(self.mask(*mask)?)?)
            }
            RasterExpr::Histogram { classes, params } => Value::Histogram(
                ZonalHistogramAggregator::new(*params)
                    .frequency_histogram_with_control(self.categorical(*classes)?, self.control)?,
            ),
        };
        Ok(value)
    }
}

fn type_error(id: NodeId, found: &Value, wanted: &str) -> FloodError {
    FloodError::Processing(format!("Node {} holds a {}, expected a {}", id, found.kind(), wanted))
}

/// Graph nodes a run reads back after evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOutputs {
    pub change_ratio: NodeId,
    pub elevation_mask: NodeId,
    pub flood_mask: NodeId,
    pub land_cover: NodeId,
    pub histogram: NodeId,
    /// First configured polarization of the smoothed post-event composite
    pub post_backscatter: NodeId,
    pub optical: Option<NodeId>,
}

/// Everything a completed run produced
#[derive(Debug, Clone)]
pub struct FloodRun {
    pub histogram: ClassHistogram,
    pub outcome: ReportOutcome,
    pub flood_mask: Raster<bool>,
    pub change_ratio: Raster<SarReal>,
    pub layers: Vec<MapLayer>,
    pub elapsed: Duration,
}

impl FloodRun {
    pub fn flooded_pixels(&self) -> u64 {
        self.histogram.total()
    }

    pub fn flooded_area_ha(&self) -> f64 {
        self.outcome.report().map_or(0.0, |r| r.total_area_ha())
    }
}

/// Planned flood-mapping run for one AOI and window pair
#[derive(Debug, Clone)]
pub struct FloodPipeline {
    config: FloodConfig,
    graph: RasterGraph,
    outputs: PlanOutputs,
}

impl FloodPipeline {
    /// Validate the configuration and build the expression graph.
    ///
    /// Fails fast with `MalformedConfig`; makes no provider call.
    pub fn plan(config: FloodConfig) -> FloodResult<Self> {
        config.validate()?;

        let mut graph = RasterGraph::new(config.aoi.clone());
        let products = &config.products;
        let radar = QualityPredicates::radar(config.acquisition_mode, &config.polarizations);

        let pre = graph.push(RasterExpr::FetchComposite {
            product: products.radar.clone(),
            window: config.reference_window,
            predicates: radar.clone(),
        })?;
        let post = graph.push(RasterExpr::FetchComposite {
            product: products.radar.clone(),
            window: config.flood_window,
            predicates: radar,
        })?;
        let pre_smooth = graph.push(RasterExpr::Smooth {
            source: pre,
            radius_m: config.smoothing_radius_m,
            kernel: KernelShape::Circle,
            max_kernel_cells: config.max_pixels,
        })?;
        let post_smooth = graph.push(RasterExpr::Smooth {
            source: post,
            radius_m: config.smoothing_radius_m,
            kernel: KernelShape::Circle,
            max_kernel_cells: config.max_pixels,
        })?;
        let change_ratio = graph.push(RasterExpr::ChangeRatio {
            pre: pre_smooth,
            post: post_smooth,
            polarizations: config.polarizations.clone(),
        })?;

        // Static layers come at their native resolution; every cell-wise
        // stage below works on the change-ratio grid
        let mask_params = FloodMaskParams::from(&config);
        let elevation = graph.push(RasterExpr::FetchStatic {
            product: products.elevation.clone(),
        })?;
        let elevation_on_grid = graph.push(RasterExpr::Regrid {
            source: elevation,
            reference: change_ratio,
        })?;
        let elevation_mask = graph.push(RasterExpr::ElevationMask {
            elevation: elevation_on_grid,
            params: mask_params,
        })?;
        let flood_mask = graph.push(RasterExpr::FloodMask {
            change: change_ratio,
            lowlands: elevation_mask,
            params: mask_params,
        })?;

        let land_cover = graph.push(RasterExpr::FetchCategorical {
            product: products.land_cover.clone(),
        })?;
        let land_cover_on_grid = graph.push(RasterExpr::Regrid {
            source: land_cover,
            reference: change_ratio,
        })?;
        let flooded_land_cover = graph.push(RasterExpr::Overlay {
            classes: land_cover_on_grid,
            mask: flood_mask,
        })?;
        let histogram = graph.push(RasterExpr::Histogram {
            classes: flooded_land_cover,
            params: HistogramParams::from(&config),
        })?;

        let display_pol = config.polarizations[0];
        let post_backscatter = graph.push(RasterExpr::Band {
            source: post_smooth,
            band: display_pol.band_name().to_string(),
        })?;
        let optical = if config.optical_preview {
            Some(graph.push(RasterExpr::FetchComposite {
                product: products.optical.clone(),
                window: config.flood_window,
                predicates: QualityPredicates::optical(config.cloud_percentage_max, &layers::RGB_BANDS),
            })?)
        } else {
            None
        };

        log::debug!("Planned flood mapping graph:\n{}", graph);

        Ok(Self {
            config,
            graph,
            outputs: PlanOutputs {
                change_ratio,
                elevation_mask,
                flood_mask,
                land_cover,
                histogram,
                post_backscatter,
                optical,
            },
        })
    }

    pub fn config(&self) -> &FloodConfig {
        &self.config
    }

    pub fn graph(&self) -> &RasterGraph {
        &self.graph
    }

    pub fn outputs(&self) -> &PlanOutputs {
        &self.outputs
    }

    /// Force the graph: the single blocking call of a run.
    ///
    /// Honors `control` and the configured evaluation timeout, whichever is
    /// tighter. The optical preview is display-only; if its query finds no
    /// scene the layer is skipped instead of failing the run.
    pub fn evaluate<P: RasterDataProvider + ?Sized>(
        &self,
        provider: &P,
        control: &EvalControl,
    ) -> FloodResult<FloodRun> {
        let started = Instant::now();
        let control = control.bounded_by(self.config.evaluation_timeout);
        let out = self.outputs;

        log::info!(
            "🛰️  Evaluating flood mapping: flood {} vs reference {}",
            self.config.flood_window,
            self.config.reference_window
        );

        let core = self.graph.evaluate(
            provider,
            &control,
            &[out.histogram, out.post_backscatter, out.land_cover],
        )?;

        let histogram = core.histogram(out.histogram)?.clone();
        let flood_mask = core.mask(out.flood_mask)?.clone();
        let change_ratio = core.continuous(out.change_ratio)?.clone();
        let outcome = ReportBuilder::from_config(&self.config).build(&histogram);

        let mut map_layers = Vec::new();
        if let Some(optical) = out.optical {
            match self.graph.evaluate(provider, &control, &[optical]) {
                Ok(preview) => map_layers.push(layers::optical_layer(preview.composite(optical)?)?),
                Err(FloodError::DataUnavailable { product, window }) => {
                    log::warn!("No optical preview: nothing in {} for {}", product, window);
                }
                Err(e) => return Err(e),
            }
        }
        map_layers.push(layers::backscatter_layer(
            core.continuous(out.post_backscatter)?,
            self.config.polarizations[0],
        ));
        map_layers.push(layers::flood_layer(&flood_mask));
        map_layers.push(layers::land_cover_layer(core.categorical(out.land_cover)?));

        let elapsed = started.elapsed();
        log::info!(
            "✅ Flood mapping completed in {:.2}s: {} flooded pixels",
            elapsed.as_secs_f64(),
            histogram.total()
        );

        Ok(FloodRun {
            histogram,
            outcome,
            flood_mask,
            change_ratio,
            layers: map_layers,
            elapsed,
        })
    }
}

/// Plan, evaluate and hand the results to a sink
pub fn run_flood_mapping<P, S>(
    config: FloodConfig,
    provider: &P,
    sink: &mut S,
    control: &EvalControl,
) -> FloodResult<FloodRun>
where
    P: RasterDataProvider + ?Sized,
    S: VisualizationSink + ?Sized,
{
    let pipeline = FloodPipeline::plan(config)?;
    let run = pipeline.evaluate(provider, control)?;
    for layer in &run.layers {
        sink.add_layer(layer)?;
    }
    emit_report(&run.outcome, sink)?;
    Ok(run)
}
