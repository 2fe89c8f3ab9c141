use crate::config::FloodConfig;
use crate::core::zonal_histogram::ClassHistogram;
use crate::types::ClassCode;
use std::collections::BTreeMap;

/// Maps land-cover class codes to display labels
#[derive(Debug, Clone)]
pub struct ClassNameResolver {
    labels: BTreeMap<ClassCode, String>,
}

impl ClassNameResolver {
    pub fn new(labels: BTreeMap<ClassCode, String>) -> Self {
        Self { labels }
    }

    /// ESA WorldCover v100 legend
    pub fn worldcover() -> Self {
        let labels = [
            (10, "Tree Cover"),
            (20, "Shrubland"),
            (30, "Grassland"),
            (40, "Cropland"),
            (50, "Built-up"),
            (60, "Bare/Sparse Veg"),
            (80, "Water"),
            (90, "Wetlands"),
            (95, "Mangrove"),
            (100, "Moss/Lichen"),
        ]
        .into_iter()
        .map(|(code, label)| (code, label.to_string()))
        .collect();
        Self::new(labels)
    }

    /// Table label, or `Class <code>` for codes the table lacks
    pub fn resolve(&self, code: ClassCode) -> String {
        self.labels
            .get(&code)
            .cloned()
            .unwrap_or_else(|| format!("Class {}", code))
    }
}

impl Default for ClassNameResolver {
    fn default() -> Self {
        Self::worldcover()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AreaEntry {
    pub code: ClassCode,
    pub label: String,
    pub pixel_count: u64,
    pub area_ha: f64,
}

/// Flooded area per land-cover class.
///
/// Entries follow the histogram's ascending class-code order; renderers use
/// this order as is.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaReport {
    pub entries: Vec<AreaEntry>,
    pub hectares_per_pixel: f64,
}

impl AreaReport {
    pub fn total_area_ha(&self) -> f64 {
        self.entries.iter().map(|e| e.area_ha).sum()
    }

    pub fn total_pixels(&self) -> u64 {
        self.entries.iter().map(|e| e.pixel_count).sum()
    }
}

/// Result of turning a histogram into a report
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    Report(AreaReport),
    /// The flood mask held no pixels: a valid, empty result
    NoFloodDetected,
}

impl ReportOutcome {
    pub fn report(&self) -> Option<&AreaReport> {
        match self {
            ReportOutcome::Report(report) => Some(report),
            ReportOutcome::NoFloodDetected => None,
        }
    }
}

pub struct ReportBuilder {
    resolver: ClassNameResolver,
    scale_m: f64,
}

impl ReportBuilder {
    pub fn new(resolver: ClassNameResolver, scale_m: f64) -> Self {
        Self { resolver, scale_m }
    }

    pub fn from_config(config: &FloodConfig) -> Self {
        Self::new(ClassNameResolver::worldcover(), config.scale_m)
    }

    /// Hectares covered by one sample: scale² / 10 000
    pub fn hectares_per_pixel(&self) -> f64 {
        self.scale_m * self.scale_m / 10_000.0
    }

    pub fn build(&self, histogram: &ClassHistogram) -> ReportOutcome {
        if histogram.is_empty() {
            log::info!("No flooded pixels, skipping area report");
            return ReportOutcome::NoFloodDetected;
        }

        let ha_per_pixel = self.hectares_per_pixel();
        let entries = histogram
            .iter()
            .map(|(code, count)| AreaEntry {
                code,
                label: self.resolver.resolve(code),
                pixel_count: count,
                area_ha: count as f64 * ha_per_pixel,
            })
            .collect::<Vec<_>>();

        let report = AreaReport {
            entries,
            hectares_per_pixel: ha_per_pixel,
        };
        log::info!(
            "Area report: {} classes, {:.2} ha flooded",
            report.entries.len(),
            report.total_area_ha()
        );
        ReportOutcome::Report(report)
    }
}
