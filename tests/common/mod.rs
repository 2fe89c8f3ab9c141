//! Synthetic 20x20 scene over a 200 m square AOI at 10 m spacing.
//!
//! Layout (row, col):
//! - radar drop in the top-left 10x10 block during the flood window
//! - high ground (1500 m) on rows 0..5 of that block, 500 m elsewhere
//! - land cover: cols 0..5 cropland (40), cols 5..10 wetlands (90), 10 elsewhere,
//!   with one unlabelled code 999 at (9, 9)

#![allow(dead_code)]

use chrono::NaiveDate;
use floodmap::config::ProductIds;
use floodmap::io::{Scene, SceneMetadata};
use floodmap::{
    AcquisitionMode, Aoi, BoundingBox, FloodConfig, GeoTransform, Polarization, Raster, SceneCatalog,
    TimeWindow,
};
use ndarray::Array2;
use std::collections::BTreeMap;

pub const SIZE: usize = 20;
pub const SPACING: f64 = 10.0;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn grid() -> GeoTransform {
    GeoTransform::north_up(0.0, SIZE as f64 * SPACING, SPACING, SPACING)
}

pub fn aoi() -> Aoi {
    let extent = SIZE as f64 * SPACING;
    Aoi::rectangle(0.0, 0.0, extent, extent)
}

pub fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
}

pub fn in_flood_block(row: usize, col: usize) -> bool {
    row < 10 && col < 10
}

/// Config over the synthetic AOI; 5 m radius keeps the focal mean to the centre pixel
pub fn config() -> FloodConfig {
    FloodConfig {
        aoi: aoi(),
        flood_window: TimeWindow::parse("2022-05-01", "2022-05-20").unwrap(),
        reference_window: TimeWindow::parse("2022-03-15", "2022-03-30").unwrap(),
        smoothing_radius_m: 5.0,
        ..FloodConfig::default()
    }
}

fn footprint() -> BoundingBox {
    let extent = SIZE as f64 * SPACING;
    BoundingBox {
        min_lon: 0.0,
        max_lon: extent,
        min_lat: 0.0,
        max_lat: extent,
    }
}

fn radar_scene(acquired: &str, mode: AcquisitionMode, value: impl Fn(usize, usize) -> f32) -> Scene {
    let raster = Raster::new(Array2::from_shape_fn((SIZE, SIZE), |(i, j)| value(i, j)), grid(), SPACING);
    let mut bands = BTreeMap::new();
    bands.insert("VV".to_string(), raster.clone());
    bands.insert("VH".to_string(), raster.map(|&v| v * 0.5));
    Scene {
        metadata: SceneMetadata {
            acquired: date(acquired),
            footprint: footprint(),
            cloud_percentage: None,
            acquisition_mode: Some(mode),
            polarizations: vec![Polarization::VV, Polarization::VH],
        },
        bands,
    }
}

fn optical_scene(acquired: &str, cloud: f64) -> Scene {
    let mut bands = BTreeMap::new();
    for (name, dn) in [("B2", 600.0f32), ("B3", 900.0), ("B4", 1200.0), ("B8", 2500.0)] {
        bands.insert(
            name.to_string(),
            Raster::new(Array2::from_elem((SIZE, SIZE), dn), grid(), SPACING),
        );
    }
    Scene {
        metadata: SceneMetadata {
            acquired: date(acquired),
            footprint: footprint(),
            cloud_percentage: Some(cloud),
            acquisition_mode: None,
            polarizations: Vec::new(),
        },
        bands,
    }
}

pub fn elevation() -> Raster<f32> {
    Raster::new(
        Array2::from_shape_fn((SIZE, SIZE), |(i, j)| if i < 5 && j < 10 { 1500.0 } else { 500.0 }),
        grid(),
        SPACING,
    )
}

pub fn land_cover() -> Raster<i32> {
    Raster::new(
        Array2::from_shape_fn((SIZE, SIZE), |(i, j)| match (i, j) {
            (9, 9) => 999,
            (_, j) if j < 5 => 40,
            (_, j) if j < 10 => 90,
            _ => 10,
        }),
        grid(),
        SPACING,
    )
}

/// Catalogue with the static layers and both radar windows.
///
/// Reference composites are the median of 0.10 and 0.12 (0.11). Flood-window
/// composites are the median of three scenes: 0.03 inside the flood block and
/// 0.11 elsewhere. An EW scene with extreme values must be filtered out.
pub fn catalog(with_flood: bool, with_optical: bool) -> SceneCatalog {
    let products = ProductIds::default();
    let mut catalog = SceneCatalog::new();

    catalog.add_scene(&products.radar, radar_scene("2022-03-18", AcquisitionMode::IW, |_, _| 0.10));
    catalog.add_scene(&products.radar, radar_scene("2022-03-27", AcquisitionMode::IW, |_, _| 0.12));

    let post = |flooded: f32, dry: f32| {
        move |i: usize, j: usize| {
            if with_flood && in_flood_block(i, j) {
                flooded
            } else {
                dry
            }
        }
    };
    catalog.add_scene(&products.radar, radar_scene("2022-05-03", AcquisitionMode::IW, post(0.02, 0.10)));
    catalog.add_scene(&products.radar, radar_scene("2022-05-09", AcquisitionMode::IW, post(0.03, 0.11)));
    catalog.add_scene(&products.radar, radar_scene("2022-05-15", AcquisitionMode::IW, post(0.90, 0.12)));
    catalog.add_scene(&products.radar, radar_scene("2022-05-10", AcquisitionMode::EW, |_, _| 50.0));

    if with_optical {
        catalog.add_scene(&products.optical, optical_scene("2022-05-06", 4.0));
        catalog.add_scene(&products.optical, optical_scene("2022-05-12", 60.0));
    }

    catalog.add_static(&products.elevation, elevation());
    catalog.add_categorical(&products.land_cover, land_cover());
    catalog
}
