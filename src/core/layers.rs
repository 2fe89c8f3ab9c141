use crate::io::sink::{LayerData, MapLayer, VisParams};
use crate::types::{ClassCode, Composite, FloodResult, Polarization, Raster, SarReal};
use std::collections::BTreeMap;

/// Surface reflectance scale factor of the optical product
pub const REFLECTANCE_SCALE: SarReal = 10_000.0;

/// True-colour band order
pub const RGB_BANDS: [&str; 3] = ["B4", "B3", "B2"];

/// WorldCover legend colours, classes 10..100
pub const LAND_COVER_PALETTE: [&str; 14] = [
    "006400", "ffbb22", "ffff4c", "f096ff", "fa0000", "b4b4b4", "f0f0f0", "0064c8", "0096a0",
    "00cf75", "fae6a0", "58481f", "0096a0", "ffffff",
];

fn palette(colors: &[&str]) -> Vec<String> {
    colors.iter().map(|c| c.to_string()).collect()
}

/// Post-event true-colour preview in reflectance units
pub fn optical_layer(optical: &Composite) -> FloodResult<MapLayer> {
    let mut bands = BTreeMap::new();
    for name in RGB_BANDS {
        let scaled = optical.band(name)?.map(|&dn| dn / REFLECTANCE_SCALE);
        bands.insert(name.to_string(), scaled);
    }
    Ok(MapLayer {
        name: "RGB - Sentinel-2".to_string(),
        data: LayerData::Rgb(Composite::new(bands, optical.source_count)),
        vis: VisParams {
            min: Some(0.0),
            max: Some(0.3),
            palette: Vec::new(),
        },
    })
}

/// Smoothed post-event backscatter of one polarization
pub fn backscatter_layer(post: &Raster<SarReal>, polarization: Polarization) -> MapLayer {
    MapLayer {
        name: format!("SAR {} - Post Flood", polarization),
        data: LayerData::Continuous(post.clone()),
        vis: VisParams {
            min: Some(-25.0),
            max: Some(0.0),
            palette: palette(&["white", "black"]),
        },
    }
}

pub fn flood_layer(flood_mask: &Raster<bool>) -> MapLayer {
    MapLayer {
        name: "Flood Mask".to_string(),
        data: LayerData::Mask(flood_mask.clone()),
        vis: VisParams {
            min: None,
            max: None,
            palette: palette(&["blue"]),
        },
    }
}

pub fn land_cover_layer(land_cover: &Raster<ClassCode>) -> MapLayer {
    MapLayer {
        name: "Land Cover".to_string(),
        data: LayerData::Categorical(land_cover.clone()),
        vis: VisParams {
            min: Some(10.0),
            max: Some(100.0),
            palette: palette(&LAND_COVER_PALETTE),
        },
    }
}
