#![allow(dead_code)]

use std::{collections::HashMap, path::Path, sync::Mutex};

use anyhow::{anyhow, Result};
use ndarray::Array2;
use soilbase::{Crs, Fetch, GeoTransform, RasterLayer};

/// Serves fixed bodies by URL and records every request.
#[derive(Default)]
pub struct MapFetcher {
    bodies: HashMap<String, Vec<u8>>,
    pub calls: Mutex<Vec<String>>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(url.to_string(), body.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Fetch for MapFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push(url.to_string());
        self.bodies.get(url).cloned().ok_or_else(|| anyhow!("404 for {url}"))
    }
}

/// A north-up EPSG:4326 layer with the given cells.
pub fn layer(cells: Array2<Option<f64>>, west: f64, north: f64, cell: f64) -> RasterLayer {
    RasterLayer::new("test", cells, Crs::WGS84, GeoTransform::north_up(west, north, cell, cell))
}

/// GeoTIFF bytes of `layer`.
pub fn geotiff_bytes(layer: &RasterLayer) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layer.tif");
    layer.write_geotiff(&path).unwrap();
    std::fs::read(&path).unwrap()
}

pub fn write_layer(path: &Path, layer: &RasterLayer) {
    layer.write_geotiff(path).unwrap();
}

/// A closed square ring as GeoJSON coordinates.
pub fn square_ring(x: f64, y: f64, size: f64) -> serde_json::Value {
    serde_json::json!([[[x, y], [x + size, y], [x + size, y + size], [x, y + size], [x, y]]])
}
