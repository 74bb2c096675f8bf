use std::{fs::File, io::{BufWriter, Cursor, Write}, path::Path};

use anyhow::{Context, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::common::ensure_parent_exists;
use crate::geom::Crs;
use crate::io::{decode_geotiff, encode_geotiff, DecodedRaster};
use crate::raster::GeoTransform;

/// Thickness of one depth interval, used as its weight in a composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthWeight {
    pub depth_label: String,
    pub thickness: f64,
}

impl DepthWeight {
    pub fn new(depth_label: impl Into<String>, thickness: f64) -> Self {
        Self { depth_label: depth_label.into(), thickness }
    }
}

/// A single-band raster whose cells are either a measurement or absent.
#[derive(Debug, Clone)]
pub struct RasterLayer {
    /// Derived name, used downstream for column naming.
    pub name: String,
    pub variable_key: String,
    pub depth_label: Option<String>,
    pub source_location: String,
    /// Cells indexed `[row, col]`; `None` marks no-data.
    pub grid: Array2<Option<f64>>,
    pub crs: Crs,
    pub transform: GeoTransform,
    /// No-data value declared by the source, if any.
    pub no_data: Option<f64>,
}

/// Mask a raw sample: non-finite values and the declared no-data value are absent.
#[inline]
pub(crate) fn mask_value(value: f64, no_data: Option<f64>) -> Option<f64> {
    if !value.is_finite() || no_data.is_some_and(|nd| value == nd) {
        None
    } else {
        Some(value)
    }
}

impl RasterLayer {
    /// Build a layer from an already-masked grid.
    pub fn new(name: impl Into<String>, grid: Array2<Option<f64>>, crs: Crs, transform: GeoTransform) -> Self {
        let name = name.into();
        Self {
            variable_key: name.clone(),
            name,
            depth_label: None,
            source_location: String::new(),
            grid,
            crs,
            transform,
            no_data: None,
        }
    }

    fn from_decoded(decoded: DecodedRaster, location: &str) -> Result<Self> {
        let DecodedRaster { width, height, values, transform, crs, no_data } = decoded;
        let crs = crs.unwrap_or_else(|| {
            warn!(location, "raster declares no geographic frame, assuming EPSG:4326");
            Crs::WGS84
        });
        let masked = values.into_iter().map(|v| mask_value(v, no_data)).collect();
        let grid = Array2::from_shape_vec((height, width), masked)
            .context("[raster::layer] grid shape mismatch")?;
        Ok(Self {
            name: String::new(),
            variable_key: String::new(),
            depth_label: None,
            source_location: location.to_string(),
            grid,
            crs,
            transform,
            no_data,
        })
    }

    /// Decode GeoTIFF bytes fetched from `location`.
    pub fn from_geotiff_bytes(bytes: Vec<u8>, location: &str) -> Result<Self> {
        let decoded = decode_geotiff(Cursor::new(bytes))
            .with_context(|| format!("[raster::layer] Failed to decode {location}"))?;
        Self::from_decoded(decoded, location)
    }

    /// Read a GeoTIFF from disk.
    pub fn read_geotiff(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("[raster::layer] Failed to open {}", path.display()))?;
        let decoded = decode_geotiff(std::io::BufReader::new(file))
            .with_context(|| format!("[raster::layer] Failed to decode {}", path.display()))?;
        Self::from_decoded(decoded, &path.to_string_lossy())
    }

    /// Write as a 64-bit float GeoTIFF; absent cells become NaN.
    pub fn write_geotiff(&self, path: &Path) -> Result<()> {
        ensure_parent_exists(path)?;
        let file = File::create(path)
            .with_context(|| format!("[raster::layer] Failed to create {}", path.display()))?;
        let values: Vec<f64> = self.grid.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        let mut out = BufWriter::new(file);
        encode_geotiff(&mut out, self.cols(), self.rows(), &values, &self.transform, &self.crs)
            .with_context(|| format!("[raster::layer] Failed to write {}", path.display()))?;
        out.flush().with_context(|| format!("[raster::layer] Failed to flush {}", path.display()))
    }

    #[inline] pub fn rows(&self) -> usize { self.grid.nrows() }

    #[inline] pub fn cols(&self) -> usize { self.grid.ncols() }

    #[inline] pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.grid.get((row, col)).copied().flatten()
    }

    /// Number of cells holding a measurement.
    pub fn defined_count(&self) -> usize {
        self.grid.iter().filter(|v| v.is_some()).count()
    }

    /// Multiply every defined cell by `factor`.
    pub fn scale(&mut self, factor: f64) {
        if factor != 1.0 {
            self.grid.mapv_inplace(|v| v.map(|x| x * factor));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn masking_distinguishes_zero_from_absent() {
        assert_eq!(mask_value(0.0, None), Some(0.0));
        assert_eq!(mask_value(0.0, Some(-32768.0)), Some(0.0));
        assert_eq!(mask_value(-32768.0, Some(-32768.0)), None);
        assert_eq!(mask_value(f64::NAN, None), None);
        assert_eq!(mask_value(f64::INFINITY, Some(f64::NAN)), None);
    }

    #[test]
    fn geotiff_file_round_trip_keeps_absent_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layer.tif");

        let grid = array![[Some(1.0), None], [Some(0.0), Some(42.5)]];
        let layer = RasterLayer::new("ph_h2o_0_30cm", grid.clone(), Crs::WGS84, GeoTransform::north_up(5.0, 50.0, 0.5, 0.5));
        layer.write_geotiff(&path).unwrap();

        let back = RasterLayer::read_geotiff(&path).unwrap();
        assert_eq!(back.grid, grid);
        assert_eq!(back.crs, Crs::WGS84);
        assert!(back.transform.approx_eq(&layer.transform, 1e-12));
        assert_eq!(back.defined_count(), 3);
    }

    #[test]
    fn user_defined_projection_is_not_read_as_degrees() {
        use crate::io::encode_geotiff_with_keys;

        // projected, ProjectedCSType user-defined, geographic datum WGS84, no citation
        let directory = [1, 1, 0, 4, 1024, 0, 1, 1, 1025, 0, 1, 1, 2048, 0, 1, 4326, 3072, 0, 1, 32767];
        let t = GeoTransform::north_up(1_000_000.0, 5_000_000.0, 250.0, 250.0);
        let mut buf = Cursor::new(Vec::new());
        encode_geotiff_with_keys(&mut buf, 2, 2, &[7.0; 4], &t, &directory, None).unwrap();

        assert!(RasterLayer::from_geotiff_bytes(buf.into_inner(), "igh.tif").is_err());
    }

    #[test]
    fn homolosine_layer_keeps_its_frame_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("igh.tif");
        let layer = RasterLayer::new(
            "soc_0_5cm", array![[Some(1.0), Some(2.0)]], Crs::homolosine(),
            GeoTransform::north_up(1_000_000.0, 5_000_000.0, 250.0, 250.0),
        );
        layer.write_geotiff(&path).unwrap();
        assert_eq!(RasterLayer::read_geotiff(&path).unwrap().crs, Crs::homolosine());
    }

    #[test]
    fn scaling_leaves_absent_cells_absent() {
        let mut layer = RasterLayer::new("x", array![[Some(65.0), None]], Crs::WGS84, GeoTransform::north_up(0.0, 1.0, 1.0, 1.0));
        layer.scale(0.5);
        assert_eq!(layer.get(0, 0), Some(32.5));
        assert_eq!(layer.get(0, 1), None);
        assert_eq!(layer.get(5, 5), None);
    }
}
