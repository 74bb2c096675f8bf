use tempfile::Builder;
use tracing::debug;

use crate::boundary::CountryPolygon;
use crate::error::{Error, Result};
use crate::raster::RasterLayer;
use crate::zonal::{zonal_means, ZonalOptions, ZonalResult};

/// Zonal means computed from a temporary GeoTIFF copy of `raster`.
///
/// The file is owned by a guard and removed however this function returns,
/// including when decoding or statistics fail.
pub fn zonal_means_materialized<'a>(
    raster: &RasterLayer,
    polygons: impl IntoIterator<Item = &'a CountryPolygon>,
    options: ZonalOptions,
) -> Result<Vec<ZonalResult>> {
    let failure = |e: anyhow::Error| Error::ZonalComputation {
        variable: raster.name.clone(),
        reason: format!("{e:#}"),
    };

    let scratch = Builder::new()
        .prefix(&format!("soilbase_{}_", raster.name))
        .suffix(".tif")
        .tempfile()
        .map_err(|e| failure(e.into()))?;
    debug!(path = %scratch.path().display(), "materializing composite");

    raster.write_geotiff(scratch.path()).map_err(failure)?;
    let mut reloaded = RasterLayer::read_geotiff(scratch.path()).map_err(failure)?;
    reloaded.name = raster.name.clone();
    reloaded.variable_key = raster.variable_key.clone();

    zonal_means(&reloaded, polygons, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Crs;
    use crate::raster::GeoTransform;
    use geo::{polygon, MultiPolygon};
    use ndarray::array;

    fn scratch_files(name: &str) -> usize {
        let prefix = format!("soilbase_{name}_");
        std::fs::read_dir(std::env::temp_dir()).unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
            .count()
    }

    #[test]
    fn materialized_statistics_match_in_memory_and_leave_no_file() {
        let layer = RasterLayer::new(
            "mat_ok",
            array![[Some(1.0), Some(2.0)], [None, Some(4.0)]],
            Crs::WGS84,
            GeoTransform::north_up(0.0, 2.0, 1.0, 1.0),
        );
        let zone = CountryPolygon {
            country_code: "AT".into(),
            geometry: MultiPolygon(vec![polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0)]]),
        };

        let before = scratch_files("mat_ok");
        let direct = zonal_means(&layer, [&zone], ZonalOptions::default()).unwrap();
        let materialized = zonal_means_materialized(&layer, [&zone], ZonalOptions::default()).unwrap();
        assert_eq!(direct, materialized);
        assert_eq!(materialized[0].mean_value, Some(7.0 / 3.0));
        assert_eq!(scratch_files("mat_ok"), before);
    }

    #[test]
    fn failure_is_a_zonal_error_and_still_cleans_up() {
        let mut layer = RasterLayer::new(
            "mat_fail",
            array![[Some(1.0)]],
            Crs::WGS84,
            GeoTransform::north_up(0.0, 1.0, 1.0, 1.0),
        );
        // a degenerate transform survives the file round trip but cannot be inverted
        layer.transform.pixel_width = 0.0;

        let before = scratch_files("mat_fail");
        let err = zonal_means_materialized(&layer, [], ZonalOptions::default()).unwrap_err();
        assert!(matches!(err, Error::ZonalComputation { ref variable, .. } if variable == "mat_fail"));
        assert_eq!(scratch_files("mat_fail"), before);
    }
}
