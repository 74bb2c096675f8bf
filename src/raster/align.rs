use ndarray::Array2;
use tracing::debug;

use crate::error::{Error, Result};
use crate::geom::CrsTransform;
use crate::raster::RasterLayer;

const TRANSFORM_TOLERANCE: f64 = 1e-9;

/// True when `candidate` already shares the reference's frame, transform and shape.
pub fn same_grid(reference: &RasterLayer, candidate: &RasterLayer) -> bool {
    reference.crs == candidate.crs
        && reference.transform.approx_eq(&candidate.transform, TRANSFORM_TOLERANCE)
        && reference.grid.dim() == candidate.grid.dim()
}

/// Resample `candidate` onto the grid of `reference` (nearest neighbour).
///
/// Each reference cell center is carried into the candidate's frame and looked up
/// in the candidate grid. Centers falling outside the candidate, or that cannot
/// be transformed, are absent in the result.
pub fn align_to_reference(reference: &RasterLayer, candidate: &RasterLayer) -> Result<Array2<Option<f64>>> {
    if same_grid(reference, candidate) {
        return Ok(candidate.grid.clone());
    }

    let alignment_error = |reason: String| Error::GridAlignment {
        layer: candidate.depth_label.clone().unwrap_or_else(|| candidate.source_location.clone()),
        reason,
    };

    let inverse = candidate.transform.inverse()
        .ok_or_else(|| alignment_error("candidate transform is not invertible".into()))?;

    let reproject = if reference.crs != candidate.crs {
        Some(CrsTransform::new(&reference.crs, &candidate.crs)
            .map_err(|e| alignment_error(format!("{e:#}")))?)
    } else {
        None
    };

    debug!(
        from = %candidate.crs, to = %reference.crs,
        rows = reference.rows(), cols = reference.cols(),
        "resampling layer onto reference grid"
    );

    let (rows, cols) = (candidate.rows() as f64, candidate.cols() as f64);
    let aligned = Array2::from_shape_fn(reference.grid.dim(), |(row, col)| {
        let center = reference.transform.cell_center(row, col);
        let (x, y) = match &reproject {
            Some(t) => t.apply(center.x, center.y).ok()?,
            None => (center.x, center.y),
        };
        let (c, r) = inverse.pixel(x, y);
        if !(0.0..cols).contains(&c) || !(0.0..rows).contains(&r) {
            return None;
        }
        candidate.get(r.floor() as usize, c.floor() as usize)
    });

    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Crs;
    use crate::raster::GeoTransform;
    use ndarray::array;

    fn layer(grid: Array2<Option<f64>>, transform: GeoTransform) -> RasterLayer {
        RasterLayer::new("x", grid, Crs::WGS84, transform)
    }

    #[test]
    fn identical_grids_pass_through() {
        let t = GeoTransform::north_up(0.0, 2.0, 1.0, 1.0);
        let reference = layer(array![[Some(1.0), Some(2.0)], [Some(3.0), None]], t);
        let candidate = layer(array![[Some(5.0), None], [Some(7.0), Some(8.0)]], t);
        assert_eq!(align_to_reference(&reference, &candidate).unwrap(), candidate.grid);
    }

    #[test]
    fn coarser_candidate_is_sampled_at_reference_centers() {
        // reference: 4x4 cells of 0.5 deg; candidate: 2x2 cells of 1 deg over the same extent
        let reference = layer(Array2::from_elem((4, 4), Some(0.0)), GeoTransform::north_up(0.0, 2.0, 0.5, 0.5));
        let candidate = layer(array![[Some(1.0), Some(2.0)], [Some(3.0), None]], GeoTransform::north_up(0.0, 2.0, 1.0, 1.0));

        let aligned = align_to_reference(&reference, &candidate).unwrap();
        assert_eq!(aligned[[0, 0]], Some(1.0));
        assert_eq!(aligned[[1, 1]], Some(1.0));
        assert_eq!(aligned[[0, 3]], Some(2.0));
        assert_eq!(aligned[[3, 0]], Some(3.0));
        assert_eq!(aligned[[3, 3]], None);
    }

    #[test]
    fn shifted_candidate_leaves_uncovered_cells_absent() {
        let reference = layer(Array2::from_elem((1, 3), Some(0.0)), GeoTransform::north_up(0.0, 1.0, 1.0, 1.0));
        let candidate = layer(array![[Some(9.0), Some(8.0)]], GeoTransform::north_up(1.0, 1.0, 1.0, 1.0));

        let aligned = align_to_reference(&reference, &candidate).unwrap();
        assert_eq!(aligned, array![[None, Some(9.0), Some(8.0)]]);
    }

    #[test]
    fn reprojected_candidate_lines_up_with_geographic_reference() {
        // candidate in web mercator covering roughly lon 0..2, lat 0..2
        let fwd = CrsTransform::new(&Crs::WGS84, &Crs::Epsg(3857)).unwrap();
        let (x0, y0) = fwd.apply(0.0, 2.0).unwrap();
        let (x1, y1) = fwd.apply(2.0, 0.0).unwrap();
        let mut candidate = RasterLayer::new(
            "merc",
            array![[Some(1.0), Some(2.0)], [Some(3.0), Some(4.0)]],
            Crs::Epsg(3857),
            GeoTransform::north_up(x0, y0, (x1 - x0) / 2.0, (y0 - y1) / 2.0),
        );
        candidate.depth_label = Some("5-15cm".into());

        let reference = layer(Array2::from_elem((2, 2), Some(0.0)), GeoTransform::north_up(0.0, 2.0, 1.0, 1.0));
        let aligned = align_to_reference(&reference, &candidate).unwrap();
        assert_eq!(aligned, array![[Some(1.0), Some(2.0)], [Some(3.0), Some(4.0)]]);
    }

    #[test]
    fn unknown_frame_is_an_alignment_error() {
        let reference = layer(Array2::from_elem((1, 1), Some(0.0)), GeoTransform::north_up(0.0, 1.0, 1.0, 1.0));
        let mut candidate = layer(array![[Some(1.0)]], GeoTransform::north_up(0.0, 1.0, 1.0, 1.0));
        candidate.crs = Crs::Epsg(2154);
        candidate.depth_label = Some("15-30cm".into());

        match align_to_reference(&reference, &candidate) {
            Err(Error::GridAlignment { layer, .. }) => assert_eq!(layer, "15-30cm"),
            other => panic!("expected GridAlignment, got {other:?}"),
        }
    }
}
