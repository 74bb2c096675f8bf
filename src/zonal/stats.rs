use geo::{BoundingRect, Coord, Intersects, LineString, MapCoords, MultiPolygon, Rect};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::boundary::CountryPolygon;
use crate::error::{Error, Result};
use crate::geom::{Crs, CrsTransform};
use crate::raster::{InverseTransform, RasterLayer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZonalOptions {
    /// Include every cell whose footprint intersects the polygon, not only
    /// cells whose center lies strictly inside it.
    pub all_touched: bool,
}

/// Mean of one variable over one country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonalResult {
    pub country_code: String,
    pub variable_key: String,
    /// Absent when no defined cell falls in the zone.
    pub mean_value: Option<f64>,
    /// Defined cells that contributed.
    pub cell_count: usize,
}

/// Arithmetic mean of defined cells per polygon, in polygon order.
///
/// Polygons are expected in EPSG:4326 and are carried into the raster's frame,
/// then into pixel space, where cells are selected by scanline over their centers.
pub fn zonal_means<'a>(
    raster: &RasterLayer,
    polygons: impl IntoIterator<Item = &'a CountryPolygon>,
    options: ZonalOptions,
) -> Result<Vec<ZonalResult>> {
    let failure = |reason: String| Error::ZonalComputation { variable: raster.name.clone(), reason };

    let inverse = raster.transform.inverse()
        .ok_or_else(|| failure("raster transform is not invertible".into()))?;
    let to_raster = if raster.crs != Crs::WGS84 {
        Some(CrsTransform::new(&Crs::WGS84, &raster.crs).map_err(|e| failure(format!("{e:#}")))?)
    } else {
        None
    };

    let mut results = Vec::new();
    for polygon in polygons {
        let pixels = to_pixel_space(&polygon.geometry, &inverse, to_raster.as_ref())
            .map_err(|e| failure(format!("{}: {e:#}", polygon.country_code)))?;

        let cells = if options.all_touched {
            touched_cells(&pixels, raster.rows(), raster.cols())
        } else {
            center_cells(&pixels, raster.rows(), raster.cols())
        };

        let (sum, count) = cells.into_iter()
            .filter_map(|(row, col)| raster.get(row, col))
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        let mean_value = (count > 0).then(|| sum / count as f64);

        debug!(code = %polygon.country_code, variable = %raster.name, cells = count, "zonal mean");
        results.push(ZonalResult {
            country_code: polygon.country_code.clone(),
            variable_key: raster.name.clone(),
            mean_value,
            cell_count: count,
        });
    }
    Ok(results)
}

/// Map geographic coordinates to fractional (column, row).
fn to_pixel_space(
    geometry: &MultiPolygon<f64>,
    inverse: &InverseTransform,
    to_raster: Option<&CrsTransform>,
) -> anyhow::Result<MultiPolygon<f64>> {
    geometry.try_map_coords(|c: Coord<f64>| {
        let (x, y) = match to_raster {
            Some(t) => t.apply(c.x, c.y)?,
            None => (c.x, c.y),
        };
        let (col, row) = inverse.pixel(x, y);
        Ok(Coord { x: col, y: row })
    })
}

fn rings(mp: &MultiPolygon<f64>) -> impl Iterator<Item = &LineString<f64>> {
    mp.0.iter().flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
}

/// Clamp a fractional pixel range to `0..len`.
fn span(min: f64, max: f64, len: usize) -> std::ops::Range<usize> {
    let lo = min.floor().max(0.0) as usize;
    let hi = (max.ceil().max(0.0) as usize).min(len);
    lo.min(hi)..hi
}

/// Cells whose center lies strictly inside `mp` (even-odd rule, so holes are excluded).
///
/// Centers on a ring are outside: crossings are compared strictly, and centers
/// on a horizontal edge at the scanline are dropped.
fn center_cells(mp: &MultiPolygon<f64>, rows: usize, cols: usize) -> Vec<(usize, usize)> {
    let Some(bounds) = mp.bounding_rect() else { return Vec::new() };
    let mut cells = Vec::new();
    let mut crossings = Vec::new();
    let mut on_edge = Vec::new();

    for row in span(bounds.min().y, bounds.max().y, rows) {
        let y = row as f64 + 0.5;
        crossings.clear();
        on_edge.clear();
        for ring in rings(mp) {
            for line in ring.lines() {
                let (a, b) = (line.start, line.end);
                if a.y == y && b.y == y {
                    on_edge.push((a.x.min(b.x), a.x.max(b.x)));
                } else if (a.y > y) != (b.y > y) {
                    crossings.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
                }
            }
        }
        crossings.sort_by(f64::total_cmp);
        let boundary = |col: usize| {
            let x = col as f64 + 0.5;
            on_edge.iter().any(|&(x0, x1)| x0 <= x && x <= x1)
        };

        for pair in crossings.chunks_exact(2) {
            // centers c + 0.5 with x0 < c + 0.5 < x1
            let first = (pair[0] - 0.5).floor() + 1.0;
            let last = (pair[1] - 0.5).ceil() - 1.0;
            if last < 0.0 || first > last {
                continue;
            }
            let first = first.max(0.0) as usize;
            let last = (last as usize).min(cols.saturating_sub(1));
            if first >= cols {
                continue;
            }
            cells.extend((first..=last).filter(|&col| !boundary(col)).map(|col| (row, col)));
        }
    }
    cells
}

/// Cells whose unit footprint intersects `mp`.
fn touched_cells(mp: &MultiPolygon<f64>, rows: usize, cols: usize) -> Vec<(usize, usize)> {
    let Some(bounds) = mp.bounding_rect() else { return Vec::new() };
    let col_span = span(bounds.min().x, bounds.max().x, cols);
    span(bounds.min().y, bounds.max().y, rows)
        .flat_map(|row| col_span.clone().map(move |col| (row, col)))
        .filter(|&(row, col)| {
            let (r, c) = (row as f64, col as f64);
            Rect::new(Coord { x: c, y: r }, Coord { x: c + 1.0, y: r + 1.0 }).intersects(mp)
        })
        .collect()
}
