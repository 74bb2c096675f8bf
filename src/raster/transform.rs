use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

/// Affine map from (column, row) pixel space to frame coordinates, in GDAL order:
///
/// ```text
/// x = origin_x + col * pixel_width  + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// A north-up grid whose top-left corner is (`west`, `north`) with square-or-not cells
    /// of `cell_width` x `cell_height` (both positive).
    pub fn north_up(west: f64, north: f64, cell_width: f64, cell_height: f64) -> Self {
        Self {
            origin_x: west,
            pixel_width: cell_width,
            row_rotation: 0.0,
            origin_y: north,
            col_rotation: 0.0,
            pixel_height: -cell_height,
        }
    }

    #[inline]
    pub fn apply(&self, col: f64, row: f64) -> Coord<f64> {
        Coord {
            x: self.origin_x + col * self.pixel_width + row * self.row_rotation,
            y: self.origin_y + col * self.col_rotation + row * self.pixel_height,
        }
    }

    /// Frame coordinates of the center of cell (`row`, `col`).
    #[inline]
    pub fn cell_center(&self, row: usize, col: usize) -> Coord<f64> {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Axis-aligned footprint of cell (`row`, `col`).
    pub fn cell_rect(&self, row: usize, col: usize) -> Rect<f64> {
        let (r, c) = (row as f64, col as f64);
        let a = self.apply(c, r);
        let b = self.apply(c + 1.0, r + 1.0);
        Rect::new(a, b)
    }

    pub fn is_rotated(&self) -> bool {
        self.row_rotation != 0.0 || self.col_rotation != 0.0
    }

    pub fn inverse(&self) -> Option<InverseTransform> {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        Some(InverseTransform { forward: *self, det })
    }

    /// Equality within `tol` on every coefficient.
    pub fn approx_eq(&self, other: &GeoTransform, tol: f64) -> bool {
        let a = [self.origin_x, self.pixel_width, self.row_rotation, self.origin_y, self.col_rotation, self.pixel_height];
        let b = [other.origin_x, other.pixel_width, other.row_rotation, other.origin_y, other.col_rotation, other.pixel_height];
        a.iter().zip(b).all(|(x, y)| (x - y).abs() <= tol)
    }
}

/// Frame coordinates back to fractional (column, row).
#[derive(Debug, Clone, Copy)]
pub struct InverseTransform {
    forward: GeoTransform,
    det: f64,
}

impl InverseTransform {
    #[inline]
    pub fn pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let t = &self.forward;
        let dx = x - t.origin_x;
        let dy = y - t.origin_y;
        let col = (dx * t.pixel_height - dy * t.row_rotation) / self.det;
        let row = (dy * t.pixel_width - dx * t.col_rotation) / self.det;
        (col, row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn cell_centers_of_north_up_grid() {
        let t = GeoTransform::north_up(10.0, 50.0, 0.5, 0.25);
        let c = t.cell_center(0, 0);
        assert_abs_diff_eq!(c.x, 10.25);
        assert_abs_diff_eq!(c.y, 49.875);

        let c = t.cell_center(3, 2);
        assert_abs_diff_eq!(c.x, 11.25);
        assert_abs_diff_eq!(c.y, 49.125);
    }

    #[test]
    fn inverse_undoes_forward_with_rotation() {
        let t = GeoTransform {
            origin_x: 100.0, pixel_width: 2.0, row_rotation: 0.3,
            origin_y: 200.0, col_rotation: -0.2, pixel_height: -2.5,
        };
        let inv = t.inverse().unwrap();
        let p = t.apply(7.25, 3.5);
        let (col, row) = inv.pixel(p.x, p.y);
        assert_abs_diff_eq!(col, 7.25, epsilon = 1e-9);
        assert_abs_diff_eq!(row, 3.5, epsilon = 1e-9);
    }

    #[test]
    fn degenerate_transform_has_no_inverse() {
        let t = GeoTransform::north_up(0.0, 0.0, 0.0, 1.0);
        assert!(t.inverse().is_none());
    }
}
