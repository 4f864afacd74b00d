//! Target pixel grid description

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::GeoTransform;
use serde::{Deserialize, Serialize};

/// A north-up pixel grid in a given CRS: where rasters are resampled to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
    pub crs: CRS,
}

impl GridSpec {
    pub fn new(transform: GeoTransform, rows: usize, cols: usize, crs: CRS) -> Self {
        Self {
            transform,
            rows,
            cols,
            crs,
        }
    }

    /// Grid covering `bounds` (min_x, min_y, max_x, max_y) at `resolution`,
    /// with the extent snapped outward to multiples of the resolution.
    pub fn from_bounds(bounds: (f64, f64, f64, f64), resolution: f64, crs: CRS) -> Result<Self> {
        let (min_x, min_y, max_x, max_y) = bounds;
        if !(resolution > 0.0 && resolution.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "resolution",
                value: resolution.to_string(),
                reason: "must be positive".into(),
            });
        }
        if !(min_x <= max_x && min_y <= max_y) || ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "bounds",
                value: format!("{bounds:?}"),
                reason: "min must not exceed max".into(),
            });
        }

        let x0 = (min_x / resolution).floor() * resolution;
        let y0 = (min_y / resolution).floor() * resolution;
        let x1 = (max_x / resolution).ceil() * resolution;
        let y1 = (max_y / resolution).ceil() * resolution;

        let cols = (((x1 - x0) / resolution).round() as usize).max(1);
        let rows = (((y1 - y0) / resolution).round() as usize).max(1);

        Ok(Self {
            transform: GeoTransform::new(x0, y0 + rows as f64 * resolution, resolution, -resolution),
            rows,
            cols,
            crs,
        })
    }

    /// Pixel size along X
    pub fn resolution(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Map bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols, self.rows)
    }

    /// Map coordinates of the center of cell (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn snaps_outward() {
        let grid = GridSpec::from_bounds(
            (600_005.0, 4_999_990.0, 600_995.0, 5_001_010.0),
            20.0,
            CRS::from_epsg(32632),
        )
        .unwrap();

        let (min_x, min_y, max_x, max_y) = grid.bounds();
        assert_relative_eq!(min_x, 600_000.0);
        assert_relative_eq!(max_x, 601_000.0);
        assert_relative_eq!(min_y, 4_999_980.0);
        assert_relative_eq!(max_y, 5_001_020.0);
        assert_eq!(grid.cols, 50);
        assert_eq!(grid.rows, 52);
        assert_relative_eq!(grid.resolution(), 20.0);
    }

    #[test]
    fn pixel_center_offsets_half_cell() {
        let grid = GridSpec::from_bounds((0.0, 0.0, 100.0, 100.0), 10.0, CRS::from_epsg(3857)).unwrap();
        let (x, y) = grid.pixel_center(0, 0);
        assert_relative_eq!(x, 5.0);
        assert_relative_eq!(y, 95.0);
    }

    #[test]
    fn rejects_bad_input() {
        let crs = CRS::wgs84();
        assert!(GridSpec::from_bounds((0.0, 0.0, 1.0, 1.0), 0.0, crs).is_err());
        assert!(GridSpec::from_bounds((1.0, 0.0, 0.0, 1.0), 0.1, crs).is_err());
    }
}
