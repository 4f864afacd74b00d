//! Tile grid math for COG files.
//!
//! Maps map-space extents to pixel windows and pixel windows to the tiles
//! that hold them.

use s2cuts_core::raster::GeoTransform;

/// A rectangular pixel window within one IFD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub cols: usize,
    pub rows: usize,
}

impl PixelWindow {
    pub fn new(col_off: usize, row_off: usize, cols: usize, rows: usize) -> Self {
        Self {
            col_off,
            row_off,
            cols,
            rows,
        }
    }

    /// Window of pixels touched by map extent `bounds`, grown by `pad`
    /// pixels on every side and clamped to the image. `None` if the extent
    /// misses the image.
    pub fn from_bounds(
        bounds: (f64, f64, f64, f64),
        geo_transform: &GeoTransform,
        image_width: u32,
        image_height: u32,
        pad: usize,
    ) -> Option<Self> {
        let (min_x, min_y, max_x, max_y) = bounds;
        let (col_a, row_a) = geo_transform.geo_to_pixel(min_x, max_y);
        let (col_b, row_b) = geo_transform.geo_to_pixel(max_x, min_y);
        if !(col_a.is_finite() && col_b.is_finite() && row_a.is_finite() && row_b.is_finite()) {
            return None;
        }

        let pad = pad as f64;
        let clamp = |v: f64, max: u32| v.max(0.0).min(max as f64) as usize;
        let min_col = clamp(col_a.min(col_b).floor() - pad, image_width);
        let max_col = clamp(col_a.max(col_b).ceil() + pad, image_width);
        let min_row = clamp(row_a.min(row_b).floor() - pad, image_height);
        let max_row = clamp(row_a.max(row_b).ceil() + pad, image_height);

        if min_col >= max_col || min_row >= max_row {
            return None;
        }
        Some(Self::new(min_col, min_row, max_col - min_col, max_row - min_row))
    }

    pub fn end_col(&self) -> usize {
        self.col_off + self.cols
    }

    pub fn end_row(&self) -> usize {
        self.row_off + self.rows
    }
}

/// Descriptor for a tile that needs to be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRequest {
    /// Linear tile index in the TIFF tile array.
    pub tile_idx: usize,
    pub tile_col: usize,
    pub tile_row: usize,
}

/// Tiles of a `tile_width` x `tile_height` grid overlapping `window`,
/// in row-major order.
pub fn tiles_for_window(
    window: &PixelWindow,
    image_width: u32,
    image_height: u32,
    tile_width: u32,
    tile_height: u32,
) -> Vec<TileRequest> {
    let tw = tile_width.max(1) as usize;
    let th = tile_height.max(1) as usize;
    let tiles_across = (image_width as usize).div_ceil(tw);
    let tiles_down = (image_height as usize).div_ceil(th);

    let col_range = window.col_off / tw..window.end_col().div_ceil(tw).min(tiles_across);
    let row_range = window.row_off / th..window.end_row().div_ceil(th).min(tiles_down);

    row_range
        .flat_map(|tile_row| {
            col_range.clone().map(move |tile_col| TileRequest {
                tile_idx: tile_row * tiles_across + tile_col,
                tile_col,
                tile_row,
            })
        })
        .collect()
}

/// Pick the coarsest IFD whose pixel size does not exceed `target_resolution`.
///
/// `ifd_widths` lists the width of every IFD, full resolution first;
/// `full_resolution` is the pixel size of IFD 0 in map units.
pub fn select_overview(ifd_widths: &[u32], full_resolution: f64, target_resolution: f64) -> usize {
    let Some(&full_width) = ifd_widths.first() else {
        return 0;
    };
    if !(target_resolution > full_resolution) {
        return 0;
    }

    ifd_widths
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, &w)| w > 0)
        .take_while(|(_, &w)| {
            let resolution = full_resolution * full_width as f64 / w as f64;
            resolution <= target_resolution * (1.0 + 1e-6)
        })
        .map(|(i, _)| i)
        .last()
        .unwrap_or(0)
}
