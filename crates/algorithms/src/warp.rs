//! Nearest-neighbour warping between grids and CRSs
//!
//! Each target cell centre is transformed into the source CRS and takes the
//! value of the source cell containing it.

use ndarray::Array2;
use rayon::prelude::*;
use s2cuts_core::crs::{transform_bounds, CRS};
use s2cuts_core::raster::{GridSpec, Raster};
use s2cuts_core::{Error, Result};

/// Approximate length of one degree of latitude, in metres.
pub const METRES_PER_DEGREE: f64 = 111_320.0;

/// Resample `source` onto `grid` by nearest neighbour.
///
/// Cells that fall outside the source or on source nodata become NaN.
pub fn warp_nearest(source: &Raster<f32>, grid: &GridSpec) -> Result<Raster<f32>> {
    let src_crs = source.crs().copied().ok_or_else(|| Error::InvalidParameter {
        name: "source",
        value: "crs".into(),
        reason: "source raster has no CRS".into(),
    })?;
    let src_proj = src_crs.projection()?;
    let dst_proj = grid.crs.projection()?;

    let (src_rows, src_cols) = source.shape();
    let src_transform = *source.transform();
    let src = source.data();

    let data: Vec<f32> = (0..grid.rows)
        .into_par_iter()
        .flat_map_iter(|row| {
            (0..grid.cols).map(move |col| {
                let (x, y) = grid.pixel_center(row, col);
                let (sx, sy) = dst_proj.transform(&src_proj, x, y);
                let (fc, fr) = src_transform.geo_to_pixel(sx, sy);
                if !(fc >= 0.0 && fr >= 0.0) {
                    return f32::NAN;
                }
                let (c, r) = (fc.floor() as usize, fr.floor() as usize);
                if r >= src_rows || c >= src_cols {
                    return f32::NAN;
                }
                let v = src[(r, c)];
                if source.is_nodata(v) {
                    f32::NAN
                } else {
                    v
                }
            })
        })
        .collect();

    let array = Array2::from_shape_vec((grid.rows, grid.cols), data).map_err(|e| Error::Other(e.to_string()))?;
    let mut out = Raster::from_array(array);
    out.set_transform(grid.transform);
    out.set_crs(Some(grid.crs));
    out.set_nodata(Some(f32::NAN));
    Ok(out)
}

/// Grid in `target` covering the envelope of `source`.
///
/// Resolution is kept; when switching between metric and geographic CRSs it
/// is converted with [`METRES_PER_DEGREE`].
pub fn target_grid(source: &GridSpec, target: CRS) -> Result<GridSpec> {
    if source.crs == target {
        return Ok(*source);
    }
    let src_proj = source.crs.projection()?;
    let dst_proj = target.projection()?;

    let bounds = transform_bounds(&src_proj, &dst_proj, source.bounds());
    let resolution = match (source.crs.is_geographic(), target.is_geographic()) {
        (false, true) => source.resolution() / METRES_PER_DEGREE,
        (true, false) => source.resolution() * METRES_PER_DEGREE,
        _ => source.resolution(),
    };
    GridSpec::from_bounds(bounds, resolution, target)
}
