//! Spectral vegetation indices
//!
//! Indices operate on single-band reflectance rasters sharing one grid.

use ndarray::Array2;
use rayon::prelude::*;
use s2cuts_core::raster::Raster;
use s2cuts_core::{Algorithm, Error, Result};

// ---------------------------------------------------------------------------
// Generic normalized difference
// ---------------------------------------------------------------------------

/// Compute the normalized difference between two bands:
///
/// `(band_a - band_b) / (band_a + band_b)`
///
/// Result is in the range [-1, 1]. Pixels where the sum is zero or either
/// band is nodata are set to NaN.
pub fn normalized_difference(band_a: &Raster<f32>, band_b: &Raster<f32>) -> Result<Raster<f32>> {
    check_dimensions(band_a, band_b)?;

    let (rows, cols) = band_a.shape();
    let a = band_a.data();
    let b = band_b.data();

    let data: Vec<f32> = (0..rows)
        .into_par_iter()
        .flat_map_iter(|row| {
            (0..cols).map(move |col| {
                let va = a[(row, col)];
                let vb = b[(row, col)];
                if band_a.is_nodata(va) || band_b.is_nodata(vb) {
                    return f32::NAN;
                }
                let sum = va + vb;
                if sum.abs() < 1e-10 {
                    return f32::NAN;
                }
                (va - vb) / sum
            })
        })
        .collect();

    build_output(band_a, rows, cols, data)
}

// ---------------------------------------------------------------------------
// NDVI
// ---------------------------------------------------------------------------

/// Normalized Difference Vegetation Index
///
/// `NDVI = (NIR - Red) / (NIR + Red)`, with NIR = B08 and Red = B04.
///
/// Values range from -1 to 1:
/// - Dense vegetation: 0.6 to 0.9
/// - Sparse vegetation: 0.2 to 0.5
/// - Bare soil: 0.1 to 0.2
/// - Water/clouds: -1.0 to 0.0
pub fn ndvi(nir: &Raster<f32>, red: &Raster<f32>) -> Result<Raster<f32>> {
    normalized_difference(nir, red)
}

/// NDVI algorithm; input is `(nir, red)`.
#[derive(Debug, Clone, Default)]
pub struct Ndvi;

impl Algorithm for Ndvi {
    type Input = (Raster<f32>, Raster<f32>);
    type Output = Raster<f32>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "NDVI"
    }

    fn description(&self) -> &'static str {
        "Normalized difference of near-infrared (B08) and red (B04) reflectance"
    }

    fn execute(&self, input: Self::Input, _params: ()) -> Result<Raster<f32>> {
        ndvi(&input.0, &input.1)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn check_dimensions(a: &Raster<f32>, b: &Raster<f32>) -> Result<()> {
    let (er, ec) = a.shape();
    let (ar, ac) = b.shape();
    if (er, ec) != (ar, ac) {
        return Err(Error::SizeMismatch { er, ec, ar, ac });
    }
    Ok(())
}

fn build_output(template: &Raster<f32>, rows: usize, cols: usize, data: Vec<f32>) -> Result<Raster<f32>> {
    let array = Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    let mut output = Raster::from_array(array).with_meta_of(template);
    output.set_nodata(Some(f32::NAN));
    Ok(output)
}
