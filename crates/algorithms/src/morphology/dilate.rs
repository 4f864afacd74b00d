//! Binary dilation
//!
//! A cell becomes set if any cell under the structuring element is set.

use ndarray::Array2;
use rayon::prelude::*;
use s2cuts_core::{Error, Result};

use super::element::StructuringElement;
use super::erode::neighbor;

pub fn dilate(mask: &Array2<bool>, element: &StructuringElement) -> Result<Array2<bool>> {
    element.validate()?;
    let (rows, cols) = mask.dim();
    let offsets = element.offsets();

    let data: Vec<bool> = (0..rows)
        .into_par_iter()
        .flat_map_iter(|row| {
            let offsets = &offsets;
            (0..cols).map(move |col| {
                offsets.iter().any(|&(dr, dc)| {
                    neighbor(row, col, dr, dc, rows, cols).is_some_and(|idx| mask[idx])
                })
            })
        })
        .collect();

    Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))
}
