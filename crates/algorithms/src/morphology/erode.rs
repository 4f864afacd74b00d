//! Binary erosion
//!
//! A cell stays set only if every cell under the structuring element is
//! set. Cells outside the grid count as set, so erosion never eats in from
//! the border.

use ndarray::Array2;
use rayon::prelude::*;
use s2cuts_core::{Error, Result};

use super::element::StructuringElement;

pub fn erode(mask: &Array2<bool>, element: &StructuringElement) -> Result<Array2<bool>> {
    element.validate()?;
    let (rows, cols) = mask.dim();
    let offsets = element.offsets();

    let data: Vec<bool> = (0..rows)
        .into_par_iter()
        .flat_map_iter(|row| {
            let offsets = &offsets;
            (0..cols).map(move |col| {
                mask[(row, col)]
                    && offsets.iter().all(|&(dr, dc)| {
                        neighbor(row, col, dr, dc, rows, cols).map_or(true, |idx| mask[idx])
                    })
            })
        })
        .collect();

    Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))
}

/// Index of the cell at `(row + dr, col + dc)`, `None` outside the grid.
pub(crate) fn neighbor(
    row: usize,
    col: usize,
    dr: isize,
    dc: isize,
    rows: usize,
    cols: usize,
) -> Option<(usize, usize)> {
    let r = row.checked_add_signed(dr)?;
    let c = col.checked_add_signed(dc)?;
    (r < rows && c < cols).then_some((r, c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_erode_removes_isolated_and_edges() {
        let mask = array![
            [false, false, false, false, false],
            [false, true, true, true, false],
            [false, true, true, true, false],
            [false, true, true, true, false],
            [false, false, false, false, true],
        ];
        let out = erode(&mask, &StructuringElement::Square(1)).unwrap();
        assert_eq!(out.iter().filter(|&&v| v).count(), 1);
        assert!(out[(2, 2)]);
        assert!(!out[(4, 4)]);
    }

    #[test]
    fn test_erode_keeps_full_grid() {
        let mask = Array2::from_elem((4, 4), true);
        let out = erode(&mask, &StructuringElement::Square(1)).unwrap();
        assert!(out.iter().all(|&v| v));
    }
}
