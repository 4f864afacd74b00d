//! Binary closing (dilation followed by erosion)
//!
//! Fills gaps narrower than the structuring element while preserving the
//! outline of larger regions.

use ndarray::Array2;
use s2cuts_core::{Algorithm, Error, Result};

use super::dilate::dilate;
use super::element::StructuringElement;
use super::erode::erode;

/// Parameters for binary closing
#[derive(Debug, Clone, Default)]
pub struct ClosingParams {
    pub element: StructuringElement,
}

/// Closing algorithm
#[derive(Debug, Clone, Default)]
pub struct Closing;

impl Algorithm for Closing {
    type Input = Array2<bool>;
    type Output = Array2<bool>;
    type Params = ClosingParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Closing"
    }

    fn description(&self) -> &'static str {
        "Binary closing (dilation then erosion) to fill small gaps"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        closing(&input, &params.element)
    }
}

pub fn closing(mask: &Array2<bool>, element: &StructuringElement) -> Result<Array2<bool>> {
    let dilated = dilate(mask, element)?;
    erode(&dilated, element)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closing_fills_one_pixel_gap() {
        let mut mask = Array2::from_elem((7, 7), true);
        mask[(3, 3)] = false;
        let out = closing(&mask, &StructuringElement::Square(1)).unwrap();
        assert!(out.iter().all(|&v| v));
    }

    #[test]
    fn test_closing_keeps_wide_gap() {
        let mut mask = Array2::from_elem((9, 9), true);
        for r in 0..9 {
            for c in 3..6 {
                mask[(r, c)] = false;
            }
        }
        let out = Closing.execute_default(mask.clone()).unwrap();
        assert_eq!(out, mask);
    }
}
