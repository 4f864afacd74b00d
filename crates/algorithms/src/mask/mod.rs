//! Validity masks from the Sentinel-2 scene classification layer (SCL)
//!
//! A pixel is valid when its SCL class is not in the configured invalid
//! set. Optional refinement cleans the mask with binary morphology; it can
//! only remove validity, never restore it to an invalid-class pixel.

use std::fmt;

use ndarray::{Array2, Zip};
use s2cuts_core::raster::Raster;
use s2cuts_core::{Algorithm, Error, Result};
use serde::{Deserialize, Serialize};

use crate::morphology::{closing, fill_holes, remove_small_objects, StructuringElement};

/// Sentinel-2 L2A scene classification classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SclClass {
    NoData = 0,
    SaturatedDefective = 1,
    DarkAreaPixels = 2,
    CloudShadows = 3,
    Vegetation = 4,
    NotVegetated = 5,
    Water = 6,
    Unclassified = 7,
    CloudMediumProbability = 8,
    CloudHighProbability = 9,
    ThinCirrus = 10,
    SnowIce = 11,
}

impl SclClass {
    pub const ALL: [SclClass; 12] = [
        Self::NoData,
        Self::SaturatedDefective,
        Self::DarkAreaPixels,
        Self::CloudShadows,
        Self::Vegetation,
        Self::NotVegetated,
        Self::Water,
        Self::Unclassified,
        Self::CloudMediumProbability,
        Self::CloudHighProbability,
        Self::ThinCirrus,
        Self::SnowIce,
    ];

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SclClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// Mask configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskConfig {
    /// SCL classes treated as invalid.
    pub invalid_classes: Vec<u8>,
    /// Apply morphological refinement after class filtering.
    pub refine: bool,
    /// Minimum valid object size before hole filling (pixels).
    pub min_object_size: usize,
    /// Minimum valid object size after closing (pixels).
    pub min_object_size_final: usize,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            invalid_classes: vec![0, 1, 3, 8, 9, 10, 11],
            refine: false,
            min_object_size: 49,
            min_object_size_final: 47,
        }
    }
}

impl MaskConfig {
    /// Whether an SCL value marks a usable pixel. NaN and values that are
    /// not a class code are invalid.
    pub fn is_valid(&self, scl: f32) -> bool {
        if !scl.is_finite() || scl < 0.0 || scl > u8::MAX as f32 {
            return false;
        }
        let code = scl.round() as u8;
        SclClass::from_code(code).is_some() && !self.invalid_classes.contains(&code)
    }
}

/// Compute the validity mask of an SCL raster.
pub fn scl_valid_mask(scl: &Raster<f32>, config: &MaskConfig) -> Result<Array2<bool>> {
    let base = scl.data().mapv(|v| !scl.is_nodata(v) && config.is_valid(v));
    if !config.refine {
        return Ok(base);
    }

    let refined = remove_small_objects(&base, config.min_object_size);
    let refined = fill_holes(&refined);
    let refined = closing(&refined, &StructuringElement::Square(1))?;
    let mut refined = remove_small_objects(&refined, config.min_object_size_final);

    Zip::from(&mut refined).and(&base).for_each(|r, &b| *r = *r && b);
    Ok(refined)
}

/// SCL masking algorithm
#[derive(Debug, Clone, Default)]
pub struct SclMask;

impl Algorithm for SclMask {
    type Input = Raster<f32>;
    type Output = Array2<bool>;
    type Params = MaskConfig;
    type Error = Error;

    fn name(&self) -> &'static str {
        "SclMask"
    }

    fn description(&self) -> &'static str {
        "Validity mask from Sentinel-2 scene classification classes"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        scl_valid_mask(&input, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scl(values: Vec<f32>, rows: usize, cols: usize) -> Raster<f32> {
        Raster::from_vec(values, rows, cols).unwrap()
    }

    #[test]
    fn test_class_codes() {
        assert_eq!(SclClass::from_code(4), Some(SclClass::Vegetation));
        assert_eq!(SclClass::from_code(12), None);
        assert_eq!(SclClass::ThinCirrus.code(), 10);
    }

    #[test]
    fn test_default_invalid_set() {
        let config = MaskConfig::default();
        let valid: Vec<u8> = (0..12).filter(|&c| config.is_valid(c as f32)).collect();
        assert_eq!(valid, vec![2, 4, 5, 6, 7]);
        assert!(!config.is_valid(f32::NAN));
        assert!(!config.is_valid(15.0));
    }

    #[test]
    fn test_base_mask() {
        let raster = scl(vec![4.0, 9.0, 5.0, 3.0, f32::NAN, 6.0], 2, 3);
        let mask = scl_valid_mask(&raster, &MaskConfig::default()).unwrap();
        assert_eq!(
            mask.iter().copied().collect::<Vec<_>>(),
            vec![true, false, true, false, false, true]
        );
    }

    #[test]
    fn test_custom_invalid_classes() {
        let config = MaskConfig {
            invalid_classes: vec![6],
            ..MaskConfig::default()
        };
        let raster = scl(vec![6.0, 9.0], 1, 2);
        let mask = SclMask.execute(raster, config).unwrap();
        assert!(!mask[(0, 0)]);
        assert!(mask[(0, 1)]);
    }

    #[test]
    fn test_refinement_never_restores_invalid() {
        // 12x12 vegetation with one cloud pixel in the middle and a small
        // isolated valid speck in a cloudy corner
        let mut values = vec![4.0f32; 144];
        values[6 * 12 + 6] = 9.0;
        for r in 0..4 {
            for c in 0..4 {
                values[r * 12 + c] = 8.0;
            }
        }
        values[12 + 1] = 4.0;
        let raster = scl(values, 12, 12);

        let config = MaskConfig {
            refine: true,
            ..MaskConfig::default()
        };
        let mask = scl_valid_mask(&raster, &config).unwrap();

        // hole filling would set it, the invalid class keeps it masked
        assert!(!mask[(6, 6)]);
        // the one-pixel speck is removed
        assert!(!mask[(1, 1)]);
        assert!(mask[(10, 10)]);
        for (idx, &valid) in mask.indexed_iter() {
            if valid {
                assert!(config.is_valid(raster.get(idx.0, idx.1).unwrap()));
            }
        }
    }
}
