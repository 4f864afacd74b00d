//! Biophysical variable retrieval
//!
//! A [`BiophysicalModel`] maps the reflectances of the eight SNAP input
//! bands plus sun/view geometry to one canopy variable. [`apply_model`]
//! evaluates a model over co-registered band rasters in parallel.

mod snap;

pub use snap::SnapNetwork;

use ndarray::Array2;
use rayon::prelude::*;
use s2cuts_core::raster::Raster;
use s2cuts_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::imagery::check_dimensions;

/// Bands consumed by biophysical models, in input order.
pub const MODEL_BANDS: [&str; 8] = ["B03", "B04", "B05", "B06", "B07", "B8A", "B11", "B12"];

/// Canopy variables retrieved by the SNAP networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BiophysicalVariable {
    /// Leaf area index (m²/m²)
    Lai,
    /// Canopy chlorophyll content (LAI x Cab, g/m²)
    Ccc,
    /// Canopy water content (LAI x Cw, kg/m²)
    Cwc,
}

impl BiophysicalVariable {
    pub const ALL: [BiophysicalVariable; 3] = [Self::Lai, Self::Ccc, Self::Cwc];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Lai => "LAI",
            Self::Ccc => "CCC",
            Self::Cwc => "CWC",
        }
    }

    /// Conventional coefficient file name inside a model directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Lai => "lai.json",
            Self::Ccc => "ccc.json",
            Self::Cwc => "cwc.json",
        }
    }
}

/// Sun and view angles of a scene, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AngleGeometry {
    pub sun_zenith: f64,
    pub sun_azimuth: f64,
    pub view_zenith: f64,
    pub view_azimuth: f64,
}

impl AngleGeometry {
    /// `[cos view zenith, cos sun zenith, cos relative azimuth]`, the three
    /// geometry inputs of the SNAP networks.
    pub fn cosines(&self) -> [f64; 3] {
        [
            self.view_zenith.to_radians().cos(),
            self.sun_zenith.to_radians().cos(),
            (self.sun_azimuth - self.view_azimuth).to_radians().cos(),
        ]
    }
}

/// Per-pixel retrieval of one biophysical variable.
pub trait BiophysicalModel: Send + Sync {
    fn variable(&self) -> BiophysicalVariable;

    /// Variable value for one pixel. `bands` follows [`MODEL_BANDS`] order.
    fn predict(&self, bands: &[f32; 8], geometry: &AngleGeometry) -> f32;
}

/// Evaluate `model` over co-registered reflectance rasters.
///
/// `bands` must hold one raster per entry of [`MODEL_BANDS`], in that
/// order. Pixels where any band is nodata are NaN in the output.
pub fn apply_model(
    model: &dyn BiophysicalModel,
    bands: &[&Raster<f32>],
    geometry: &AngleGeometry,
) -> Result<Raster<f32>> {
    if bands.len() != MODEL_BANDS.len() {
        return Err(Error::InvalidParameter {
            name: "bands",
            value: bands.len().to_string(),
            reason: format!("expected {} rasters ({})", MODEL_BANDS.len(), MODEL_BANDS.join(", ")),
        });
    }
    for band in &bands[1..] {
        check_dimensions(bands[0], band)?;
    }

    let (rows, cols) = bands[0].shape();
    let data: Vec<f32> = (0..rows)
        .into_par_iter()
        .flat_map_iter(|row| {
            (0..cols).map(move |col| {
                let mut pixel = [0f32; 8];
                for (slot, band) in pixel.iter_mut().zip(bands) {
                    let v = band.data()[(row, col)];
                    if band.is_nodata(v) {
                        return f32::NAN;
                    }
                    *slot = v;
                }
                model.predict(&pixel, geometry)
            })
        })
        .collect();

    let array = Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    let mut output = Raster::from_array(array).with_meta_of(bands[0]);
    output.set_nodata(Some(f32::NAN));
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Sum of the band reflectances scaled by cos sun zenith.
    struct MockModel;

    impl BiophysicalModel for MockModel {
        fn variable(&self) -> BiophysicalVariable {
            BiophysicalVariable::Lai
        }

        fn predict(&self, bands: &[f32; 8], geometry: &AngleGeometry) -> f32 {
            bands.iter().sum::<f32>() * geometry.cosines()[1] as f32
        }
    }

    #[test]
    fn test_cosines() {
        let g = AngleGeometry {
            sun_zenith: 60.0,
            sun_azimuth: 150.0,
            view_zenith: 0.0,
            view_azimuth: 90.0,
        };
        let [cv, cs, cr] = g.cosines();
        assert_relative_eq!(cv, 1.0, epsilon = 1e-12);
        assert_relative_eq!(cs, 0.5, epsilon = 1e-12);
        assert_relative_eq!(cr, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_apply_model() {
        let rasters: Vec<Raster<f32>> = (0..8).map(|i| Raster::filled(3, 2, 0.1 * i as f32)).collect();
        let mut rasters = rasters;
        rasters[2].set(1, 1, f32::NAN).unwrap();
        let refs: Vec<&Raster<f32>> = rasters.iter().collect();
        let geometry = AngleGeometry {
            sun_zenith: 60.0,
            ..AngleGeometry::default()
        };

        let out = apply_model(&MockModel, &refs, &geometry).unwrap();
        assert_eq!(out.shape(), (3, 2));
        assert_relative_eq!(out.get(0, 0).unwrap(), 2.8 * 0.5, epsilon = 1e-5);
        assert!(out.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_apply_model_band_count() {
        let r = Raster::filled(2, 2, 0.1f32);
        assert!(apply_model(&MockModel, &[&r, &r], &AngleGeometry::default()).is_err());
    }

    #[test]
    fn test_variable_names() {
        assert_eq!(BiophysicalVariable::Ccc.name(), "CCC");
        assert_eq!(BiophysicalVariable::Cwc.file_name(), "cwc.json");
        assert_eq!(serde_json::to_string(&BiophysicalVariable::Lai).unwrap(), "\"LAI\"");
    }
}
