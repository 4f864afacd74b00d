//! SNAP S2 toolbox biophysical neural network
//!
//! Eleven inputs (eight band reflectances and three geometry cosines) are
//! normalized to [-1, 1], passed through one tanh hidden layer and a linear
//! output neuron, and the output is denormalized to physical units.
//!
//! Coefficients are loaded from JSON:
//!
//! ```json
//! {
//!   "variable": "LAI",
//!   "input_min": [...11], "input_max": [...11],
//!   "hidden_weights": [[...11], ...], "hidden_bias": [...],
//!   "output_weights": [...], "output_bias": 0.0,
//!   "output_min": 0.0, "output_max": 14.4,
//!   "output_clip": [0.0, 8.0]
//! }
//! ```

use std::path::Path;

use s2cuts_core::{Error, Result};
use serde::{Deserialize, Serialize};

use super::{AngleGeometry, BiophysicalModel, BiophysicalVariable};

const INPUTS: usize = 11;

/// One trained SNAP network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapNetwork {
    pub variable: BiophysicalVariable,
    pub input_min: Vec<f64>,
    pub input_max: Vec<f64>,
    /// One row of input weights per hidden neuron.
    pub hidden_weights: Vec<Vec<f64>>,
    pub hidden_bias: Vec<f64>,
    pub output_weights: Vec<f64>,
    pub output_bias: f64,
    pub output_min: f64,
    pub output_max: f64,
    /// Optional final clamp of the denormalized value.
    #[serde(default)]
    pub output_clip: Option<[f64; 2]>,
}

impl SnapNetwork {
    /// Parse and validate a coefficient document.
    pub fn from_json(json: &str) -> Result<Self> {
        let network: Self = serde_json::from_str(json).map_err(|e| Error::InvalidParameter {
            name: "model",
            value: "json".into(),
            reason: e.to_string(),
        })?;
        network.validate()?;
        Ok(network)
    }

    /// Load a coefficient file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Load `<dir>/<variable>.json` (see [`BiophysicalVariable::file_name`]).
    pub fn load(dir: &Path, variable: BiophysicalVariable) -> Result<Self> {
        let network = Self::from_file(dir.join(variable.file_name()))?;
        if network.variable != variable {
            return Err(Error::InvalidParameter {
                name: "model",
                value: network.variable.name().into(),
                reason: format!("expected coefficients for {}", variable.name()),
            });
        }
        Ok(network)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Error::InvalidParameter {
            name: "model",
            value: self.variable.name().into(),
            reason,
        };

        if self.input_min.len() != INPUTS || self.input_max.len() != INPUTS {
            return Err(invalid(format!("input_min/input_max need {} values", INPUTS)));
        }
        if self.input_min.iter().zip(&self.input_max).any(|(lo, hi)| !(hi > lo)) {
            return Err(invalid("every input_max must exceed input_min".into()));
        }
        let hidden = self.hidden_weights.len();
        if hidden == 0 || self.hidden_bias.len() != hidden || self.output_weights.len() != hidden {
            return Err(invalid("hidden layer sizes disagree".into()));
        }
        if self.hidden_weights.iter().any(|w| w.len() != INPUTS) {
            return Err(invalid(format!("each hidden neuron needs {} weights", INPUTS)));
        }
        if !(self.output_max > self.output_min) {
            return Err(invalid("output_max must exceed output_min".into()));
        }
        Ok(())
    }

    /// Evaluate the network on raw (unnormalized) inputs.
    pub fn evaluate(&self, inputs: &[f64; INPUTS]) -> f64 {
        let normalized: Vec<f64> = inputs
            .iter()
            .zip(self.input_min.iter().zip(&self.input_max))
            .map(|(&x, (&lo, &hi))| 2.0 * (x - lo) / (hi - lo) - 1.0)
            .collect();

        let layer = self
            .hidden_weights
            .iter()
            .zip(&self.hidden_bias)
            .zip(&self.output_weights)
            .map(|((weights, bias), out_w)| {
                let z: f64 = weights.iter().zip(&normalized).map(|(w, x)| w * x).sum::<f64>() + bias;
                out_w * z.tanh()
            })
            .sum::<f64>()
            + self.output_bias;

        let value = 0.5 * (layer + 1.0) * (self.output_max - self.output_min) + self.output_min;
        match self.output_clip {
            Some([lo, hi]) => value.clamp(lo, hi),
            None => value,
        }
    }
}

impl BiophysicalModel for SnapNetwork {
    fn variable(&self) -> BiophysicalVariable {
        self.variable
    }

    fn predict(&self, bands: &[f32; 8], geometry: &AngleGeometry) -> f32 {
        let [cos_view, cos_sun, cos_rel] = geometry.cosines();
        let mut inputs = [0f64; INPUTS];
        for (slot, &b) in inputs.iter_mut().zip(bands) {
            *slot = b as f64;
        }
        inputs[8] = cos_view;
        inputs[9] = cos_sun;
        inputs[10] = cos_rel;
        self.evaluate(&inputs) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    /// A single hidden neuron reading only the first input.
    fn toy() -> SnapNetwork {
        let mut w = vec![0.0; INPUTS];
        w[0] = 1.0;
        SnapNetwork {
            variable: BiophysicalVariable::Lai,
            input_min: vec![0.0; INPUTS],
            input_max: vec![1.0; INPUTS],
            hidden_weights: vec![w],
            hidden_bias: vec![0.0],
            output_weights: vec![1.0],
            output_bias: 0.0,
            output_min: 0.0,
            output_max: 10.0,
            output_clip: None,
        }
    }

    #[test]
    fn test_evaluate_normalization() {
        let net = toy();
        // x = 0.5 normalizes to 0, tanh(0) = 0, denormalized to the midpoint
        let mut inputs = [0.0; INPUTS];
        inputs[0] = 0.5;
        assert_relative_eq!(net.evaluate(&inputs), 5.0, epsilon = 1e-12);

        inputs[0] = 1.0;
        let expected = 0.5 * (1f64.tanh() + 1.0) * 10.0;
        assert_relative_eq!(net.evaluate(&inputs), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_output_clip() {
        let mut net = toy();
        net.output_clip = Some([0.0, 6.0]);
        let mut inputs = [0.0; INPUTS];
        inputs[0] = 1.0;
        assert_relative_eq!(net.evaluate(&inputs), 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_predict_uses_geometry() {
        let mut net = toy();
        net.hidden_weights[0] = vec![0.0; INPUTS];
        net.hidden_weights[0][9] = 1.0; // cos sun zenith
        let bands = [0.1f32; 8];
        let overhead = AngleGeometry::default();
        let low_sun = AngleGeometry {
            sun_zenith: 80.0,
            ..AngleGeometry::default()
        };
        assert!(net.predict(&bands, &overhead) > net.predict(&bands, &low_sun));
    }

    #[test]
    fn test_json_round_trip_and_validation() {
        let json = serde_json::to_string(&toy()).unwrap();
        assert_eq!(SnapNetwork::from_json(&json).unwrap(), toy());

        let mut bad = toy();
        bad.hidden_bias.push(1.0);
        let json = serde_json::to_string(&bad).unwrap();
        assert!(SnapNetwork::from_json(&json).is_err());

        assert!(SnapNetwork::from_json("{\"variable\": \"LAI\"}").is_err());
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("lai.json")).unwrap();
        f.write_all(serde_json::to_string(&toy()).unwrap().as_bytes()).unwrap();

        assert!(SnapNetwork::load(dir.path(), BiophysicalVariable::Lai).is_ok());
        assert!(SnapNetwork::load(dir.path(), BiophysicalVariable::Ccc).is_err());
    }
}
