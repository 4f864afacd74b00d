//! Sentinel-2 bands and output variables

use std::fmt;
use std::str::FromStr;

use s2cuts_algorithms::biophysical::{BiophysicalVariable, MODEL_BANDS};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Sentinel-2 L2A band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum S2Band {
    B01,
    B02,
    B03,
    B04,
    B05,
    B06,
    B07,
    B08,
    B8A,
    B09,
    B11,
    B12,
    /// Scene classification layer
    Scl,
}

impl S2Band {
    pub const ALL: [S2Band; 13] = [
        Self::B01,
        Self::B02,
        Self::B03,
        Self::B04,
        Self::B05,
        Self::B06,
        Self::B07,
        Self::B08,
        Self::B8A,
        Self::B09,
        Self::B11,
        Self::B12,
        Self::Scl,
    ];

    /// Band name as used by the Sentinel Hub evalscript (`B04`, `SCL`).
    pub fn name(&self) -> &'static str {
        match self {
            Self::B01 => "B01",
            Self::B02 => "B02",
            Self::B03 => "B03",
            Self::B04 => "B04",
            Self::B05 => "B05",
            Self::B06 => "B06",
            Self::B07 => "B07",
            Self::B08 => "B08",
            Self::B8A => "B8A",
            Self::B09 => "B09",
            Self::B11 => "B11",
            Self::B12 => "B12",
            Self::Scl => "SCL",
        }
    }

    /// Asset key in the Earth Search `sentinel-2-l2a` collection.
    pub fn earth_search_asset(&self) -> &'static str {
        match self {
            Self::B01 => "coastal",
            Self::B02 => "blue",
            Self::B03 => "green",
            Self::B04 => "red",
            Self::B05 => "rededge1",
            Self::B06 => "rededge2",
            Self::B07 => "rededge3",
            Self::B08 => "nir",
            Self::B8A => "nir08",
            Self::B09 => "nir09",
            Self::B11 => "swir16",
            Self::B12 => "swir22",
            Self::Scl => "scl",
        }
    }

    /// Native ground sampling distance in metres.
    pub fn native_resolution(&self) -> f64 {
        match self {
            Self::B02 | Self::B03 | Self::B04 | Self::B08 => 10.0,
            Self::B01 | Self::B09 => 60.0,
            _ => 20.0,
        }
    }

    /// Whether values are reflectances (every band but SCL).
    pub fn is_reflectance(&self) -> bool {
        *self != Self::Scl
    }
}

impl fmt::Display for S2Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for S2Band {
    type Err = PipelineError;

    /// Accepts band names (`B04`, `b8a`, `B4`) and Earth Search asset keys.
    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        let normalized = match upper.strip_prefix('B') {
            Some(num) if num.len() == 1 && num.chars().all(|c| c.is_ascii_digit()) => format!("B0{num}"),
            _ => upper,
        };
        Self::ALL
            .into_iter()
            .find(|b| b.name() == normalized || b.earth_search_asset().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| PipelineError::Config(format!("unknown Sentinel-2 band '{}'", s.trim())))
    }
}

/// An output product kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variable {
    /// Surface reflectance of one band
    Band(S2Band),
    /// Normalized difference vegetation index from B08 and B04
    Ndvi,
    /// LAI, CCC or CWC from a biophysical model
    Biophysical(BiophysicalVariable),
}

impl Variable {
    /// Tag used in output paths and file names.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Band(band) => band.name(),
            Self::Ndvi => "NDVI",
            Self::Biophysical(var) => var.name(),
        }
    }

    /// Bands to fetch to compute this variable (SCL excluded).
    pub fn required_bands(&self) -> Vec<S2Band> {
        match self {
            Self::Band(band) => vec![*band],
            Self::Ndvi => vec![S2Band::B04, S2Band::B08],
            Self::Biophysical(_) => MODEL_BANDS
                .iter()
                .filter_map(|name| name.parse().ok())
                .collect(),
        }
    }

    /// Whether computing the variable needs sun and view angles.
    pub fn needs_geometry(&self) -> bool {
        matches!(self, Self::Biophysical(_))
    }

    /// Parse a comma-separated list, dropping duplicates.
    pub fn parse_list(s: &str) -> Result<Vec<Variable>> {
        let mut out: Vec<Variable> = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let var: Variable = part.parse()?;
            if !out.contains(&var) {
                out.push(var);
            }
        }
        if out.is_empty() {
            return Err(PipelineError::Config("no output variable requested".into()));
        }
        Ok(out)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variable {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "NDVI" => Ok(Self::Ndvi),
            "LAI" => Ok(Self::Biophysical(BiophysicalVariable::Lai)),
            "CCC" => Ok(Self::Biophysical(BiophysicalVariable::Ccc)),
            "CWC" => Ok(Self::Biophysical(BiophysicalVariable::Cwc)),
            _ => match s.parse::<S2Band>()? {
                S2Band::Scl => Err(PipelineError::Config(
                    "SCL is used for masking and cannot be an output variable".into(),
                )),
                band => Ok(Self::Band(band)),
            },
        }
    }
}

/// Union of the bands needed by `variables`, sorted, SCL excluded.
pub fn required_bands(variables: &[Variable]) -> Vec<S2Band> {
    let mut bands: Vec<S2Band> = variables.iter().flat_map(Variable::required_bands).collect();
    bands.sort();
    bands.dedup();
    bands
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_parsing() {
        assert_eq!("B04".parse::<S2Band>().unwrap(), S2Band::B04);
        assert_eq!("b4".parse::<S2Band>().unwrap(), S2Band::B04);
        assert_eq!("b8a".parse::<S2Band>().unwrap(), S2Band::B8A);
        assert_eq!("nir".parse::<S2Band>().unwrap(), S2Band::B08);
        assert_eq!("scl".parse::<S2Band>().unwrap(), S2Band::Scl);
        assert!("B10".parse::<S2Band>().is_err());
    }

    #[test]
    fn test_variable_list() {
        let vars = Variable::parse_list("lai, NDVI,B04,lai").unwrap();
        assert_eq!(
            vars,
            vec![
                Variable::Biophysical(BiophysicalVariable::Lai),
                Variable::Ndvi,
                Variable::Band(S2Band::B04)
            ]
        );
        assert!(Variable::parse_list(" , ").is_err());
        assert!(Variable::parse_list("SCL").is_err());
    }

    #[test]
    fn test_required_bands() {
        let bands = required_bands(&[Variable::Ndvi, Variable::Band(S2Band::B04)]);
        assert_eq!(bands, vec![S2Band::B04, S2Band::B08]);

        let lai = Variable::Biophysical(BiophysicalVariable::Lai).required_bands();
        assert_eq!(lai.len(), MODEL_BANDS.len());
        assert_eq!(lai[0], S2Band::B03);
        assert_eq!(lai[5], S2Band::B8A);
    }
}
