//! Coordinate Reference System handling
//!
//! CRSs are identified by EPSG code. The subset that can actually be
//! transformed (see [`Projection`]) covers geographic WGS84, the UTM zones
//! used by Sentinel-2 tiles and Web Mercator.

mod projection;

pub use projection::{transform_bounds, utm_epsg_for, Projection};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coordinate Reference System identified by its EPSG code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CRS {
    epsg: u32,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self { epsg: code }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Web Mercator (EPSG:3857)
    pub fn web_mercator() -> Self {
        Self::from_epsg(3857)
    }

    /// EPSG code
    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Whether coordinates are longitude/latitude degrees
    pub fn is_geographic(&self) -> bool {
        self.epsg == 4326
    }

    /// Resolve the projection math for this CRS.
    ///
    /// Fails with [`Error::UnsupportedCrs`] for codes outside the supported set.
    pub fn projection(&self) -> Result<Projection> {
        Projection::from_epsg(self.epsg).ok_or_else(|| Error::UnsupportedCrs(self.to_string()))
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        format!("EPSG:{}", self.epsg)
    }

    /// Parse `EPSG:<code>`, `epsg:<code>`, a bare code, or the OGC URN form
    /// `urn:ogc:def:crs:EPSG::<code>`. `OGC:CRS84` maps to EPSG:4326.
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let upper = trimmed.to_uppercase();
        if upper.ends_with("CRS84") {
            return Ok(Self::wgs84());
        }

        let code = upper
            .rsplit(':')
            .next()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::UnsupportedCrs(trimmed.to_string()))?;

        code.parse::<u32>()
            .map(Self::from_epsg)
            .map_err(|_| Error::UnsupportedCrs(trimmed.to_string()))
    }
}

impl FromStr for CRS {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::from_epsg(32632);
        assert_eq!(crs.epsg(), 32632);
        assert_eq!(crs.identifier(), "EPSG:32632");
        assert!(!crs.is_geographic());
        assert!(CRS::wgs84().is_geographic());
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(CRS::parse("EPSG:32632").unwrap(), CRS::from_epsg(32632));
        assert_eq!(CRS::parse("epsg:4326").unwrap(), CRS::wgs84());
        assert_eq!(CRS::parse("3857").unwrap(), CRS::web_mercator());
        assert_eq!(
            CRS::parse("urn:ogc:def:crs:EPSG::32633").unwrap(),
            CRS::from_epsg(32633)
        );
        assert_eq!(CRS::parse("urn:ogc:def:crs:OGC:1.3:CRS84").unwrap(), CRS::wgs84());
        assert!(CRS::parse("EPSG:").is_err());
        assert!(CRS::parse("WGS84").is_err());
    }

    #[test]
    fn test_projection_support() {
        assert!(CRS::from_epsg(32632).projection().is_ok());
        assert!(CRS::from_epsg(2056).projection().is_err());
    }
}
