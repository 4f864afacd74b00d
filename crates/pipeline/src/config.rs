//! Run configuration
//!
//! [`PipelineConfig`] is built once (by the CLI or a caller) and passed by
//! reference through query, fetch and write.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use s2cuts_algorithms::mask::MaskConfig;
use s2cuts_cloud::stac_client::CDSE_BASE_URL;
use s2cuts_cloud::StacCatalog;
use s2cuts_core::io::CogWriteOptions;
use s2cuts_core::CRS;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::variable::Variable;

/// Where scenes are found and fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSource {
    /// AWS Earth Search catalog with public COG assets
    #[default]
    EarthSearch,
    /// Copernicus Data Space Sentinel Hub catalog and Process API
    Hub,
}

impl DataSource {
    /// Whether the source needs OAuth client credentials.
    pub fn needs_credentials(&self) -> bool {
        matches!(self, Self::Hub)
    }

    /// STAC catalog backing this source.
    pub fn catalog(&self, hub_base_url: &str) -> StacCatalog {
        match self {
            Self::EarthSearch => StacCatalog::EarthSearch,
            Self::Hub => StacCatalog::CopernicusHub {
                base_url: hub_base_url.to_string(),
            },
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EarthSearch => f.write_str("earth-search"),
            Self::Hub => f.write_str("hub"),
        }
    }
}

impl FromStr for DataSource {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "earth-search" | "earthsearch" | "es" | "aws" | "object-storage" => Ok(Self::EarthSearch),
            "hub" | "cdse" | "copernicus" | "sentinel-hub" => Ok(Self::Hub),
            other => Err(PipelineError::Config(format!(
                "unknown data source '{other}' (expected earth-search or hub)"
            ))),
        }
    }
}

/// OAuth2 client credentials for the hub source.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Everything a run needs besides the AOI and the time window.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source: DataSource,
    /// Maximum scene cloud cover, percent. Scenes exactly at the ceiling
    /// are kept.
    pub cloud_ceiling: f64,
    pub variables: Vec<Variable>,
    pub target_crs: CRS,
    /// Working resolution of the scene grid, metres.
    pub resolution: f64,
    pub out_dir: PathBuf,
    pub mask: MaskConfig,
    /// Replace existing outputs instead of skipping them.
    pub overwrite: bool,
    /// Scenes processed concurrently.
    pub jobs: usize,
    /// Upper bound on catalog items collected across pages.
    pub max_items: usize,
    /// Directory holding `lai.json`, `ccc.json`, `cwc.json`.
    pub model_dir: Option<PathBuf>,
    pub credentials: Option<Credentials>,
    pub hub_base_url: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub write: CogWriteOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: DataSource::default(),
            cloud_ceiling: 20.0,
            variables: vec![Variable::Ndvi],
            target_crs: CRS::wgs84(),
            resolution: 20.0,
            out_dir: PathBuf::from("output"),
            mask: MaskConfig::default(),
            overwrite: false,
            jobs: 1,
            max_items: 500,
            model_dir: None,
            credentials: None,
            hub_base_url: CDSE_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            write: CogWriteOptions::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject configurations that cannot run. All failures are setup errors.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.cloud_ceiling) {
            return Err(PipelineError::Config(format!(
                "cloud ceiling {} is outside 0..=100 percent",
                self.cloud_ceiling
            )));
        }
        if !(self.resolution > 0.0 && self.resolution.is_finite()) {
            return Err(PipelineError::Config(format!(
                "resolution {} must be positive",
                self.resolution
            )));
        }
        if self.variables.is_empty() {
            return Err(PipelineError::Config("no output variable requested".into()));
        }
        if self.jobs == 0 {
            return Err(PipelineError::Config("jobs must be at least 1".into()));
        }
        if self.max_items == 0 {
            return Err(PipelineError::Config("max_items must be at least 1".into()));
        }
        if self.target_crs.projection().is_err() {
            return Err(PipelineError::TargetCrs(format!(
                "{} (supported: EPSG:4326, EPSG:3857, UTM 326xx/327xx)",
                self.target_crs
            )));
        }
        if self.source.needs_credentials() && self.credentials.is_none() {
            return Err(PipelineError::Config(
                "the hub source needs a client id and client secret".into(),
            ));
        }
        if self.needs_models() && self.model_dir.is_none() {
            return Err(PipelineError::Model(
                "LAI/CCC/CWC requested but no model directory given".into(),
            ));
        }
        Ok(())
    }

    /// Whether any requested variable is computed by a biophysical model.
    pub fn needs_models(&self) -> bool {
        self.variables.iter().any(Variable::needs_geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s2cuts_algorithms::biophysical::BiophysicalVariable;

    #[test]
    fn test_default_is_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_source_parsing() {
        assert_eq!("hub".parse::<DataSource>().unwrap(), DataSource::Hub);
        assert_eq!("Earth-Search".parse::<DataSource>().unwrap(), DataSource::EarthSearch);
        assert!("s3".parse::<DataSource>().is_err());
    }

    #[test]
    fn test_validation_failures_are_setup_errors() {
        let cases = [
            PipelineConfig {
                cloud_ceiling: 120.0,
                ..Default::default()
            },
            PipelineConfig {
                target_crs: CRS::from_epsg(2056),
                ..Default::default()
            },
            PipelineConfig {
                source: DataSource::Hub,
                ..Default::default()
            },
            PipelineConfig {
                variables: vec![Variable::Biophysical(BiophysicalVariable::Cwc)],
                ..Default::default()
            },
            PipelineConfig {
                jobs: 0,
                ..Default::default()
            },
        ];
        for config in cases {
            let err = config.validate().unwrap_err();
            assert!(err.is_setup(), "{err}");
        }
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let creds = Credentials::new("id", "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
