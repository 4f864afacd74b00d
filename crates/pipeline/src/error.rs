//! Error types for the s2cuts pipeline

use std::path::PathBuf;

use s2cuts_cloud::CloudError;
use thiserror::Error;

/// Errors raised while querying, fetching, assembling or writing scenes.
///
/// Variants split into setup errors, which abort a run before any scene is
/// fetched, and per-scene errors, which skip one scene. See
/// [`PipelineError::is_setup`].
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid area of interest: {0}")]
    Aoi(String),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("invalid time window: {0}")]
    TimeWindow(String),

    #[error("unsupported target CRS: {0}")]
    TargetCrs(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("biophysical model unavailable: {0}")]
    Model(String),

    #[error("catalog query failed: {0}")]
    Catalog(#[source] CloudError),

    #[error("scene {scene}: {reason}")]
    Scene { scene: String, reason: String },

    #[error("fetch failed: {0}")]
    Fetch(#[from] CloudError),

    #[error("raster error: {0}")]
    Raster(#[from] s2cuts_core::Error),

    #[error("failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether the error is fatal for the whole run.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Self::Aoi(_)
                | Self::GeoJson(_)
                | Self::TimeWindow(_)
                | Self::TargetCrs(_)
                | Self::Config(_)
                | Self::Model(_)
                | Self::Catalog(_)
        )
    }

    pub(crate) fn scene(scene: &str, reason: impl Into<String>) -> Self {
        Self::Scene {
            scene: scene.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
