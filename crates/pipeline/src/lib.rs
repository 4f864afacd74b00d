//! # s2cuts pipeline
//!
//! Sentinel-2 scene query and materialization:
//!
//! 1. an [`AreaOfInterest`] and a [`TimeWindow`] are turned into
//!    date-ordered [`SceneCandidate`]s by a [`SceneCatalog`];
//! 2. each candidate is fetched by a [`SceneFetcher`] onto a grid in its
//!    native CRS, masked with the SCL layer, turned into the requested
//!    [`Variable`]s, reprojected and clipped to the AOI by an [`Assembler`];
//! 3. the [`BatchRunner`] writes one COG per (variable, date, AOI) under an
//!    [`OutputLayout`], skipping failed scenes.
//!
//! [`Pipeline`] wires these together from a [`PipelineConfig`].

pub mod aoi;
pub mod assemble;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod runner;
pub mod time_window;
pub mod variable;

use std::sync::Arc;

use s2cuts_cloud::{CogReaderOptions, HttpClient, ProcessClient};

pub use aoi::AreaOfInterest;
pub use assemble::{Assembler, ModelSet};
pub use catalog::{SceneCandidate, SceneCatalog, StacSceneCatalog};
pub use config::{Credentials, DataSource, PipelineConfig};
pub use error::{PipelineError, Result};
pub use fetch::{CogFetcher, FetchRequest, HubFetcher, SceneData, SceneFetcher};
pub use layout::OutputLayout;
pub use runner::{BatchReport, BatchRunner, SceneFailure, SceneReport};
pub use time_window::TimeWindow;
pub use variable::{S2Band, Variable};

/// A configured query-and-fetch run.
pub struct Pipeline {
    config: PipelineConfig,
    catalog: Arc<dyn SceneCatalog>,
    runner: BatchRunner,
}

impl Pipeline {
    /// Validate `config` and build the catalog, fetcher and models it
    /// names. Every error here is a setup error.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let auth = catalog::auth_for(&config)?;
        let catalog = StacSceneCatalog::from_config(&config, auth.clone())?;

        let http = HttpClient::new(config.request_timeout, config.max_retries)
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        let fetcher: Arc<dyn SceneFetcher> = match config.source {
            DataSource::EarthSearch => {
                let options = CogReaderOptions {
                    request_timeout: config.request_timeout,
                    max_retries: config.max_retries,
                    ..Default::default()
                };
                Arc::new(CogFetcher::new(http, options))
            }
            DataSource::Hub => {
                let auth = auth.ok_or_else(|| PipelineError::Config("hub source without credentials".into()))?;
                let client = ProcessClient::new(http.with_auth(auth), config.hub_base_url.clone());
                Arc::new(HubFetcher::new(client, config.cloud_ceiling))
            }
        };

        let models = match &config.model_dir {
            Some(dir) if config.needs_models() => ModelSet::load(dir, &config.variables)?,
            _ => ModelSet::new(),
        };

        Self::with_parts(config, Arc::new(catalog), fetcher, models)
    }

    /// Assemble a pipeline from explicit parts.
    pub fn with_parts(
        config: PipelineConfig,
        catalog: Arc<dyn SceneCatalog>,
        fetcher: Arc<dyn SceneFetcher>,
        models: ModelSet,
    ) -> Result<Self> {
        let assembler = Assembler::new(config.variables.clone(), config.mask.clone(), config.target_crs, models)?;
        let runner = BatchRunner::new(fetcher, assembler, OutputLayout::new(&config.out_dir))
            .with_resolution(config.resolution)
            .with_jobs(config.jobs)
            .with_overwrite(config.overwrite)
            .with_write_options(config.write.clone());
        Ok(Self {
            config,
            catalog,
            runner,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Query the catalog only.
    pub async fn search(&self, aoi: &AreaOfInterest, window: &TimeWindow) -> Result<Vec<SceneCandidate>> {
        self.catalog.search(aoi, window).await
    }

    /// Fetch, assemble and write already selected scenes.
    pub async fn process<F>(&self, aoi: &AreaOfInterest, scenes: &[SceneCandidate], on_scene: F) -> BatchReport
    where
        F: Fn(&SceneReport),
    {
        self.runner.run_with_progress(aoi, scenes, on_scene).await
    }

    /// Query, then process every candidate. Only catalog failures are
    /// returned as errors; scene failures are listed in the report.
    pub async fn run(&self, aoi: &AreaOfInterest, window: &TimeWindow) -> Result<BatchReport> {
        let scenes = self.search(aoi, window).await?;
        Ok(self.runner.run(aoi, &scenes).await)
    }
}
