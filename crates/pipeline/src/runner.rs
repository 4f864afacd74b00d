//! Batch execution
//!
//! Scenes are processed independently, up to `jobs` at a time. A scene that
//! fails is logged and recorded in the [`BatchReport`]; the batch goes on.

use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use s2cuts_core::io::CogWriteOptions;
use s2cuts_core::raster::Raster;
use serde::Serialize;
use tracing::{info, warn};

use crate::aoi::AreaOfInterest;
use crate::assemble::{scene_grid, Assembler};
use crate::catalog::SceneCandidate;
use crate::error::Result;
use crate::fetch::SceneFetcher;
use crate::layout::{write_atomic, OutputLayout};
use crate::variable::Variable;

/// Outcome of one scene.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SceneReport {
    pub scene: String,
    pub written: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    /// Scene-level failure, or one message per output that failed to write.
    pub errors: Vec<String>,
}

impl SceneReport {
    fn new(scene: &SceneCandidate) -> Self {
        Self {
            scene: scene.id.clone(),
            ..Default::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// A failed scene or output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneFailure {
    pub scene: String,
    pub error: String,
}

/// Summary of a batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub scenes: usize,
    pub written: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<SceneFailure>,
}

impl BatchReport {
    fn add(&mut self, report: SceneReport) {
        self.scenes += 1;
        self.written.extend(report.written);
        self.skipped.extend(report.skipped);
        self.failed.extend(report.errors.into_iter().map(|error| SceneFailure {
            scene: report.scene.clone(),
            error,
        }));
    }
}

/// Fetches, assembles and writes a list of scenes.
pub struct BatchRunner {
    fetcher: Arc<dyn SceneFetcher>,
    assembler: Assembler,
    layout: OutputLayout,
    resolution: f64,
    jobs: usize,
    overwrite: bool,
    write_options: CogWriteOptions,
}

impl BatchRunner {
    pub fn new(fetcher: Arc<dyn SceneFetcher>, assembler: Assembler, layout: OutputLayout) -> Self {
        Self {
            fetcher,
            assembler,
            layout,
            resolution: 20.0,
            jobs: 1,
            overwrite: false,
            write_options: CogWriteOptions::default(),
        }
    }

    /// Working resolution of scene grids, metres.
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_write_options(mut self, options: CogWriteOptions) -> Self {
        self.write_options = options;
        self
    }

    pub async fn run(&self, aoi: &AreaOfInterest, scenes: &[SceneCandidate]) -> BatchReport {
        self.run_with_progress(aoi, scenes, |_| {}).await
    }

    /// Process every scene, calling `on_scene` as each one finishes.
    pub async fn run_with_progress<F>(&self, aoi: &AreaOfInterest, scenes: &[SceneCandidate], on_scene: F) -> BatchReport
    where
        F: Fn(&SceneReport),
    {
        let mut reports = stream::iter(scenes)
            .map(|scene| self.process_scene(aoi, scene))
            .buffer_unordered(self.jobs);

        let mut batch = BatchReport::default();
        while let Some(report) = reports.next().await {
            on_scene(&report);
            batch.add(report);
        }

        info!(
            scenes = batch.scenes,
            written = batch.written.len(),
            skipped = batch.skipped.len(),
            failed = batch.failed.len(),
            "batch complete"
        );
        batch
    }

    async fn process_scene(&self, aoi: &AreaOfInterest, scene: &SceneCandidate) -> SceneReport {
        let mut report = SceneReport::new(scene);
        let targets: Vec<(Variable, PathBuf)> = self
            .assembler
            .variables()
            .iter()
            .map(|v| (*v, self.layout.product_path(v, scene.date, scene.seq, aoi.id())))
            .collect();

        if !self.overwrite && targets.iter().all(|(_, path)| path.exists()) {
            info!(scene = %scene.id, "all outputs exist, skipping");
            report.skipped = targets.into_iter().map(|(_, path)| path).collect();
            return report;
        }

        let products = match self.fetch_and_assemble(aoi, scene).await {
            Ok(products) => products,
            Err(e) => {
                warn!(scene = %scene.id, error = %e, "scene skipped");
                report.errors.push(e.to_string());
                return report;
            }
        };

        for ((variable, raster), (_, path)) in products.iter().zip(&targets) {
            if !self.overwrite && path.exists() {
                report.skipped.push(path.clone());
                continue;
            }
            match write_atomic(raster, path, &self.write_options) {
                Ok(()) => {
                    info!(scene = %scene.id, %variable, path = %path.display(), "written");
                    report.written.push(path.clone());
                }
                Err(e) => {
                    warn!(scene = %scene.id, %variable, error = %e, "write failed");
                    report.errors.push(e.to_string());
                }
            }
        }
        report
    }

    async fn fetch_and_assemble(
        &self,
        aoi: &AreaOfInterest,
        scene: &SceneCandidate,
    ) -> Result<Vec<(Variable, Raster<f32>)>> {
        let grid = scene_grid(aoi, scene, self.resolution)?;
        let request = self.assembler.fetch_request(grid);
        let data = self.fetcher.fetch(scene, &request).await?;
        self.assembler.assemble(scene, &data, aoi)
    }
}
