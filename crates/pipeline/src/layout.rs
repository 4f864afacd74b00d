//! Output naming and atomic writes
//!
//! `<out_dir>/index=<VAR>/aoi=<id>/S2_<YYYYMMDD>_<seq>_<id>_<VAR>.tif`

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use s2cuts_core::io::{write_cog_to_buffer, CogWriteOptions};
use s2cuts_core::raster::Raster;

use crate::error::{PipelineError, Result};
use crate::variable::Variable;

/// Deterministic product paths under an output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every product of `variable` for `aoi_id`.
    pub fn product_dir(&self, variable: &Variable, aoi_id: &str) -> PathBuf {
        self.root
            .join(format!("index={}", variable.name()))
            .join(format!("aoi={aoi_id}"))
    }

    /// Path of one product.
    pub fn product_path(&self, variable: &Variable, date: NaiveDate, seq: u32, aoi_id: &str) -> PathBuf {
        self.product_dir(variable, aoi_id).join(format!(
            "S2_{}_{:03}_{}_{}.tif",
            date.format("%Y%m%d"),
            seq,
            aoi_id,
            variable.name()
        ))
    }
}

/// Write `raster` as a COG at `path` through a temporary file in the same
/// directory, renamed into place once complete.
pub fn write_atomic(raster: &Raster<f32>, path: &Path, options: &CogWriteOptions) -> Result<()> {
    let write_err = |reason: String| PipelineError::Write {
        path: path.to_path_buf(),
        reason,
    };
    let dir = path
        .parent()
        .ok_or_else(|| write_err("output path has no parent directory".into()))?;
    std::fs::create_dir_all(dir).map_err(|e| write_err(e.to_string()))?;

    let bytes = write_cog_to_buffer(raster, options).map_err(|e| write_err(e.to_string()))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".s2cuts-")
        .suffix(".tif.part")
        .tempfile_in(dir)
        .map_err(|e| write_err(e.to_string()))?;
    tmp.write_all(&bytes).map_err(|e| write_err(e.to_string()))?;
    tmp.as_file().sync_all().map_err(|e| write_err(e.to_string()))?;
    tmp.persist(path).map_err(|e| write_err(e.error.to_string()))?;
    Ok(())
}
