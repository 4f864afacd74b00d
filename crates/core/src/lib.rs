//! # s2cuts core
//!
//! Core types and raster I/O shared by the s2cuts crates.
//!
//! This crate provides:
//! - `Raster<T>`: georeferenced 2D grid
//! - `GeoTransform` and `GridSpec`: affine georeferencing and target grids
//! - `CRS` and `Projection`: EPSG-based CRS handling with pure-Rust
//!   WGS84 / UTM / Web Mercator transforms
//! - GeoTIFF reading and Cloud-Optimized GeoTIFF writing

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;

pub use crs::{Projection, CRS};
pub use error::{Error, Result};
pub use raster::{GeoTransform, GridSpec, Raster, RasterElement};

/// Common interface for raster algorithms.
///
/// Algorithms are exposed both as free functions and as unit structs
/// implementing this trait, so callers can hold them generically.
pub trait Algorithm {
    type Input;
    type Output;
    type Params: Default;
    type Error: std::error::Error;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::{Projection, CRS};
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, GridSpec, Raster, RasterElement};
    pub use crate::Algorithm;
}
