//! Raster data structures

mod element;
mod geotransform;
mod grid;
mod grid_spec;

pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};
pub use grid_spec::GridSpec;
