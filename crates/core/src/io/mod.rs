//! Reading and writing georeferenced rasters

mod cog_writer;
pub mod geokeys;
mod native;

pub use cog_writer::{write_cog, write_cog_to_buffer, CogWriteOptions};
pub use native::{read_bands_from_buffer, read_geotiff, read_geotiff_from_buffer};
