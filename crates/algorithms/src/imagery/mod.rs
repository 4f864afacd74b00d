//! Imagery analysis algorithms
//!
//! - Normalized difference: generic two-band index
//! - NDVI from B08 and B04

mod indices;

pub use indices::{ndvi, normalized_difference, Ndvi};
pub(crate) use indices::check_dimensions;
