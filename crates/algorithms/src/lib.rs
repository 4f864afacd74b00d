//! # s2cuts algorithms
//!
//! Per-pixel raster algorithms for Sentinel-2 products.
//!
//! ## Available Algorithm Categories
//!
//! - **imagery**: normalized difference, NDVI
//! - **biophysical**: LAI / CCC / CWC retrieval behind the
//!   [`BiophysicalModel`](biophysical::BiophysicalModel) trait, with the
//!   SNAP network implementation
//! - **mask**: SCL validity masks with optional morphological refinement
//! - **morphology**: binary erosion, dilation, closing, component filters
//! - **warp**: nearest-neighbour resampling across grids and CRSs

pub mod biophysical;
pub mod imagery;
pub mod mask;
pub mod morphology;
pub mod warp;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::biophysical::{
        apply_model, AngleGeometry, BiophysicalModel, BiophysicalVariable, SnapNetwork, MODEL_BANDS,
    };
    pub use crate::imagery::{ndvi, normalized_difference, Ndvi};
    pub use crate::mask::{scl_valid_mask, MaskConfig, SclClass, SclMask};
    pub use crate::warp::{target_grid, warp_nearest};
    pub use s2cuts_core::prelude::*;
}
