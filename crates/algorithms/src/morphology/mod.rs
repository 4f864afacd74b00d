//! Binary morphology for validity masks
//!
//! - **Erosion** / **Dilation** with square or cross structuring elements
//! - **Closing**: dilation then erosion (fills small gaps)
//! - **Component filters**: small-object removal and hole filling
//!   (4-connectivity)

mod closing;
mod dilate;
mod element;
mod erode;
mod labels;

pub use closing::{closing, Closing, ClosingParams};
pub use dilate::dilate;
pub use element::StructuringElement;
pub use erode::erode;
pub use labels::{fill_holes, label_components, remove_small_objects};
