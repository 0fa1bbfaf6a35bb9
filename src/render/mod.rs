//! Mask geometry and bitmap rendering
//!
//! - geometry.rs: inverse-mask polygons for the dimming layer
//! - image.rs: tiny-skia compositing (oval mask, dim layer)

pub mod geometry;
pub mod image;

pub use geometry::{MaskPath, mask_path};
