//! Screenshot capture
//!
//! This module consolidates:
//! - the rasterizer seam and a static-page rasterizer (raster.rs)
//! - bitmap encoding to PNG / JPEG / WebP (encode.rs)
//! - the exclusive capture service (service.rs)
//! - interactive region capture (region.rs)

pub mod encode;
pub mod raster;
pub mod region;
pub mod service;

pub use raster::{ElementFilter, ElementKind, PageElement, RasterRequest, Rasterizer, StaticPageRasterizer};
pub use region::capture_region;
pub use service::{CaptureEvent, CaptureListener, CaptureService};
