//! Page rasterization seam
//!
//! The crate never renders pages itself. A [`Rasterizer`] is injected into the
//! capture service; [`StaticPageRasterizer`] serves a pre-rendered page bitmap.

use async_trait::async_trait;
use image::{Rgba, RgbaImage, imageops};

use crate::domain::{Rect, Viewport};
use crate::error::{CaptureError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Video,
    Image,
    Canvas,
    Other,
}

/// What the rasterizer knows about one element while walking the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageElement {
    pub kind: ElementKind,
    /// Source URL, if the element has one
    pub source: Option<String>,
    /// Whether `source` can still be fetched
    pub source_available: bool,
}

impl PageElement {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            source: None,
            source_available: true,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>, available: bool) -> Self {
        self.source = Some(source.into());
        self.source_available = available;
        self
    }
}

/// Decides which elements are left out of a rasterization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementFilter {
    pub skip_video: bool,
    pub skip_revoked_blobs: bool,
}

impl Default for ElementFilter {
    fn default() -> Self {
        Self {
            skip_video: true,
            skip_revoked_blobs: true,
        }
    }
}

impl ElementFilter {
    /// Live video surfaces and revoked `blob:` handles cannot be re-rasterized reliably
    pub fn ignores(&self, element: &PageElement) -> bool {
        if self.skip_video && element.kind == ElementKind::Video {
            return true;
        }
        if self.skip_revoked_blobs
            && let Some(source) = &element.source
            && source.starts_with("blob:")
            && !element.source_available
        {
            return true;
        }
        false
    }
}

/// One rasterization call
#[derive(Debug, Clone, PartialEq)]
pub struct RasterRequest {
    /// Area in document coordinates
    pub area: Rect,
    /// Output pixels per document unit
    pub scale: f32,
    /// Fill for areas with nothing painted
    pub background: Option<[u8; 4]>,
    pub filter: ElementFilter,
}

#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Full document size
    fn page_size(&self) -> (f64, f64);

    /// Currently visible part of the document
    fn viewport(&self) -> Viewport;

    async fn rasterize(&self, request: &RasterRequest) -> Result<RgbaImage>;
}

/// Rasterizer over a page that was rendered ahead of time, one pixel per unit
#[derive(Debug, Clone)]
pub struct StaticPageRasterizer {
    page: RgbaImage,
    viewport: Viewport,
    elements: Vec<(Rect, PageElement)>,
}

impl StaticPageRasterizer {
    pub fn new(page: RgbaImage) -> Self {
        let viewport = Viewport::new(0.0, 0.0, page.width() as f64, page.height() as f64);
        Self {
            page,
            viewport,
            elements: Vec::new(),
        }
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    /// Register an element occupying `bounds` in document coordinates
    pub fn with_element(mut self, bounds: Rect, element: PageElement) -> Self {
        self.elements.push((bounds, element));
        self
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn page_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.page.width() as f64, self.page.height() as f64)
    }
}

#[async_trait]
impl Rasterizer for StaticPageRasterizer {
    fn page_size(&self) -> (f64, f64) {
        (self.page.width() as f64, self.page.height() as f64)
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    async fn rasterize(&self, request: &RasterRequest) -> Result<RgbaImage> {
        let area = request.area;
        let width = area.width.round() as i64;
        let height = area.height.round() as i64;
        if width <= 0 || height <= 0 {
            return Err(CaptureError::rasterize(format!(
                "empty capture area {}x{}",
                area.width, area.height
            )));
        }
        if !(request.scale.is_finite() && request.scale > 0.0) {
            return Err(CaptureError::rasterize(format!(
                "invalid scale {}",
                request.scale
            )));
        }

        let fill = Rgba(request.background.unwrap_or([0, 0, 0, 0]));
        let mut out = RgbaImage::from_pixel(width as u32, height as u32, fill);

        if let Some(visible) = area.intersect(self.page_rect()) {
            let src = imageops::crop_imm(
                &self.page,
                visible.left as u32,
                visible.top as u32,
                visible.width.round() as u32,
                visible.height.round() as u32,
            )
            .to_image();
            let dx = (visible.left - area.left).round() as i64;
            let dy = (visible.top - area.top).round() as i64;
            if request.background.is_some() {
                imageops::overlay(&mut out, &src, dx, dy);
            } else {
                imageops::replace(&mut out, &src, dx, dy);
            }
        }

        for (bounds, element) in &self.elements {
            if !request.filter.ignores(element) {
                continue;
            }
            let Some(hidden) = bounds.intersect(area) else {
                continue;
            };
            log::debug!("Skipping {:?} element at {:?}", element.kind, hidden);
            let x0 = (hidden.left - area.left).round() as u32;
            let y0 = (hidden.top - area.top).round() as u32;
            let x1 = ((hidden.right() - area.left).round() as u32).min(out.width());
            let y1 = ((hidden.bottom() - area.top).round() as u32).min(out.height());
            for y in y0..y1 {
                for x in x0..x1 {
                    out.put_pixel(x, y, fill);
                }
            }
        }

        if (request.scale - 1.0).abs() > f32::EPSILON {
            let w = ((width as f32) * request.scale).round().max(1.0) as u32;
            let h = ((height as f32) * request.scale).round().max(1.0) as u32;
            out = imageops::resize(&out, w, h, imageops::FilterType::Triangle);
        }

        Ok(out)
    }
}
