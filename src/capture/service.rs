//! Screenshot capture service
//!
//! Each capture emits a start notification, rasterizes the target through the
//! injected [`Rasterizer`], masks ovals, encodes, and emits completion or
//! failure. Captures on one service are mutually exclusive: a call made while
//! another is in flight fails with [`CaptureError::OperationInProgress`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::CaptureOptions;
use crate::domain::{CaptureTarget, EncodedArtifact, MediaKind, Rect, Shape};
use crate::error::{CaptureError, Result};
use crate::render::image::apply_oval_mask;

use super::encode::encode_image;
use super::raster::{ElementFilter, RasterRequest, Rasterizer};

/// Progress notifications for one capture
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Started { target: &'static str },
    Completed { bytes: usize, mime_type: &'static str },
    Failed { message: String },
}

pub type CaptureListener = Arc<dyn Fn(&CaptureEvent) + Send + Sync>;

/// Exclusive claim on a [`CaptureService`]; released on drop
pub struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct CaptureService {
    rasterizer: Arc<dyn Rasterizer>,
    options: CaptureOptions,
    busy: AtomicBool,
    listener: Option<CaptureListener>,
}

impl CaptureService {
    pub fn new(rasterizer: Arc<dyn Rasterizer>, options: CaptureOptions) -> Self {
        Self {
            rasterizer,
            options,
            busy: AtomicBool::new(false),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: CaptureListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn rasterizer(&self) -> &Arc<dyn Rasterizer> {
        &self.rasterizer
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claim the service, failing fast if a capture is already running
    pub fn try_acquire(&self) -> Result<BusyGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("Rejected capture: another capture is in progress");
            return Err(CaptureError::in_progress("capture"));
        }
        Ok(BusyGuard { flag: &self.busy })
    }

    pub async fn capture_full_page(&self) -> Result<EncodedArtifact> {
        let guard = self.try_acquire()?;
        self.capture_with(&guard, CaptureTarget::FullPage).await
    }

    pub async fn capture_viewport(&self) -> Result<EncodedArtifact> {
        let guard = self.try_acquire()?;
        self.capture_with(&guard, CaptureTarget::Viewport).await
    }

    /// Capture a document-space area, optionally clipped to the inscribed ellipse
    pub async fn capture_area(
        &self,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        is_oval: bool,
    ) -> Result<EncodedArtifact> {
        let guard = self.try_acquire()?;
        let shape = if is_oval { Shape::Oval } else { Shape::Rectangle };
        self.capture_with(&guard, CaptureTarget::Area(Rect::new(x, y, width, height), shape))
            .await
    }

    /// Run one capture while holding `guard`
    pub async fn capture_with(
        &self,
        _guard: &BusyGuard<'_>,
        target: CaptureTarget,
    ) -> Result<EncodedArtifact> {
        self.emit(&CaptureEvent::Started {
            target: target.name(),
        });
        match self.run(target).await {
            Ok(artifact) => {
                log::info!(
                    "Captured {} ({} bytes, {})",
                    target.name(),
                    artifact.len(),
                    artifact.mime_type
                );
                self.emit(&CaptureEvent::Completed {
                    bytes: artifact.len(),
                    mime_type: self.options.format.mime_type(),
                });
                Ok(artifact)
            }
            Err(err) => {
                log::error!("Capture of {} failed: {}", target.name(), err);
                self.emit(&CaptureEvent::Failed {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn run(&self, target: CaptureTarget) -> Result<EncodedArtifact> {
        let (area, oval) = match target {
            CaptureTarget::FullPage => {
                let (w, h) = self.rasterizer.page_size();
                (Rect::new(0.0, 0.0, w, h), false)
            }
            CaptureTarget::Viewport => (self.rasterizer.viewport().document_rect(), false),
            CaptureTarget::Area(rect, shape) => (rect, shape.is_oval()),
        };

        let request = RasterRequest {
            area,
            scale: self.options.scale,
            background: self.options.background,
            filter: ElementFilter::default(),
        };
        let mut bitmap = self.rasterizer.rasterize(&request).await?;
        if oval {
            bitmap = apply_oval_mask(bitmap);
        }

        let format = self.options.format;
        let bytes = encode_image(&bitmap, format, self.options.quality, self.options.background)?;
        Ok(EncodedArtifact::new(MediaKind::Image, bytes, format.mime_type(), 0))
    }

    fn emit(&self, event: &CaptureEvent) {
        if let Some(listener) = &self.listener {
            listener(event);
        }
    }
}
