//! Selection overlay: dimming layer, selection box, shape badge and readout
//!
//! The overlay holds no business logic. It keeps the last state handed to it
//! and pushes a complete [`OverlayFrame`] to the injected [`Renderer`] on every
//! change.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::SelectionOptions;
use crate::domain::{Rect, Shape};
use crate::render::MaskPath;

/// Rendering surface for the overlay (DOM, canvas, test recorder, ...)
pub trait Renderer: Send {
    /// Create the surfaces; called once before the first update
    fn mount(&mut self);
    /// Draw the given state
    fn update(&mut self, frame: &OverlayFrame);
    /// Destroy the surfaces; called exactly once
    fn unmount(&mut self);
}

/// Everything a renderer needs to draw one state of the overlay
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OverlayFrame {
    pub visible: bool,
    /// Inverse mask for the dimming layer, in viewport coordinates
    pub mask: Option<MaskPath>,
    /// Selection box indicator, in viewport coordinates
    pub selection: Option<(Rect, Shape)>,
    /// Shape badge text while it is flashing
    pub badge: Option<&'static str>,
    pub instructions: bool,
    /// "W × H" readout
    pub dimensions: Option<(u32, u32)>,
    /// Show the Accept / Recapture / Cancel controls
    pub confirming: bool,
}

impl OverlayFrame {
    pub fn dimensions_label(&self) -> Option<String> {
        self.dimensions.map(|(w, h)| format!("{w} × {h}"))
    }
}

pub struct Overlay<R: Renderer> {
    renderer: R,
    frame: OverlayFrame,
    badge_until: Option<Instant>,
    badge_duration: Duration,
    show_dimensions: bool,
    mounted: bool,
    torn_down: bool,
}

impl<R: Renderer> Overlay<R> {
    pub fn new(renderer: R, options: &SelectionOptions) -> Self {
        Self {
            renderer,
            frame: OverlayFrame {
                instructions: options.show_instructions,
                ..OverlayFrame::default()
            },
            badge_until: None,
            badge_duration: options.badge_duration,
            show_dimensions: options.show_dimensions,
            mounted: false,
            torn_down: false,
        }
    }

    pub fn frame(&self) -> &OverlayFrame {
        &self.frame
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn show(&mut self) {
        if self.torn_down {
            return;
        }
        if !self.mounted {
            self.renderer.mount();
            self.mounted = true;
        }
        self.frame.visible = true;
        self.render();
    }

    pub fn hide(&mut self) {
        self.frame.visible = false;
        self.render();
    }

    pub fn set_instructions_visible(&mut self, visible: bool) {
        self.frame.instructions = visible;
        self.render();
    }

    /// Flash the badge for the configured duration starting at `now`
    pub fn set_shape_active(&mut self, label: &'static str, now: Instant) {
        self.frame.badge = Some(label);
        self.badge_until = Some(now + self.badge_duration);
        self.render();
    }

    pub fn set_selection(&mut self, rect: Rect, shape: Shape, mask: MaskPath) {
        self.frame.selection = Some((rect, shape));
        self.frame.mask = Some(mask);
        self.frame.dimensions = self
            .show_dimensions
            .then(|| (rect.width.round().max(0.0) as u32, rect.height.round().max(0.0) as u32));
        self.render();
    }

    pub fn clear_selection(&mut self) {
        self.frame.selection = None;
        self.frame.mask = None;
        self.frame.dimensions = None;
        self.frame.confirming = false;
        self.render();
    }

    pub fn set_confirming(&mut self, confirming: bool) {
        self.frame.confirming = confirming;
        self.render();
    }

    /// Drop the badge once its time is up
    pub fn refresh(&mut self, now: Instant) {
        if let Some(until) = self.badge_until
            && now >= until
        {
            self.badge_until = None;
            self.frame.badge = None;
            self.render();
        }
    }

    /// Unmount the surfaces; later calls are no-ops
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.frame.visible = false;
        if self.mounted {
            self.renderer.unmount();
            self.mounted = false;
        }
        log::debug!("Selection overlay torn down");
    }

    fn render(&mut self) {
        if self.mounted && !self.torn_down {
            self.renderer.update(&self.frame);
        }
    }
}

impl<R: Renderer> Drop for Overlay<R> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Renderer that only logs what it would draw
#[derive(Debug, Default)]
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn mount(&mut self) {
        log::debug!("overlay: mount");
    }

    fn update(&mut self, frame: &OverlayFrame) {
        log::debug!(
            "overlay: visible={} selection={:?} badge={:?} size={:?} confirming={}",
            frame.visible,
            frame.selection,
            frame.badge,
            frame.dimensions_label(),
            frame.confirming
        );
    }

    fn unmount(&mut self) {
        log::debug!("overlay: unmount");
    }
}
