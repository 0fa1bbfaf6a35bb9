//! Selection state machine
//!
//! Idle → Selecting → Confirming → Capturing → Resolved | Cancelled.
//! Every transition happens inside [`SelectionMachine::handle_at`] in response
//! to exactly one input event, so transitions never interleave. The machine
//! never captures anything itself: entering Capturing yields
//! [`Step::Capture`] and the driver reports back through
//! [`SelectionMachine::finish_capture`].

use std::sync::Arc;

use tokio::time::Instant;

use crate::config::SelectionOptions;
use crate::domain::{Phase, Point, Rect, SelectionRegion, Shape, Viewport, compute_box};
use crate::preferences::{PreferenceStore, Preferences};
use crate::render::mask_path;

use super::keys::{self, InputEvent, KeyAction};
use super::overlay::{Overlay, Renderer};

/// Result of feeding one event to the machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// Nothing for the driver to do
    Continue,
    /// The selection is committed; capture this region
    Capture(SelectionRegion),
    /// The selection was cancelled; the overlay is already gone
    Cancelled,
    /// The capture finished; the overlay is already gone
    Resolved,
}

/// Grab point while repositioning a confirmed box
#[derive(Debug, Clone, Copy)]
struct DragGrab {
    /// Pointer position minus the box origin at grab time
    offset: Point,
}

pub struct SelectionMachine<R: Renderer> {
    phase: Phase,
    options: SelectionOptions,
    preferences: Preferences,
    store: Arc<dyn PreferenceStore>,
    overlay: Overlay<R>,
    viewport: Viewport,
    /// Whole document, used to keep repositioned boxes on the page
    page: Rect,
    anchor: Option<Point>,
    last_pointer: Option<Point>,
    constrain: bool,
    region: Option<SelectionRegion>,
    drag: Option<DragGrab>,
}

impl<R: Renderer> SelectionMachine<R> {
    pub fn new(
        renderer: R,
        options: SelectionOptions,
        store: Arc<dyn PreferenceStore>,
        viewport: Viewport,
        page: Rect,
    ) -> Self {
        let preferences = Preferences::load(store.as_ref());
        let overlay = Overlay::new(renderer, &options);
        Self {
            phase: Phase::Idle,
            options,
            preferences,
            store,
            overlay,
            viewport,
            page,
            anchor: None,
            last_pointer: None,
            constrain: false,
            region: None,
            drag: None,
        }
    }

    /// Show the overlay and wait for the first pointer-down
    pub fn start(&mut self) {
        log::debug!(
            "Selection started (shape={:?}, immediate={})",
            self.preferences.shape,
            self.options.immediate_capture
        );
        self.overlay.show();
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn region(&self) -> Option<&SelectionRegion> {
        self.region.as_ref()
    }

    pub fn shape(&self) -> Shape {
        self.preferences.shape
    }

    pub fn is_confirmation_mode(&self) -> bool {
        self.phase == Phase::Confirming
    }

    pub fn overlay(&self) -> &Overlay<R> {
        &self.overlay
    }

    pub fn handle(&mut self, event: InputEvent) -> Step {
        self.handle_at(event, Instant::now())
    }

    /// Feed one event; `now` drives the badge timer
    pub fn handle_at(&mut self, event: InputEvent, now: Instant) -> Step {
        if self.phase.is_terminal() {
            return self.terminal_step();
        }
        self.overlay.refresh(now);

        match event {
            InputEvent::PointerDown(pos, mods) => {
                self.pointer_down(self.viewport.to_document(pos), mods.constrain(), now)
            }
            InputEvent::PointerMove(pos, mods) => {
                self.pointer_move(self.viewport.to_document(pos), mods.constrain(), now)
            }
            InputEvent::PointerUp(pos, mods) => {
                self.pointer_up(self.viewport.to_document(pos), mods.constrain(), now)
            }
            InputEvent::KeyDown(key, mods) => match keys::handle_key_down(self.phase, key, mods) {
                Some(action) => self.apply(action, now),
                None => Step::Continue,
            },
            InputEvent::KeyUp(key, mods) => match keys::handle_key_up(key, mods) {
                Some(action) => self.apply(action, now),
                None => Step::Continue,
            },
            InputEvent::Accept => self.accept_selection(),
            InputEvent::Recapture => self.recapture(),
            InputEvent::Cancel => self.cancel(),
            InputEvent::ViewportChanged(viewport) => {
                self.viewport = viewport;
                self.redraw_selection();
                Step::Continue
            }
        }
    }

    fn apply(&mut self, action: KeyAction, now: Instant) -> Step {
        match action {
            KeyAction::Cancel => self.cancel(),
            KeyAction::Accept => self.accept_selection(),
            KeyAction::Recapture => self.recapture(),
            KeyAction::SetShape(shape) => {
                self.set_shape(shape, now);
                Step::Continue
            }
            KeyAction::Constrain(on) => {
                self.set_constrain(on, now);
                Step::Continue
            }
        }
    }

    fn pointer_down(&mut self, pos: Point, constrain: bool, now: Instant) -> Step {
        match self.phase {
            Phase::Idle | Phase::Selecting if self.anchor.is_none() => {
                self.set_constrain(constrain, now);
                self.anchor = Some(pos);
                self.last_pointer = Some(pos);
                self.region = Some(SelectionRegion::new(
                    Rect::new(pos.x, pos.y, 0.0, 0.0),
                    self.preferences.shape,
                ));
                self.phase = Phase::Selecting;
                self.overlay.set_instructions_visible(false);
                self.redraw_selection();
            }
            Phase::Confirming => {
                if let Some(region) = self.region
                    && region.rect.contains_point(pos)
                {
                    self.drag = Some(DragGrab {
                        offset: Point::new(pos.x - region.rect.left, pos.y - region.rect.top),
                    });
                }
            }
            _ => {}
        }
        Step::Continue
    }

    fn pointer_move(&mut self, pos: Point, constrain: bool, now: Instant) -> Step {
        match self.phase {
            Phase::Selecting if self.anchor.is_some() => {
                self.last_pointer = Some(pos);
                self.set_constrain(constrain, now);
                self.recompute_box();
            }
            Phase::Confirming => {
                if let (Some(grab), Some(region)) = (self.drag, self.region.as_mut()) {
                    let moved = Rect {
                        left: pos.x - grab.offset.x,
                        top: pos.y - grab.offset.y,
                        ..region.rect
                    };
                    region.rect = moved.clamp_within(self.page);
                    self.redraw_selection();
                }
            }
            _ => {}
        }
        Step::Continue
    }

    fn pointer_up(&mut self, pos: Point, constrain: bool, now: Instant) -> Step {
        match self.phase {
            Phase::Selecting if self.anchor.is_some() => {
                self.last_pointer = Some(pos);
                self.set_constrain(constrain, now);
                self.recompute_box();

                let Some(region) = self.region.as_mut() else {
                    return Step::Continue;
                };
                if !region.rect.meets_minimum(self.options.min_size) {
                    log::debug!(
                        "Selection {}x{} below minimum {}, resetting",
                        region.rect.width,
                        region.rect.height,
                        self.options.min_size
                    );
                    self.reset_to(Phase::Idle);
                    return Step::Continue;
                }

                region.confirmed = true;
                if self.options.immediate_capture {
                    self.begin_capture()
                } else {
                    self.phase = Phase::Confirming;
                    self.overlay.set_confirming(true);
                    Step::Continue
                }
            }
            Phase::Confirming => {
                self.drag = None;
                Step::Continue
            }
            _ => Step::Continue,
        }
    }

    /// Commit the confirmed selection. No-op outside confirmation mode.
    pub fn accept_selection(&mut self) -> Step {
        if self.phase != Phase::Confirming {
            return Step::Continue;
        }
        self.begin_capture()
    }

    /// Drop the current box and start selecting again on the same overlay.
    /// No-op once capturing has begun.
    pub fn recapture(&mut self) -> Step {
        if !matches!(self.phase, Phase::Idle | Phase::Selecting | Phase::Confirming) {
            return Step::Continue;
        }
        self.reset_to(Phase::Selecting);
        Step::Continue
    }

    /// Cancel from any non-terminal phase and tear the overlay down
    pub fn cancel(&mut self) -> Step {
        if self.phase.is_terminal() {
            return self.terminal_step();
        }
        log::debug!("Selection cancelled in phase {:?}", self.phase);
        self.phase = Phase::Cancelled;
        self.region = None;
        self.drag = None;
        self.overlay.teardown();
        Step::Cancelled
    }

    /// Report the outcome of the capture started by [`Step::Capture`]
    pub fn finish_capture(&mut self, succeeded: bool) -> Step {
        if self.phase != Phase::Capturing {
            return self.terminal_step();
        }
        self.phase = if succeeded {
            Phase::Resolved
        } else {
            Phase::Cancelled
        };
        self.region = None;
        self.overlay.teardown();
        self.terminal_step()
    }

    pub fn set_shape(&mut self, shape: Shape, now: Instant) {
        if !self.phase.accepts_shape_toggle() {
            return;
        }
        self.preferences.shape = shape;
        if let Err(err) = self.preferences.save(self.store.as_ref()) {
            log::warn!("Failed to persist shape preference: {}", err);
        }
        if let Some(region) = self.region.as_mut() {
            region.shape = shape;
        }
        self.overlay.set_shape_active(shape.label(self.constrain), now);
        self.redraw_selection();
    }

    fn set_constrain(&mut self, on: bool, now: Instant) {
        if self.constrain == on {
            return;
        }
        self.constrain = on;
        if self.phase == Phase::Selecting && self.anchor.is_some() {
            self.recompute_box();
            self.overlay
                .set_shape_active(self.preferences.shape.label(on), now);
        }
    }

    fn recompute_box(&mut self) {
        let (Some(anchor), Some(last)) = (self.anchor, self.last_pointer) else {
            return;
        };
        if let Some(region) = self.region.as_mut() {
            region.rect = compute_box(anchor, last, self.constrain);
        }
        self.redraw_selection();
    }

    fn begin_capture(&mut self) -> Step {
        let Some(region) = self.region else {
            return Step::Continue;
        };
        self.phase = Phase::Capturing;
        self.drag = None;
        // The overlay must not end up in the capture
        self.overlay.hide();
        log::debug!("Capturing region {:?}", region);
        Step::Capture(region)
    }

    fn reset_to(&mut self, phase: Phase) {
        self.phase = phase;
        self.anchor = None;
        self.last_pointer = None;
        self.region = None;
        self.drag = None;
        self.overlay.clear_selection();
        self.overlay
            .set_instructions_visible(self.options.show_instructions);
    }

    fn redraw_selection(&mut self) {
        if let Some(region) = self.region {
            let mask = mask_path(&region, &self.viewport, self.options.mask_segments);
            let rect = self.viewport.rect_to_viewport(region.rect);
            self.overlay.set_selection(rect, region.shape, mask);
        }
    }

    fn terminal_step(&self) -> Step {
        match self.phase {
            Phase::Resolved => Step::Resolved,
            Phase::Cancelled => Step::Cancelled,
            _ => Step::Continue,
        }
    }
}
