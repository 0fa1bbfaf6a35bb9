//! Selection types for region capture

use serde::{Deserialize, Serialize};

use super::geometry::Rect;

/// Shape of the selected region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Shape {
    #[default]
    Rectangle,
    Oval,
}

impl Shape {
    /// Label shown in the shape badge; constrained shapes read as Square/Circle
    pub fn label(self, constrained: bool) -> &'static str {
        match (self, constrained) {
            (Shape::Rectangle, false) => "Rectangle",
            (Shape::Rectangle, true) => "Square",
            (Shape::Oval, false) => "Oval",
            (Shape::Oval, true) => "Circle",
        }
    }

    /// Shape bound to a digit key (1 = Rectangle, 2 = Oval)
    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            1 => Some(Shape::Rectangle),
            2 => Some(Shape::Oval),
            _ => None,
        }
    }

    pub fn is_oval(self) -> bool {
        self == Shape::Oval
    }
}

/// The region the user is selecting, in document coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionRegion {
    pub rect: Rect,
    pub shape: Shape,
    /// Set once the selection enters confirmation; the size never changes after that
    pub confirmed: bool,
}

impl SelectionRegion {
    pub fn new(rect: Rect, shape: Shape) -> Self {
        Self {
            rect,
            shape,
            confirmed: false,
        }
    }

    pub fn left(&self) -> f64 {
        self.rect.left
    }

    pub fn top(&self) -> f64 {
        self.rect.top
    }

    pub fn width(&self) -> f64 {
        self.rect.width
    }

    pub fn height(&self) -> f64 {
        self.rect.height
    }

    /// Rounded pixel dimensions for the on-screen readout
    pub fn dimensions(&self) -> (u32, u32) {
        (
            self.rect.width.round().max(0.0) as u32,
            self.rect.height.round().max(0.0) as u32,
        )
    }
}

/// Lifecycle of one interactive selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Selecting,
    Confirming,
    Capturing,
    Resolved,
    Cancelled,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Resolved | Phase::Cancelled)
    }

    /// Shape toggles are accepted in these phases only
    pub fn accepts_shape_toggle(self) -> bool {
        matches!(self, Phase::Idle | Phase::Selecting | Phase::Confirming)
    }
}

/// What a capture call should rasterize
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureTarget {
    /// The entire scrollable document
    FullPage,
    /// The currently visible part of the document
    Viewport,
    /// An explicit document-space area, optionally masked to an ellipse
    Area(Rect, Shape),
}

impl CaptureTarget {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureTarget::FullPage => "full-page",
            CaptureTarget::Viewport => "viewport",
            CaptureTarget::Area(..) => "area",
        }
    }
}
