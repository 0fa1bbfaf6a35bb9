//! Input events and keyboard shortcuts for the selection UI

use crate::domain::{Phase, Point, Shape, Viewport};

/// Named keys the selection UI reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Named {
    Escape,
    Enter,
    Control,
    Meta,
    Shift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Named(Named),
    Character(char),
}

/// Modifier state captured with every input event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub control: bool,
    pub meta: bool,
    pub shift: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        control: false,
        meta: false,
        shift: false,
    };

    pub const CONTROL: Modifiers = Modifiers {
        control: true,
        meta: false,
        shift: false,
    };

    /// Ctrl on most platforms, Cmd on macOS; either forces square/circle mode
    pub fn constrain(&self) -> bool {
        self.control || self.meta
    }
}

/// Input delivered to the selection state machine.
///
/// Pointer positions are viewport-relative, as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown(Point, Modifiers),
    PointerMove(Point, Modifiers),
    PointerUp(Point, Modifiers),
    KeyDown(Key, Modifiers),
    KeyUp(Key, Modifiers),
    /// Toolbar "Accept" button
    Accept,
    /// Toolbar "Recapture" button
    Recapture,
    /// Toolbar "Cancel" button
    Cancel,
    /// The page scrolled or the window resized
    ViewportChanged(Viewport),
}

impl InputEvent {
    pub fn pointer_down(x: f64, y: f64) -> Self {
        InputEvent::PointerDown(Point::new(x, y), Modifiers::NONE)
    }

    pub fn pointer_move(x: f64, y: f64) -> Self {
        InputEvent::PointerMove(Point::new(x, y), Modifiers::NONE)
    }

    pub fn pointer_up(x: f64, y: f64) -> Self {
        InputEvent::PointerUp(Point::new(x, y), Modifiers::NONE)
    }

    pub fn key(key: Key) -> Self {
        InputEvent::KeyDown(key, Modifiers::NONE)
    }
}

/// What a key press asks the machine to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Cancel,
    Accept,
    Recapture,
    SetShape(Shape),
    Constrain(bool),
}

/// Map a key press to an action for the current phase
pub fn handle_key_down(phase: Phase, key: Key, modifiers: Modifiers) -> Option<KeyAction> {
    let confirming = phase == Phase::Confirming;

    match key {
        Key::Named(Named::Escape) if !phase.is_terminal() => Some(KeyAction::Cancel),
        Key::Named(Named::Enter) if confirming => Some(KeyAction::Accept),
        Key::Named(Named::Control) | Key::Named(Named::Meta) => Some(KeyAction::Constrain(true)),
        Key::Character(c) if c.eq_ignore_ascii_case(&'r') && confirming && !modifiers.constrain() => {
            Some(KeyAction::Recapture)
        }
        Key::Character(c) if phase.accepts_shape_toggle() => c
            .to_digit(10)
            .and_then(|d| Shape::from_digit(d as u8))
            .map(KeyAction::SetShape),
        _ => None,
    }
}

/// Map a key release to an action
pub fn handle_key_up(key: Key, modifiers: Modifiers) -> Option<KeyAction> {
    match key {
        // Releasing one of Ctrl/Cmd while the other is still held keeps the constraint
        Key::Named(Named::Control) | Key::Named(Named::Meta) => {
            Some(KeyAction::Constrain(modifiers.constrain()))
        }
        _ => None,
    }
}
