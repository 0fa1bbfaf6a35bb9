//! Interactive region selection: input mapping, overlay and state machine

pub mod keys;
pub mod machine;
pub mod overlay;

pub use keys::{InputEvent, Key, KeyAction, Modifiers, Named};
pub use machine::{SelectionMachine, Step};
pub use overlay::{LogRenderer, Overlay, OverlayFrame, Renderer};
