//! Region selection, screenshot capture and audio/video recording
//!
//! The crate never touches a display server or a browser directly. Every
//! platform capability is injected: the page [`capture::Rasterizer`], the
//! overlay [`selection::Renderer`], the capture and encoding primitives in
//! [`screencast::platform`], and the [`preferences::PreferenceStore`].

pub mod cancel;
pub mod capture;
pub mod config;
pub mod domain;
pub mod error;
pub mod finalize;
pub mod preferences;
pub mod render;
pub mod screencast;
pub mod selection;

pub use cancel::Cancellation;
pub use config::{CaptureOptions, Config, ImageFormat, RecordingOptions, SelectionOptions, ValidatedConfig};
pub use domain::{CaptureTarget, EncodedArtifact, MediaKind, Rect, Shape};
pub use error::{CaptureError, Result, SourceKind};
