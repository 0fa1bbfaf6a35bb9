//! Configuration for selection, capture and recording
//!
//! [`Config`] is the serializable form; every field is defaulted so a partial
//! JSON file is enough. [`Config::validate`] turns it into the immutable option
//! structs the components take at construction.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, Result};
use crate::render::geometry::ellipse;

/// Image format for screenshot artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
        }
    }
}

/// Options for the interactive region selection
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionOptions {
    /// Smallest accepted width/height; smaller releases reset the selection
    pub min_size: f64,
    /// Skip the confirmation step and capture on release
    pub immediate_capture: bool,
    /// Polygon segments used for the oval mask
    pub mask_segments: usize,
    /// How long the shape badge stays visible after a toggle
    pub badge_duration: Duration,
    pub show_dimensions: bool,
    pub show_instructions: bool,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            min_size: 10.0,
            immediate_capture: false,
            mask_segments: ellipse::DEFAULT_SEGMENTS,
            badge_duration: Duration::from_millis(800),
            show_dimensions: true,
            show_instructions: true,
        }
    }
}

/// Options for rasterizing and encoding screenshots
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOptions {
    pub format: ImageFormat,
    /// Encoder quality 1-100 (JPEG only)
    pub quality: u8,
    /// Device pixel scale passed to the rasterizer
    pub scale: f32,
    /// Background painted behind transparent page areas (RGBA)
    pub background: Option<[u8; 4]>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            format: ImageFormat::Png,
            quality: 92,
            scale: 1.0,
            background: None,
        }
    }
}

/// Constraints passed along with the microphone request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Options for both recording engines
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingOptions {
    /// Wall-clock ceiling; the engine stops itself when it elapses
    pub max_duration: Option<Duration>,
    /// Interval at which the incremental encoder emits chunks
    pub timeslice: Duration,
    pub microphone: bool,
    pub system_audio: bool,
    /// Treat "video without any audio" as a hard failure
    pub require_audio: bool,
    pub audio_constraints: AudioConstraints,
    /// Preferred container/codec strings for video, best first
    pub video_mime_types: Vec<String>,
    /// Preferred container/codec strings for audio, best first
    pub audio_mime_types: Vec<String>,
    pub video_bits_per_second: Option<u32>,
    pub audio_bits_per_second: Option<u32>,
    /// Sample rate of the sample-accurate pipeline
    pub sample_rate: u32,
    /// Output channel count of the sample-accurate pipeline (1 or 2)
    pub channels: u16,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            max_duration: None,
            timeslice: Duration::from_millis(100),
            microphone: true,
            system_audio: true,
            require_audio: false,
            audio_constraints: AudioConstraints::default(),
            video_mime_types: default_video_mime_types(),
            audio_mime_types: default_audio_mime_types(),
            video_bits_per_second: Some(2_500_000),
            audio_bits_per_second: Some(128_000),
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

fn default_video_mime_types() -> Vec<String> {
    [
        "video/webm;codecs=vp9,opus",
        "video/webm;codecs=vp8,opus",
        "video/webm",
        "video/mp4",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_audio_mime_types() -> Vec<String> {
    ["audio/webm;codecs=opus", "audio/webm", "audio/ogg;codecs=opus", "audio/mp4"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Serializable configuration persisted or shipped alongside the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub min_selection_size: f64,
    pub immediate_capture: bool,
    pub oval_segments: usize,
    pub shape_badge_ms: u64,
    pub show_dimensions: bool,
    pub show_instructions: bool,
    pub image_format: ImageFormat,
    pub image_quality: u8,
    pub capture_scale: f32,
    pub capture_background: Option<[u8; 4]>,
    /// Recording ceiling in seconds (None = unlimited)
    pub max_recording_secs: Option<u64>,
    pub timeslice_ms: u64,
    pub record_microphone: bool,
    pub record_system_audio: bool,
    pub require_audio: bool,
    pub audio_constraints: AudioConstraints,
    pub video_mime_types: Vec<String>,
    pub audio_mime_types: Vec<String>,
    pub video_bits_per_second: Option<u32>,
    pub audio_bits_per_second: Option<u32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for Config {
    fn default() -> Self {
        let selection = SelectionOptions::default();
        let capture = CaptureOptions::default();
        let recording = RecordingOptions::default();
        Self {
            min_selection_size: selection.min_size,
            immediate_capture: selection.immediate_capture,
            oval_segments: selection.mask_segments,
            shape_badge_ms: selection.badge_duration.as_millis() as u64,
            show_dimensions: selection.show_dimensions,
            show_instructions: selection.show_instructions,
            image_format: capture.format,
            image_quality: capture.quality,
            capture_scale: capture.scale,
            capture_background: capture.background,
            max_recording_secs: None,
            timeslice_ms: recording.timeslice.as_millis() as u64,
            record_microphone: recording.microphone,
            record_system_audio: recording.system_audio,
            require_audio: recording.require_audio,
            audio_constraints: recording.audio_constraints,
            video_mime_types: recording.video_mime_types,
            audio_mime_types: recording.audio_mime_types,
            video_bits_per_second: recording.video_bits_per_second,
            audio_bits_per_second: recording.audio_bits_per_second,
            sample_rate: recording.sample_rate,
            channels: recording.channels,
        }
    }
}

/// Fully validated options for every component
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    pub selection: SelectionOptions,
    pub capture: CaptureOptions,
    pub recording: RecordingOptions,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load_from(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&json).map_err(|e| {
            CaptureError::invalid_config(format!("{}: {}", path.display(), e))
        })?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Validate every field and produce the immutable option structs
    pub fn validate(&self) -> Result<ValidatedConfig> {
        if !(self.min_selection_size.is_finite() && self.min_selection_size >= 0.0) {
            return Err(CaptureError::invalid_config(format!(
                "min_selection_size must be a non-negative number, got {}",
                self.min_selection_size
            )));
        }
        if !(ellipse::MIN_SEGMENTS..=ellipse::MAX_SEGMENTS).contains(&self.oval_segments) {
            return Err(CaptureError::invalid_config(format!(
                "oval_segments must be between {} and {}, got {}",
                ellipse::MIN_SEGMENTS,
                ellipse::MAX_SEGMENTS,
                self.oval_segments
            )));
        }
        if !(1..=100).contains(&self.image_quality) {
            return Err(CaptureError::invalid_config(format!(
                "image_quality must be between 1 and 100, got {}",
                self.image_quality
            )));
        }
        if !(self.capture_scale.is_finite() && self.capture_scale > 0.0) {
            return Err(CaptureError::invalid_config(format!(
                "capture_scale must be positive, got {}",
                self.capture_scale
            )));
        }
        if self.timeslice_ms == 0 {
            return Err(CaptureError::invalid_config("timeslice_ms must be positive"));
        }
        if self.max_recording_secs == Some(0) {
            return Err(CaptureError::invalid_config(
                "max_recording_secs must be positive when set",
            ));
        }
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(CaptureError::invalid_config(format!(
                "sample_rate must be between 8000 and 192000, got {}",
                self.sample_rate
            )));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(CaptureError::invalid_config(format!(
                "channels must be 1 or 2, got {}",
                self.channels
            )));
        }
        if self.video_mime_types.is_empty() || self.audio_mime_types.is_empty() {
            return Err(CaptureError::invalid_config(
                "mime type preference lists must not be empty",
            ));
        }

        Ok(ValidatedConfig {
            selection: SelectionOptions {
                min_size: self.min_selection_size,
                immediate_capture: self.immediate_capture,
                mask_segments: self.oval_segments,
                badge_duration: Duration::from_millis(self.shape_badge_ms),
                show_dimensions: self.show_dimensions,
                show_instructions: self.show_instructions,
            },
            capture: CaptureOptions {
                format: self.image_format,
                quality: self.image_quality,
                scale: self.capture_scale,
                background: self.capture_background,
            },
            recording: RecordingOptions {
                max_duration: self.max_recording_secs.map(Duration::from_secs),
                timeslice: Duration::from_millis(self.timeslice_ms),
                microphone: self.record_microphone,
                system_audio: self.record_system_audio,
                require_audio: self.require_audio,
                audio_constraints: self.audio_constraints,
                video_mime_types: self.video_mime_types.clone(),
                audio_mime_types: self.audio_mime_types.clone(),
                video_bits_per_second: self.video_bits_per_second,
                audio_bits_per_second: self.audio_bits_per_second,
                sample_rate: self.sample_rate,
                channels: self.channels,
            },
        })
    }
}
