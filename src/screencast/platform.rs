//! Platform capture, mixing and encoding primitives
//!
//! The recorders orchestrate these; they never implement them. Hosts plug in
//! their own implementations (browser bindings, PipeWire, test fakes).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::AudioConstraints;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A block of raw float samples, one `Vec` per channel
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioBlock {
    pub channels: Vec<Vec<f32>>,
}

impl AudioBlock {
    pub fn mono(samples: Vec<f32>) -> Self {
        Self {
            channels: vec![samples],
        }
    }

    pub fn stereo(left: Vec<f32>, right: Vec<f32>) -> Self {
        Self {
            channels: vec![left, right],
        }
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }
}

/// Called when a track is ended from outside (permission revoked, device unplugged)
pub type EndedCallback = Box<dyn Fn() + Send + Sync>;

/// A live capture track
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> TrackKind;
    fn set_enabled(&self, enabled: bool);
    fn is_enabled(&self) -> bool;
    /// Stop capturing. Does not fire the ended callbacks.
    fn stop(&self);
    fn on_ended(&self, callback: EndedCallback);
    /// Raw samples for the sample-accurate pipeline; `None` if the platform
    /// cannot tap this track
    fn sample_blocks(&self) -> Option<crossbeam_channel::Receiver<AudioBlock>>;
}

impl fmt::Debug for dyn MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Tracks returned by one capture request
#[derive(Clone, Default, Debug)]
pub struct MediaStream {
    pub tracks: Vec<Arc<dyn MediaTrack>>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self { tracks }
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &Arc<dyn MediaTrack>> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &Arc<dyn MediaTrack>> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }
}

/// Capture prompts. A refused prompt returns `PermissionDenied`.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Screen/window/tab video, with its audio when `with_audio` is set and granted
    async fn display(&self, with_audio: bool) -> Result<MediaStream>;

    async fn microphone(&self, constraints: &AudioConstraints) -> Result<MediaStream>;

    /// System (loopback) audio without video
    async fn system_audio(&self) -> Result<MediaStream>;
}

/// Volume control for one mixer input
pub trait GainNode: Send + Sync {
    fn set_gain(&self, gain: f32);
    fn gain(&self) -> f32;
}

/// Combines several audio tracks into one
pub trait AudioMixer: Send + Sync {
    fn connect(&self, track: &Arc<dyn MediaTrack>) -> Result<Box<dyn GainNode>>;
    /// The single mixed track fed to the encoder
    fn output(&self) -> Result<Arc<dyn MediaTrack>>;
    fn close(&self);
}

pub trait AudioGraph: Send + Sync {
    fn create_mixer(&self) -> Result<Box<dyn AudioMixer>>;
}

/// Settings for one encoder instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub mime_type: String,
    pub video_bits_per_second: Option<u32>,
    pub audio_bits_per_second: Option<u32>,
}

/// Encoder that emits container data in chunks while recording
#[async_trait]
pub trait IncrementalEncoder: Send {
    /// Begin encoding; a chunk is sent roughly every `timeslice`
    fn start(&mut self, timeslice: Duration, chunks: UnboundedSender<Vec<u8>>) -> Result<()>;
    fn pause(&mut self);
    fn resume(&mut self);
    /// Flush the last chunk and drop the chunk sender
    async fn stop(&mut self) -> Result<()>;
}

pub trait EncoderFactory: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;
    fn create(
        &self,
        tracks: Vec<Arc<dyn MediaTrack>>,
        settings: &EncoderSettings,
    ) -> Result<Box<dyn IncrementalEncoder>>;
}
