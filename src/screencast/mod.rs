//! Audio and video recording
//!
//! This module consolidates:
//! - injected platform primitives (platform.rs)
//! - source acquisition and audio routing (acquire.rs, mixer.rs)
//! - container selection (encoder.rs)
//! - the incremental recorder (recorder.rs)
//! - the sample-accurate recorder and its processing thread (sampled.rs, processor.rs)

pub mod acquire;
pub mod encoder;
pub mod engine;
pub mod mixer;
pub mod platform;
pub mod processor;
mod recorder;
mod sampled;
pub mod timing;

#[cfg(test)]
pub(crate) mod testing;

pub use acquire::{AcquiredSources, acquire_sources};
pub use encoder::{Codec, best_mime_type, describe};
pub use engine::{RecorderEvent, RecorderListener, RecordingEngine, RecordingState, RecordingStatus, StopReason};
pub use mixer::AudioMix;
pub use platform::{
    AudioBlock, AudioGraph, AudioMixer, EncoderFactory, EncoderSettings, GainNode, IncrementalEncoder, MediaDevices,
    MediaStream, MediaTrack, TrackKind,
};
pub use recorder::StreamRecorder;
pub use sampled::SampleRecorder;
pub use timing::{Clock, PauseTracker};
