//! Capture source acquisition
//!
//! Order: display (video only, denial aborts), microphone (denial tolerated),
//! system audio (denial tolerated). Every acquired track is stopped exactly
//! once, on release or drop.

use std::sync::Arc;

use crate::config::RecordingOptions;
use crate::domain::MediaKind;
use crate::error::{CaptureError, Result, SourceKind};

use super::platform::{MediaDevices, MediaStream, MediaTrack, TrackKind};

/// Tracks owned by one recording session
#[derive(Debug, Default)]
pub struct AcquiredSources {
    pub video: Option<Arc<dyn MediaTrack>>,
    pub microphone: Option<Arc<dyn MediaTrack>>,
    pub system_audio: Option<Arc<dyn MediaTrack>>,
    /// Tracks we received but do not record (extra video, duplicate audio)
    unused: Vec<Arc<dyn MediaTrack>>,
    released: bool,
}

impl AcquiredSources {
    pub fn audio_count(&self) -> usize {
        self.microphone.is_some() as usize + self.system_audio.is_some() as usize
    }

    pub fn has(&self, source: SourceKind) -> bool {
        self.track(source).is_some()
    }

    pub fn track(&self, source: SourceKind) -> Option<&Arc<dyn MediaTrack>> {
        match source {
            SourceKind::Display => self.video.as_ref(),
            SourceKind::Microphone => self.microphone.as_ref(),
            SourceKind::SystemAudio => self.system_audio.as_ref(),
        }
    }

    /// Every track that can end from outside the recorder
    pub fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        [&self.video, &self.microphone, &self.system_audio]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Stop every track. Later calls do nothing.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let all = self.tracks().into_iter().chain(self.unused.drain(..));
        let mut count = 0;
        for track in all {
            track.stop();
            count += 1;
        }
        log::debug!("Released {} capture tracks", count);
    }

    fn adopt_audio(&mut self, source: SourceKind, stream: MediaStream) {
        for track in stream.tracks {
            let slot = match source {
                SourceKind::Microphone => &mut self.microphone,
                _ => &mut self.system_audio,
            };
            if slot.is_none() && track.kind() == TrackKind::Audio {
                *slot = Some(track);
            } else {
                self.unused.push(track);
            }
        }
    }
}

impl Drop for AcquiredSources {
    fn drop(&mut self) {
        self.release();
    }
}

/// Request every source the options ask for
pub async fn acquire_sources(
    devices: &dyn MediaDevices,
    kind: MediaKind,
    options: &RecordingOptions,
) -> Result<AcquiredSources> {
    let mut sources = AcquiredSources::default();

    if kind == MediaKind::Video {
        // Denial of the primary source aborts the whole request
        let display = devices.display(options.system_audio).await?;
        let mut videos = display.video_tracks().cloned().collect::<Vec<_>>().into_iter();
        sources.video = videos.next();
        sources.unused.extend(videos);
        if sources.video.is_none() {
            return Err(CaptureError::platform("display stream has no video track"));
        }
        let audio: Vec<_> = display.audio_tracks().cloned().collect();
        if !audio.is_empty() {
            log::debug!("Display stream carries {} audio track(s)", audio.len());
            sources.adopt_audio(SourceKind::SystemAudio, MediaStream::new(audio));
        }
    }

    if options.microphone {
        match devices.microphone(&options.audio_constraints).await {
            Ok(stream) => sources.adopt_audio(SourceKind::Microphone, stream),
            Err(err) => log::warn!("Continuing without microphone: {}", err),
        }
    }

    if options.system_audio && sources.system_audio.is_none() {
        match devices.system_audio().await {
            Ok(stream) => sources.adopt_audio(SourceKind::SystemAudio, stream),
            Err(err) => log::warn!("Continuing without system audio: {}", err),
        }
    }

    let no_audio = sources.audio_count() == 0;
    if no_audio && (kind == MediaKind::Audio || options.require_audio) {
        log::error!("No audio source available for {:?} recording", kind);
        return Err(CaptureError::NoSourceAvailable);
    }
    if no_audio {
        log::warn!("Recording video without audio");
    }

    log::info!(
        "Acquired sources: video={} microphone={} system_audio={}",
        sources.video.is_some(),
        sources.microphone.is_some(),
        sources.system_audio.is_some()
    );
    Ok(sources)
}
