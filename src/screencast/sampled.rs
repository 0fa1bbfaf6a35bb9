//! Sample-accurate audio recorder
//!
//! Raw blocks from the microphone and system audio are mixed on the
//! processing thread; the result is packed into 16-bit PCM WAV. The WAV
//! header is written from the sample count, so no duration repair is needed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use crossbeam_channel::Receiver;
use tokio::task::JoinHandle;

use crate::config::RecordingOptions;
use crate::domain::{EncodedArtifact, MediaKind};
use crate::error::{CaptureError, Result, SourceKind};
use crate::finalize::{WAV_MIME, encode_wav, interleave};

use super::acquire::{AcquiredSources, acquire_sources};
use super::engine::{
    AutoStop, RecorderEvent, RecorderListener, RecordingEngine, RecordingState, RecordingStatus, SessionSlot, Slot,
    StopTrigger, emit, finish_automatically,
};
use super::platform::MediaDevices;
use super::processor::{Command, Input, Output, Processor};
use super::timing::{Clock, PauseTracker};

/// Everything the processing thread produced
struct Captured {
    channels: Vec<Vec<f32>>,
    frames: u64,
}

struct Session {
    sources: AcquiredSources,
    processor: Processor,
    collector: JoinHandle<Captured>,
    timing: PauseTracker,
    auto_stop: AutoStop,
    /// `None` when the source is not part of the recording
    microphone: Option<bool>,
    system_audio: Option<bool>,
}

struct Inner {
    devices: Arc<dyn MediaDevices>,
    options: RecordingOptions,
    listener: Mutex<Option<RecorderListener>>,
    clock: Clock,
    session: SessionSlot<Session>,
    generation: AtomicU64,
}

impl Inner {
    fn listener(&self) -> Option<RecorderListener> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn emit(&self, event: RecorderEvent) {
        emit(self.listener().as_ref(), event);
    }

    fn channels(&self) -> u16 {
        self.options.channels.clamp(1, 2)
    }
}

/// Audio-only recorder producing WAV.
///
/// Clones share the same session.
#[derive(Clone)]
pub struct SampleRecorder {
    inner: Arc<Inner>,
}

impl SampleRecorder {
    pub fn new(devices: Arc<dyn MediaDevices>, options: RecordingOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                devices,
                options,
                listener: Mutex::new(None),
                clock: Clock::new(),
                session: SessionSlot::default(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn with_listener(self, listener: RecorderListener) -> Self {
        self.set_listener(listener);
        self
    }

    pub fn set_listener(&self, listener: RecorderListener) {
        *self.inner.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    async fn open(&self) -> Result<Session> {
        let inner = &self.inner;
        let sources = acquire_sources(inner.devices.as_ref(), MediaKind::Audio, &inner.options).await?;

        let mut inputs = Vec::new();
        for source in [SourceKind::Microphone, SourceKind::SystemAudio] {
            let Some(track) = sources.track(source) else {
                continue;
            };
            match track.sample_blocks() {
                Some(blocks) => inputs.push(Input { source, blocks }),
                None => log::warn!("Cannot read raw samples from {}, leaving it out", source),
            }
        }
        if inputs.is_empty() {
            log::error!("None of the acquired audio sources provide raw samples");
            return Err(CaptureError::NoSourceAvailable);
        }
        let present = |source| inputs.iter().any(|i: &Input| i.source == source).then_some(true);
        let microphone = present(SourceKind::Microphone);
        let system_audio = present(SourceKind::SystemAudio);

        let channels = inner.channels();
        let (processor, output) = Processor::spawn(inputs, channels)?;
        let listener = inner.listener();
        let collector = tokio::task::spawn_blocking(move || collect_buffers(output, channels, listener));
        processor.send(Command::Start)?;

        log::info!(
            "Recording {} Hz {}-channel WAV (microphone={}, system_audio={})",
            inner.options.sample_rate,
            channels,
            microphone.is_some(),
            system_audio.is_some()
        );
        Ok(Session {
            sources,
            processor,
            collector,
            timing: PauseTracker::new(inner.clock.now_ms()),
            auto_stop: AutoStop::default(),
            microphone,
            system_audio,
        })
    }

    fn stop_trigger(&self, generation: u64) -> StopTrigger {
        let inner = Arc::downgrade(&self.inner);
        Arc::new(move |reason| {
            let inner = inner.clone();
            // Stopping aborts the task that fired us, so stop elsewhere
            tokio::spawn(async move {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                if inner.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                let listener = inner.listener();
                let recorder = SampleRecorder { inner };
                finish_automatically(&recorder, reason, listener.as_ref()).await;
            });
        })
    }

    /// Stop the thread and wait for everything it produced
    async fn shut_down(processor: Processor, collector: JoinHandle<Captured>) -> Result<Captured> {
        let sent = processor.send(Command::Stop);
        let captured = collector.await;
        let joined = tokio::task::spawn_blocking(move || {
            let mut processor = processor;
            processor.join()
        })
        .await;

        // Whatever the collector received is still usable
        if let Err(err) = sent {
            log::warn!("Audio processor missed the stop command: {}", err);
        }
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log::warn!("Audio processor ended abnormally: {}", err),
            Err(err) => log::warn!("Audio processor join failed: {}", err),
        }
        captured.map_err(|e| CaptureError::platform(format!("sample collector failed: {}", e)))
    }

    async fn finalize(&self, session: Session) -> Result<EncodedArtifact> {
        let Session {
            mut sources,
            processor,
            collector,
            timing,
            mut auto_stop,
            ..
        } = session;

        auto_stop.disarm();
        let active_ms = timing.duration_ms(self.inner.clock.now_ms());
        let captured = Self::shut_down(processor, collector).await;
        sources.release();
        let captured = captured?;

        if captured.frames == 0 {
            return Err(CaptureError::encoding(WAV_MIME, "no audio samples were captured"));
        }
        let sample_rate = self.inner.options.sample_rate;
        let bytes = encode_wav(&interleave(&captured.channels), sample_rate, self.inner.channels())?;
        let duration_ms = captured.frames * 1000 / u64::from(sample_rate.max(1));

        log::info!(
            "Recording finished: {} frames ({} ms of audio, {} ms active)",
            captured.frames,
            duration_ms,
            active_ms
        );
        Ok(EncodedArtifact::new(MediaKind::Audio, bytes, WAV_MIME, duration_ms))
    }

    /// Tear a session down without producing an artifact
    async fn discard(&self, session: Session) {
        let Session {
            mut sources,
            processor,
            collector,
            mut auto_stop,
            ..
        } = session;

        auto_stop.disarm();
        if let Err(err) = Self::shut_down(processor, collector).await {
            log::warn!("Audio processor did not stop cleanly: {}", err);
        }
        sources.release();
    }

    fn toggle(&self, source: SourceKind) -> Result<bool> {
        let enabled = {
            let mut slot = self.inner.session.lock();
            let Slot::Active(session) = &mut *slot else {
                return Err(CaptureError::NoRecordingInProgress);
            };
            let state = match source {
                SourceKind::Microphone => &mut session.microphone,
                SourceKind::SystemAudio => &mut session.system_audio,
                SourceKind::Display => return Ok(false),
            };
            match state {
                Some(enabled) => {
                    let on = !*enabled;
                    session
                        .processor
                        .send(Command::SetGain(source, if on { 1.0 } else { 0.0 }))?;
                    *enabled = on;
                    Some(on)
                }
                None => None,
            }
        };
        match enabled {
            Some(enabled) => {
                log::info!("{} {}", source, if enabled { "unmuted" } else { "muted" });
                self.inner.emit(RecorderEvent::SourceToggled { source, enabled });
                Ok(enabled)
            }
            None => {
                log::debug!("No {} in this recording to toggle", source);
                Ok(false)
            }
        }
    }
}

/// Runs on a blocking thread until the processor reports it is finished
fn collect_buffers(output: Receiver<Output>, channels: u16, listener: Option<RecorderListener>) -> Captured {
    let mut captured = Captured {
        channels: vec![Vec::new(); usize::from(channels)],
        frames: 0,
    };
    for message in output.iter() {
        match message {
            Output::Buffer(buffer) => {
                let frames = buffer.first().map_or(0, Vec::len);
                emit(
                    listener.as_ref(),
                    RecorderEvent::Data {
                        len: frames * buffer.len() * 2,
                    },
                );
                for (all, part) in captured.channels.iter_mut().zip(buffer) {
                    all.extend(part);
                }
            }
            Output::Finished { frames } => {
                captured.frames = frames;
                return captured;
            }
        }
    }
    log::warn!("Audio processor exited without finishing");
    captured.frames = captured.channels.first().map_or(0, |c| c.len() as u64);
    captured
}

#[async_trait]
impl RecordingEngine for SampleRecorder {
    async fn start_recording(&self, kind: MediaKind) -> Result<()> {
        if kind != MediaKind::Audio {
            return Err(CaptureError::Unsupported {
                what: format!("{:?} in the sample-accurate recorder", kind),
            });
        }
        let guard = self.inner.session.claim()?;
        let mut session = self.open().await?;

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        session.auto_stop = AutoStop::arm(
            self.inner.options.max_duration,
            &session.sources.tracks(),
            self.stop_trigger(generation),
        );
        if let Some(session) = guard.activate(session) {
            log::info!("Recording cancelled before it started");
            self.discard(session).await;
            return Err(CaptureError::Cancelled);
        }

        self.inner.emit(RecorderEvent::Started {
            kind,
            mime_type: WAV_MIME.to_string(),
        });
        Ok(())
    }

    fn pause_recording(&self) -> Result<()> {
        let duration_ms = {
            let mut slot = self.inner.session.lock();
            let Slot::Active(session) = &mut *slot else {
                return Err(CaptureError::NoRecordingInProgress);
            };
            let now = self.inner.clock.now_ms();
            if session.timing.is_paused() {
                return Ok(());
            }
            session.processor.send(Command::Pause)?;
            session.timing.pause(now);
            session.timing.duration_ms(now)
        };
        log::info!("Recording paused at {} ms", duration_ms);
        self.inner.emit(RecorderEvent::Paused { duration_ms });
        Ok(())
    }

    fn resume_recording(&self) -> Result<()> {
        let duration_ms = {
            let mut slot = self.inner.session.lock();
            let Slot::Active(session) = &mut *slot else {
                return Err(CaptureError::NoRecordingInProgress);
            };
            let now = self.inner.clock.now_ms();
            if !session.timing.is_paused() {
                return Ok(());
            }
            session.processor.send(Command::Resume)?;
            session.timing.resume(now);
            session.timing.duration_ms(now)
        };
        log::info!("Recording resumed at {} ms", duration_ms);
        self.inner.emit(RecorderEvent::Resumed { duration_ms });
        Ok(())
    }

    fn toggle_microphone(&self) -> Result<bool> {
        self.toggle(SourceKind::Microphone)
    }

    fn toggle_system_audio(&self) -> Result<bool> {
        self.toggle(SourceKind::SystemAudio)
    }

    async fn stop_recording(&self) -> Result<EncodedArtifact> {
        let session = self
            .inner
            .session
            .take_active()
            .ok_or(CaptureError::NoRecordingInProgress)?;
        let result = self.finalize(*session).await;
        self.inner.session.set_idle();

        if let Err(err) = &result {
            log::error!("Failed to finish recording: {}", err);
            self.inner.emit(RecorderEvent::Failed {
                message: err.to_string(),
            });
        }
        result
    }

    async fn cancel_recording(&self) -> bool {
        let Some(session) = self.inner.session.take_active() else {
            return self.inner.session.cancel_start();
        };
        self.discard(*session).await;

        self.inner.session.set_idle();
        log::info!("Recording cancelled");
        true
    }

    fn recording_status(&self) -> RecordingStatus {
        let slot = self.inner.session.lock();
        match &*slot {
            Slot::Idle => RecordingStatus::default(),
            Slot::Starting(_) => RecordingStatus::with_state(RecordingState::Starting),
            Slot::Stopping => RecordingStatus::with_state(RecordingState::Stopping),
            Slot::Active(session) => {
                let now = self.inner.clock.now_ms();
                RecordingStatus {
                    state: if session.timing.is_paused() {
                        RecordingState::Paused
                    } else {
                        RecordingState::Recording
                    },
                    kind: Some(MediaKind::Audio),
                    duration_ms: session.timing.duration_ms(now),
                    elapsed_ms: session.timing.elapsed_ms(now),
                    microphone_enabled: session.microphone.unwrap_or(false),
                    system_audio_enabled: session.system_audio.unwrap_or(false),
                    mixed: session.microphone.is_some() && session.system_audio.is_some(),
                    mime_type: Some(WAV_MIME.to_string()),
                }
            }
        }
    }
}
