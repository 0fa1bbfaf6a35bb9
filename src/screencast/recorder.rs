//! Incremental recorder
//!
//! Acquires sources, routes audio through the mixer, and feeds one platform
//! encoder that hands back container chunks every timeslice. On stop the
//! chunks are concatenated and the container duration is repaired.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

use crate::config::RecordingOptions;
use crate::domain::{EncodedArtifact, MediaKind};
use crate::error::{CaptureError, Result, SourceKind};
use crate::finalize::repair_duration;

use super::acquire::{AcquiredSources, acquire_sources};
use super::encoder::{best_mime_type, describe, encoder_settings};
use super::engine::{
    AutoStop, RecorderEvent, RecorderListener, RecordingEngine, RecordingState, RecordingStatus, SessionSlot, Slot,
    StopTrigger, emit, finish_automatically,
};
use super::mixer::AudioMix;
use super::platform::{AudioGraph, EncoderFactory, IncrementalEncoder, MediaDevices, MediaTrack};
use super::timing::{Clock, PauseTracker};

struct Session {
    kind: MediaKind,
    mime_type: String,
    sources: AcquiredSources,
    mix: AudioMix,
    encoder: Box<dyn IncrementalEncoder>,
    collector: JoinHandle<Vec<Vec<u8>>>,
    timing: PauseTracker,
    auto_stop: AutoStop,
}

struct Inner {
    devices: Arc<dyn MediaDevices>,
    graph: Arc<dyn AudioGraph>,
    encoders: Arc<dyn EncoderFactory>,
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
}

/// Recorder backed by a platform incremental encoder.
///
/// Clones share the same session.
#[derive(Clone)]
pub struct StreamRecorder {
    inner: Arc<Inner>,
}

impl StreamRecorder {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        graph: Arc<dyn AudioGraph>,
        encoders: Arc<dyn EncoderFactory>,
        options: RecordingOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                devices,
                graph,
                encoders,
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

    pub fn options(&self) -> &RecordingOptions {
        &self.inner.options
    }

    async fn open(&self, kind: MediaKind) -> Result<Session> {
        let inner = &self.inner;
        let options = &inner.options;

        // Unsupported containers fail before anyone is prompted
        let mime_type = best_mime_type(inner.encoders.as_ref(), kind, options)?;
        let sources = acquire_sources(inner.devices.as_ref(), kind, options).await?;

        let dominant = match kind {
            MediaKind::Video => SourceKind::SystemAudio,
            _ => SourceKind::Microphone,
        };
        let mix = AudioMix::build(
            inner.graph.as_ref(),
            sources.microphone.clone(),
            sources.system_audio.clone(),
            dominant,
        );

        let mut tracks: Vec<Arc<dyn MediaTrack>> = sources.video.iter().cloned().collect();
        tracks.extend(mix.track());

        let settings = encoder_settings(&mime_type, kind, options);
        let mut encoder = inner.encoders.create(tracks, &settings)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let collector = tokio::spawn(collect_chunks(rx, inner.listener()));
        encoder.start(options.timeslice, tx)?;

        log::info!("Recording {:?} as {}", kind, describe(&mime_type));
        Ok(Session {
            kind,
            mime_type,
            sources,
            mix,
            encoder,
            collector,
            timing: PauseTracker::new(inner.clock.now_ms()),
            auto_stop: AutoStop::default(),
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
                let recorder = StreamRecorder { inner };
                finish_automatically(&recorder, reason, listener.as_ref()).await;
            });
        })
    }

    async fn finalize(&self, session: Session) -> Result<EncodedArtifact> {
        let Session {
            kind,
            mime_type,
            mut sources,
            mut mix,
            mut encoder,
            collector,
            timing,
            mut auto_stop,
        } = session;

        auto_stop.disarm();
        let duration_ms = timing.duration_ms(self.inner.clock.now_ms());

        let stopped = encoder.stop().await;
        // Dropping the encoder closes the chunk channel
        drop(encoder);
        let chunks = collector.await;
        mix.close();
        sources.release();

        let chunks = chunks.map_err(|e| CaptureError::platform(format!("chunk collector failed: {}", e)))?;
        let bytes = chunks.concat();
        if bytes.is_empty() {
            return Err(match stopped {
                Err(err) => err,
                Ok(()) => CaptureError::encoding(mime_type, "encoder produced no data"),
            });
        }
        if let Err(err) = stopped {
            log::warn!(
                "Encoder failed to flush, keeping the {} bytes already recorded: {}",
                bytes.len(),
                err
            );
        }

        let bytes = repair_duration(bytes, &mime_type, duration_ms);
        log::info!(
            "Recording finished: {} bytes, {} ms ({} chunks)",
            bytes.len(),
            duration_ms,
            chunks.len()
        );
        Ok(EncodedArtifact::new(kind, bytes, mime_type, duration_ms))
    }

    /// Tear a session down without producing an artifact
    async fn discard(&self, session: Session) {
        let Session {
            mut sources,
            mut mix,
            mut encoder,
            collector,
            mut auto_stop,
            ..
        } = session;

        auto_stop.disarm();
        if let Err(err) = encoder.stop().await {
            log::warn!("Encoder did not stop cleanly: {}", err);
        }
        drop(encoder);
        collector.abort();
        mix.close();
        sources.release();
    }

    fn toggle(&self, source: SourceKind) -> Result<bool> {
        let enabled = {
            let mut slot = self.inner.session.lock();
            let Slot::Active(session) = &mut *slot else {
                return Err(CaptureError::NoRecordingInProgress);
            };
            session.mix.toggle(source)
        };
        match enabled {
            Some(enabled) => {
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

async fn collect_chunks(mut rx: UnboundedReceiver<Vec<u8>>, listener: Option<RecorderListener>) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        if chunk.is_empty() {
            continue;
        }
        emit(listener.as_ref(), RecorderEvent::Data { len: chunk.len() });
        chunks.push(chunk);
    }
    chunks
}

#[async_trait]
impl RecordingEngine for StreamRecorder {
    async fn start_recording(&self, kind: MediaKind) -> Result<()> {
        let guard = self.inner.session.claim()?;
        let mut session = self.open(kind).await?;

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        session.auto_stop = AutoStop::arm(
            self.inner.options.max_duration,
            &session.sources.tracks(),
            self.stop_trigger(generation),
        );
        let mime_type = session.mime_type.clone();
        if let Some(session) = guard.activate(session) {
            log::info!("Recording cancelled before it started");
            self.discard(session).await;
            return Err(CaptureError::Cancelled);
        }

        self.inner.emit(RecorderEvent::Started { kind, mime_type });
        Ok(())
    }

    fn pause_recording(&self) -> Result<()> {
        let duration_ms = {
            let mut slot = self.inner.session.lock();
            let Slot::Active(session) = &mut *slot else {
                return Err(CaptureError::NoRecordingInProgress);
            };
            let now = self.inner.clock.now_ms();
            if !session.timing.pause(now) {
                return Ok(());
            }
            session.encoder.pause();
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
            if !session.timing.resume(now) {
                return Ok(());
            }
            session.encoder.resume();
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
        let session = self.inner.session.take_active().ok_or(CaptureError::NoRecordingInProgress)?;
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
                    kind: Some(session.kind),
                    duration_ms: session.timing.duration_ms(now),
                    elapsed_ms: session.timing.elapsed_ms(now),
                    microphone_enabled: session.mix.is_enabled(SourceKind::Microphone),
                    system_audio_enabled: session.mix.is_enabled(SourceKind::SystemAudio),
                    mixed: session.mix.is_mixed(),
                    mime_type: Some(session.mime_type.clone()),
                }
            }
        }
    }
}
