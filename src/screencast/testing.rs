//! Fake platform primitives used by the recorder tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use crossbeam_channel::Receiver;
use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::AudioConstraints;
use crate::error::{CaptureError, Result, SourceKind};

use super::engine::{RecorderEvent, RecorderListener};
use super::platform::{
    AudioBlock, AudioGraph, AudioMixer, EncoderFactory, EncoderSettings, EndedCallback, GainNode,
    IncrementalEncoder, MediaDevices, MediaStream, MediaTrack, TrackKind,
};

pub struct FakeTrack {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    stops: AtomicUsize,
    ended: Mutex<Vec<EndedCallback>>,
    blocks: Option<Receiver<AudioBlock>>,
}

impl FakeTrack {
    pub fn new(id: &str, kind: TrackKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            enabled: AtomicBool::new(true),
            stops: AtomicUsize::new(0),
            ended: Mutex::new(Vec::new()),
            blocks: None,
        }
    }

    pub fn with_blocks(mut self, blocks: Option<Receiver<AudioBlock>>) -> Self {
        self.blocks = blocks;
        self
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Simulate the platform ending the track (permission revoked)
    pub fn end(&self) {
        for callback in self.ended.lock().unwrap().iter() {
            callback();
        }
    }
}

impl MediaTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn on_ended(&self, callback: EndedCallback) {
        self.ended.lock().unwrap().push(callback);
    }

    fn sample_blocks(&self) -> Option<Receiver<AudioBlock>> {
        self.blocks.clone()
    }
}

/// Capture prompts with scripted answers
#[derive(Default)]
pub struct FakeDevices {
    pub grant_display: bool,
    /// Whether a granted display prompt also shares its audio
    pub display_audio: bool,
    pub grant_microphone: bool,
    pub grant_system_audio: bool,
    pub microphone_blocks: Option<Receiver<AudioBlock>>,
    pub system_audio_blocks: Option<Receiver<AudioBlock>>,
    pub requests: Mutex<Vec<&'static str>>,
    pub issued: Mutex<Vec<Arc<FakeTrack>>>,
    /// The first prompt stays open until this is notified
    pub hold_first_prompt: Mutex<Option<Arc<Notify>>>,
}

impl FakeDevices {
    pub fn granting_all() -> Self {
        Self {
            grant_display: true,
            display_audio: true,
            grant_microphone: true,
            grant_system_audio: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<&'static str> {
        self.requests.lock().unwrap().clone()
    }

    /// Every track handed out so far
    pub fn tracks(&self) -> Vec<Arc<FakeTrack>> {
        self.issued.lock().unwrap().clone()
    }

    pub fn track(&self, id: &str) -> Option<Arc<FakeTrack>> {
        self.tracks().into_iter().find(|t| t.id == id)
    }

    /// Record the request and wait if the prompt is being held
    async fn prompt(&self, name: &'static str) {
        self.requests.lock().unwrap().push(name);
        let gate = self.hold_first_prompt.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn issue(&self, id: &str, kind: TrackKind, blocks: Option<Receiver<AudioBlock>>) -> Arc<dyn MediaTrack> {
        let track = Arc::new(FakeTrack::new(id, kind).with_blocks(blocks));
        self.issued.lock().unwrap().push(track.clone());
        track
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn display(&self, with_audio: bool) -> Result<MediaStream> {
        self.prompt("display").await;
        if !self.grant_display {
            return Err(CaptureError::permission_denied(SourceKind::Display, "dismissed"));
        }
        let mut tracks = vec![self.issue("display-video", TrackKind::Video, None)];
        if with_audio && self.display_audio {
            tracks.push(self.issue("display-audio", TrackKind::Audio, self.system_audio_blocks.clone()));
        }
        Ok(MediaStream::new(tracks))
    }

    async fn microphone(&self, _constraints: &AudioConstraints) -> Result<MediaStream> {
        self.prompt("microphone").await;
        if !self.grant_microphone {
            return Err(CaptureError::permission_denied(SourceKind::Microphone, "blocked"));
        }
        let track = self.issue("microphone", TrackKind::Audio, self.microphone_blocks.clone());
        Ok(MediaStream::new(vec![track]))
    }

    async fn system_audio(&self) -> Result<MediaStream> {
        self.prompt("system_audio").await;
        if !self.grant_system_audio {
            return Err(CaptureError::permission_denied(SourceKind::SystemAudio, "blocked"));
        }
        let track = self.issue("system-audio", TrackKind::Audio, self.system_audio_blocks.clone());
        Ok(MediaStream::new(vec![track]))
    }
}

#[derive(Default)]
pub struct GraphState {
    gains: Mutex<Vec<Arc<Mutex<f32>>>>,
    created: AtomicUsize,
    closed: AtomicUsize,
}

/// Mixer graph that records gains and lifecycle calls
#[derive(Default)]
pub struct FakeGraph {
    pub fail: bool,
    pub state: Arc<GraphState>,
}

impl FakeGraph {
    /// Current gain of every connected input, in connect order
    pub fn gains(&self) -> Vec<f32> {
        self.state
            .gains
            .lock()
            .unwrap()
            .iter()
            .map(|g| *g.lock().unwrap())
            .collect()
    }

    pub fn mixers_created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    pub fn mixers_closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }
}

impl AudioGraph for FakeGraph {
    fn create_mixer(&self) -> Result<Box<dyn AudioMixer>> {
        if self.fail {
            return Err(CaptureError::mixing("audio context unavailable"));
        }
        self.state.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeMixer {
            state: self.state.clone(),
            output: Arc::new(FakeTrack::new("mixer-output", TrackKind::Audio)),
        }))
    }
}

struct FakeMixer {
    state: Arc<GraphState>,
    output: Arc<FakeTrack>,
}

impl AudioMixer for FakeMixer {
    fn connect(&self, _track: &Arc<dyn MediaTrack>) -> Result<Box<dyn GainNode>> {
        let gain = Arc::new(Mutex::new(0.0));
        self.state.gains.lock().unwrap().push(gain.clone());
        Ok(Box::new(FakeGain { gain }))
    }

    fn output(&self) -> Result<Arc<dyn MediaTrack>> {
        Ok(self.output.clone())
    }

    fn close(&self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeGain {
    gain: Arc<Mutex<f32>>,
}

impl GainNode for FakeGain {
    fn set_gain(&self, gain: f32) {
        *self.gain.lock().unwrap() = gain;
    }

    fn gain(&self) -> f32 {
        *self.gain.lock().unwrap()
    }
}

/// A minimal live WebM header: EBML, unknown-size Segment, Info with
/// TimecodeScale only, then an unknown-size Cluster with a Timecode
pub const WEBM_HEADER: &[u8] = &[
    0x1A, 0x45, 0xDF, 0xA3, 0x87, 0x42, 0x82, 0x84, b'w', b'e', b'b', b'm', // EBML
    0x18, 0x53, 0x80, 0x67, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // Segment
    0x15, 0x49, 0xA9, 0x66, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x07, // Info
    0x2A, 0xD7, 0xB1, 0x83, 0x0F, 0x42, 0x40, // TimecodeScale
    0x1F, 0x43, 0xB6, 0x75, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // Cluster
    0xE7, 0x81, 0x00, // Timecode
];

/// One SimpleBlock with four payload bytes
pub const WEBM_BLOCK: &[u8] = &[0xA3, 0x84, 0x01, 0x02, 0x03, 0x04];

#[derive(Debug, Default)]
pub struct EncoderLog {
    /// (mime type, track ids) of every encoder created
    pub created: Mutex<Vec<(String, Vec<String>)>>,
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
    pub stops: AtomicUsize,
}

/// Encoder factory supporting a fixed list of MIME types
pub struct FakeEncoderFactory {
    pub supported: Vec<String>,
    /// Encoders produce no data at all
    pub silent: bool,
    /// `stop` fails without flushing a final chunk
    pub fail_stop: bool,
    pub log: Arc<EncoderLog>,
}

impl Default for FakeEncoderFactory {
    fn default() -> Self {
        Self {
            supported: vec![
                "video/webm;codecs=vp8,opus".to_string(),
                "audio/webm;codecs=opus".to_string(),
            ],
            silent: false,
            fail_stop: false,
            log: Arc::default(),
        }
    }
}

impl FakeEncoderFactory {
    pub fn created(&self) -> Vec<(String, Vec<String>)> {
        self.log.created.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.log.stops.load(Ordering::SeqCst)
    }
}

impl EncoderFactory for FakeEncoderFactory {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|s| s == mime_type)
    }

    fn create(
        &self,
        tracks: Vec<Arc<dyn MediaTrack>>,
        settings: &EncoderSettings,
    ) -> Result<Box<dyn IncrementalEncoder>> {
        let ids = tracks.iter().map(|t| t.id().to_string()).collect();
        self.log
            .created
            .lock()
            .unwrap()
            .push((settings.mime_type.clone(), ids));
        Ok(Box::new(FakeEncoder {
            chunks: None,
            silent: self.silent,
            fail_stop: self.fail_stop,
            log: self.log.clone(),
        }))
    }
}

/// Sends the header and one block on start, one block on each resume and a
/// final block on stop
struct FakeEncoder {
    chunks: Option<UnboundedSender<Vec<u8>>>,
    silent: bool,
    fail_stop: bool,
    log: Arc<EncoderLog>,
}

impl FakeEncoder {
    fn emit(&self, bytes: &[u8]) {
        if self.silent {
            return;
        }
        if let Some(chunks) = &self.chunks {
            let _ = chunks.send(bytes.to_vec());
        }
    }
}

#[async_trait]
impl IncrementalEncoder for FakeEncoder {
    fn start(&mut self, _timeslice: Duration, chunks: UnboundedSender<Vec<u8>>) -> Result<()> {
        self.chunks = Some(chunks);
        self.emit(WEBM_HEADER);
        self.emit(WEBM_BLOCK);
        Ok(())
    }

    fn pause(&mut self) {
        self.log.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&mut self) {
        self.log.resumes.fetch_add(1, Ordering::SeqCst);
        self.emit(WEBM_BLOCK);
    }

    async fn stop(&mut self) -> Result<()> {
        self.log.stops.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            self.chunks = None;
            return Err(CaptureError::platform("encoder flush failed"));
        }
        self.emit(WEBM_BLOCK);
        self.chunks = None;
        Ok(())
    }
}

/// Collects recorder events
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<RecorderEvent>>>,
}

impl EventLog {
    pub fn listener(&self) -> RecorderListener {
        let events = self.events.clone();
        Arc::new(move |event: &RecorderEvent| events.lock().unwrap().push(event.clone()))
    }

    pub fn events(&self) -> Vec<RecorderEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&RecorderEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(*e)).count()
    }

    /// Poll until an event matches, giving up after `timeout` of tokio time
    pub async fn wait_for(&self, timeout: Duration, pred: impl Fn(&RecorderEvent) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.events().iter().any(&pred) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
