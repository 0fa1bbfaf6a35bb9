//! Recording engine contract and the pieces both recorders share

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::cancel::Cancellation;
use crate::domain::{EncodedArtifact, MediaKind};
use crate::error::{CaptureError, Result, SourceKind};

use super::platform::MediaTrack;

/// Lifecycle of a recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    /// Prompts and encoder setup in progress
    Starting,
    Recording,
    Paused,
    /// Finalizing the artifact
    Stopping,
}

/// Snapshot of the current session
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordingStatus {
    pub state: RecordingState,
    pub kind: Option<MediaKind>,
    /// Active time, pauses excluded
    pub duration_ms: u64,
    /// Wall-clock time since start
    pub elapsed_ms: u64,
    pub microphone_enabled: bool,
    pub system_audio_enabled: bool,
    /// Both audio sources go through a mixer
    pub mixed: bool,
    pub mime_type: Option<String>,
}

impl RecordingStatus {
    pub fn with_state(state: RecordingState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }
}

/// Notifications delivered to the optional listener
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    Started { kind: MediaKind, mime_type: String },
    Paused { duration_ms: u64 },
    Resumed { duration_ms: u64 },
    /// A chunk (or mixed buffer) of `len` bytes arrived
    Data { len: usize },
    SourceToggled { source: SourceKind, enabled: bool },
    /// The recorder stopped itself (ceiling or revoked source)
    Finished(EncodedArtifact),
    Failed { message: String },
}

pub type RecorderListener = Arc<dyn Fn(&RecorderEvent) + Send + Sync>;

pub(crate) fn emit(listener: Option<&RecorderListener>, event: RecorderEvent) {
    if let Some(listener) = listener {
        listener(&event);
    }
}

/// Common surface of the incremental and the sample-accurate recorder
#[async_trait]
pub trait RecordingEngine: Send + Sync {
    /// Acquire sources and begin recording. Fails with `OperationInProgress`
    /// while another session is starting, running or stopping.
    async fn start_recording(&self, kind: MediaKind) -> Result<()>;

    fn pause_recording(&self) -> Result<()>;

    fn resume_recording(&self) -> Result<()>;

    /// Returns the new microphone state; `false` if there is no microphone
    fn toggle_microphone(&self) -> Result<bool>;

    /// Returns the new system audio state; `false` if there is no system audio
    fn toggle_system_audio(&self) -> Result<bool>;

    /// Finalize and hand back the artifact
    async fn stop_recording(&self) -> Result<EncodedArtifact>;

    /// Discard the session without producing an artifact. Returns false if
    /// nothing was recording.
    async fn cancel_recording(&self) -> bool;

    fn recording_status(&self) -> RecordingStatus;

    fn is_recording(&self) -> bool {
        matches!(
            self.recording_status().state,
            RecordingState::Recording | RecordingState::Paused
        )
    }
}

/// Where a recorder keeps its session
pub(crate) enum Slot<S> {
    Idle,
    /// Carries the cancel request for the pending start
    Starting(Cancellation),
    Active(Box<S>),
    Stopping,
}

/// Session holder enforcing one session at a time
pub(crate) struct SessionSlot<S> {
    slot: Mutex<Slot<S>>,
}

impl<S> Default for SessionSlot<S> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(Slot::Idle),
        }
    }
}

impl<S> SessionSlot<S> {
    pub fn lock(&self) -> MutexGuard<'_, Slot<S>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move from idle to starting. The guard falls back to idle unless
    /// [`StartGuard::activate`] succeeds.
    pub fn claim(&self) -> Result<StartGuard<'_, S>> {
        let mut slot = self.lock();
        if !matches!(*slot, Slot::Idle) {
            return Err(CaptureError::in_progress("recording"));
        }
        let cancel = Cancellation::new();
        *slot = Slot::Starting(cancel.clone());
        Ok(StartGuard {
            slot: self,
            cancel,
            armed: true,
        })
    }

    /// Reject the start in progress. Returns false if nothing is starting
    /// or it was already rejected.
    pub fn cancel_start(&self) -> bool {
        match &*self.lock() {
            Slot::Starting(cancel) => cancel.cancel(),
            _ => false,
        }
    }

    /// Move the active session out, leaving `Stopping` behind
    pub fn take_active(&self) -> Option<Box<S>> {
        let mut slot = self.lock();
        match std::mem::replace(&mut *slot, Slot::Stopping) {
            Slot::Active(session) => Some(session),
            other => {
                *slot = other;
                None
            }
        }
    }

    pub fn set_idle(&self) {
        *self.lock() = Slot::Idle;
    }
}

pub(crate) struct StartGuard<'a, S> {
    slot: &'a SessionSlot<S>,
    cancel: Cancellation,
    armed: bool,
}

impl<S> StartGuard<'_, S> {
    /// Install the session. If the start was cancelled meanwhile the
    /// session is handed back for teardown and the slot returns to idle.
    pub fn activate(mut self, session: S) -> Option<S> {
        let mut slot = self.slot.lock();
        if self.cancel.is_cancelled() {
            return Some(session);
        }
        *slot = Slot::Active(Box::new(session));
        self.armed = false;
        None
    }
}

impl<S> Drop for StartGuard<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            self.slot.set_idle();
        }
    }
}

/// Why a recorder stopped itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Ceiling,
    SourceEnded,
}

pub(crate) type StopTrigger = Arc<dyn Fn(StopReason) + Send + Sync>;

/// Ceiling timer and revocation watcher for one session.
///
/// Fires its trigger at most once per armed task; dropping disarms.
#[derive(Debug, Default)]
pub(crate) struct AutoStop {
    tasks: Vec<JoinHandle<()>>,
}

impl AutoStop {
    pub fn arm(max_duration: Option<Duration>, tracks: &[Arc<dyn MediaTrack>], trigger: StopTrigger) -> Self {
        let mut tasks = Vec::new();

        if let Some(max) = max_duration {
            let trigger = trigger.clone();
            tasks.push(tokio::spawn(async move {
                tokio::time::sleep(max).await;
                log::info!("Recording reached its {:?} limit", max);
                trigger(StopReason::Ceiling);
            }));
        }

        if !tracks.is_empty() {
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
            for track in tracks {
                let tx = tx.clone();
                let id = track.id().to_string();
                track.on_ended(Box::new(move || {
                    let _ = tx.send(id.clone());
                }));
            }
            drop(tx);
            tasks.push(tokio::spawn(async move {
                // Only the first ended track counts
                if let Some(id) = rx.recv().await {
                    log::warn!("Track {} was ended externally, stopping", id);
                    trigger(StopReason::SourceEnded);
                }
            }));
        }

        Self { tasks }
    }

    pub fn disarm(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for AutoStop {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Stop on behalf of the recorder itself and report through the listener.
///
/// A session that already ended is not an error here.
pub(crate) async fn finish_automatically(
    engine: &dyn RecordingEngine,
    reason: StopReason,
    listener: Option<&RecorderListener>,
) {
    match engine.stop_recording().await {
        Ok(artifact) => {
            log::info!("Recording stopped automatically ({:?})", reason);
            emit(listener, RecorderEvent::Finished(artifact));
        }
        Err(CaptureError::NoRecordingInProgress) => {
            log::debug!("Automatic stop ({:?}) found no active recording", reason);
        }
        Err(err) => log::error!("Automatic stop ({:?}) failed: {}", reason, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screencast::platform::TrackKind;
    use crate::screencast::testing::FakeTrack;
    use std::sync::Mutex;

    fn counting() -> (StopTrigger, Arc<Mutex<Vec<StopReason>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let trigger: StopTrigger = Arc::new(move |reason| sink.lock().unwrap().push(reason));
        (trigger, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_fires_once() {
        let (trigger, fired) = counting();
        let _auto = AutoStop::arm(Some(Duration::from_secs(5)), &[], trigger);

        tokio::time::sleep(Duration::from_millis(4999)).await;
        assert!(fired.lock().unwrap().is_empty());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*fired.lock().unwrap(), vec![StopReason::Ceiling]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_ended_track_wins() {
        let video = Arc::new(FakeTrack::new("video", TrackKind::Video));
        let mic = Arc::new(FakeTrack::new("mic", TrackKind::Audio));
        let tracks: Vec<Arc<dyn MediaTrack>> = vec![video.clone(), mic.clone()];
        let (trigger, fired) = counting();
        let _auto = AutoStop::arm(None, &tracks, trigger);

        video.end();
        mic.end();
        video.end();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*fired.lock().unwrap(), vec![StopReason::SourceEnded]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_prevents_firing() {
        let mic = Arc::new(FakeTrack::new("mic", TrackKind::Audio));
        let tracks: Vec<Arc<dyn MediaTrack>> = vec![mic.clone()];
        let (trigger, fired) = counting();
        let mut auto = AutoStop::arm(Some(Duration::from_secs(1)), &tracks, trigger);
        auto.disarm();

        mic.end();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.lock().unwrap().is_empty());
    }

    #[test]
    fn test_slot_allows_one_session() {
        let slot = SessionSlot::<u32>::default();
        let guard = slot.claim().unwrap();
        assert!(matches!(slot.claim(), Err(CaptureError::OperationInProgress { .. })));
        drop(guard);
        assert!(matches!(*slot.lock(), Slot::Idle));

        assert!(slot.claim().unwrap().activate(7).is_none());
        assert!(slot.claim().is_err());
        assert_eq!(slot.take_active().map(|s| *s), Some(7));
        assert!(matches!(*slot.lock(), Slot::Stopping));
        assert!(slot.take_active().is_none());
        slot.set_idle();
        assert!(slot.claim().is_ok());
    }

    #[test]
    fn test_cancelled_start_hands_session_back() {
        let slot = SessionSlot::<u32>::default();
        assert!(!slot.cancel_start());

        let guard = slot.claim().unwrap();
        assert!(slot.cancel_start());
        assert!(!slot.cancel_start());
        assert_eq!(guard.activate(3), Some(3));
        assert!(matches!(*slot.lock(), Slot::Idle));
        assert!(slot.take_active().is_none());
    }

    #[test]
    fn test_idle_status() {
        let status = RecordingStatus::default();
        assert_eq!(status.state, RecordingState::Idle);
        assert!(status.kind.is_none());
        assert_eq!(RecordingStatus::with_state(RecordingState::Stopping).duration_ms, 0);
    }
}
