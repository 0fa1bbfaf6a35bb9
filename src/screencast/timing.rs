//! Elapsed and paused time bookkeeping

use tokio::time::Instant;

/// Milliseconds since a fixed origin.
///
/// Uses tokio's clock so paused-time tests can drive it.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Tracks pauses within one session.
///
/// `duration = elapsed - paused_accumulated - current_pause`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseTracker {
    started_at: u64,
    paused_accumulated: u64,
    pause_started_at: Option<u64>,
}

impl PauseTracker {
    pub fn new(now: u64) -> Self {
        Self {
            started_at: now,
            paused_accumulated: 0,
            pause_started_at: None,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pause_started_at.is_some()
    }

    /// Returns false if already paused
    pub fn pause(&mut self, now: u64) -> bool {
        if self.is_paused() {
            return false;
        }
        self.pause_started_at = Some(now.max(self.started_at));
        true
    }

    /// Returns false if not paused
    pub fn resume(&mut self, now: u64) -> bool {
        let Some(since) = self.pause_started_at.take() else {
            return false;
        };
        self.paused_accumulated += now.saturating_sub(since);
        true
    }

    /// Wall-clock time since start, pauses included
    pub fn elapsed_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.started_at)
    }

    /// Time spent paused so far, including a pause in progress
    pub fn paused_ms(&self, now: u64) -> u64 {
        let current = self
            .pause_started_at
            .map_or(0, |since| now.saturating_sub(since));
        self.paused_accumulated + current
    }

    /// Active recording time
    pub fn duration_ms(&self, now: u64) -> u64 {
        self.elapsed_ms(now).saturating_sub(self.paused_ms(now))
    }
}
