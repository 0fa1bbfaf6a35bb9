//! Audio routing for the incremental recorder
//!
//! Two audio sources always go through one mixer with a gain node per source,
//! because the encoder takes a single audio track. One source is passed
//! through raw. If the mixer cannot be built, the dominant source is recorded
//! alone.

use std::sync::Arc;

use crate::error::{Result, SourceKind};

use super::platform::{AudioGraph, AudioMixer, GainNode, MediaTrack};

const UNITY_GAIN: f32 = 1.0;

enum Route {
    Silent,
    Direct,
    Mixed {
        mixer: Box<dyn AudioMixer>,
        output: Arc<dyn MediaTrack>,
        microphone: Box<dyn GainNode>,
        system_audio: Box<dyn GainNode>,
    },
}

/// The audio that reaches the encoder, plus the controls to mute each source
pub struct AudioMix {
    route: Route,
    microphone: Option<Arc<dyn MediaTrack>>,
    system_audio: Option<Arc<dyn MediaTrack>>,
    microphone_enabled: bool,
    system_audio_enabled: bool,
    closed: bool,
}

impl AudioMix {
    /// Route the acquired audio tracks.
    ///
    /// `dominant` is kept when mixing fails and only one track can be recorded.
    pub fn build(
        graph: &dyn AudioGraph,
        microphone: Option<Arc<dyn MediaTrack>>,
        system_audio: Option<Arc<dyn MediaTrack>>,
        dominant: SourceKind,
    ) -> Self {
        let (route, microphone, system_audio) = match (microphone, system_audio) {
            (Some(mic), Some(sys)) => match Self::mix(graph, &mic, &sys) {
                Ok(route) => (route, Some(mic), Some(sys)),
                Err(err) => {
                    log::warn!("{}; recording {} only", err, dominant);
                    if dominant == SourceKind::Microphone {
                        (Route::Direct, Some(mic), None)
                    } else {
                        (Route::Direct, None, Some(sys))
                    }
                }
            },
            (None, None) => (Route::Silent, None, None),
            (mic, sys) => (Route::Direct, mic, sys),
        };

        Self {
            microphone_enabled: microphone.is_some(),
            system_audio_enabled: system_audio.is_some(),
            route,
            microphone,
            system_audio,
            closed: false,
        }
    }

    fn mix(
        graph: &dyn AudioGraph,
        microphone: &Arc<dyn MediaTrack>,
        system_audio: &Arc<dyn MediaTrack>,
    ) -> Result<Route> {
        let mixer = graph.create_mixer()?;
        match Self::wire(mixer.as_ref(), microphone, system_audio) {
            Ok((mic_gain, sys_gain, output)) => {
                log::debug!("Mixing microphone and system audio into {}", output.id());
                Ok(Route::Mixed {
                    mixer,
                    output,
                    microphone: mic_gain,
                    system_audio: sys_gain,
                })
            }
            Err(err) => {
                mixer.close();
                Err(err)
            }
        }
    }

    fn wire(
        mixer: &dyn AudioMixer,
        microphone: &Arc<dyn MediaTrack>,
        system_audio: &Arc<dyn MediaTrack>,
    ) -> Result<(Box<dyn GainNode>, Box<dyn GainNode>, Arc<dyn MediaTrack>)> {
        let mic_gain = mixer.connect(microphone)?;
        let sys_gain = mixer.connect(system_audio)?;
        let output = mixer.output()?;
        mic_gain.set_gain(UNITY_GAIN);
        sys_gain.set_gain(UNITY_GAIN);
        Ok((mic_gain, sys_gain, output))
    }

    /// The single audio track for the encoder
    pub fn track(&self) -> Option<Arc<dyn MediaTrack>> {
        match &self.route {
            Route::Silent => None,
            Route::Direct => self.microphone.clone().or_else(|| self.system_audio.clone()),
            Route::Mixed { output, .. } => Some(output.clone()),
        }
    }

    pub fn is_mixed(&self) -> bool {
        matches!(self.route, Route::Mixed { .. })
    }

    /// Whether the source is recorded and currently audible
    pub fn is_enabled(&self, source: SourceKind) -> bool {
        match source {
            SourceKind::Microphone => self.microphone_enabled,
            SourceKind::SystemAudio => self.system_audio_enabled,
            SourceKind::Display => false,
        }
    }

    /// Mute or unmute a source. Returns the new state, or `None` if the source
    /// is not part of this recording.
    pub fn toggle(&mut self, source: SourceKind) -> Option<bool> {
        let (track, enabled) = match source {
            SourceKind::Microphone => (self.microphone.as_ref()?, &mut self.microphone_enabled),
            SourceKind::SystemAudio => (self.system_audio.as_ref()?, &mut self.system_audio_enabled),
            SourceKind::Display => return None,
        };
        *enabled = !*enabled;
        let on = *enabled;

        match &self.route {
            Route::Mixed {
                microphone,
                system_audio,
                ..
            } => {
                let node = if source == SourceKind::Microphone {
                    microphone
                } else {
                    system_audio
                };
                node.set_gain(if on { UNITY_GAIN } else { 0.0 });
            }
            _ => track.set_enabled(on),
        }
        log::info!("{} {}", source, if on { "unmuted" } else { "muted" });
        Some(on)
    }

    /// Tear down the mixer. Later calls do nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Route::Mixed { mixer, output, .. } = &self.route {
            output.stop();
            mixer.close();
        }
    }
}

impl Drop for AudioMix {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screencast::platform::TrackKind;
    use crate::screencast::testing::{FakeGraph, FakeTrack};

    fn track(id: &str) -> Arc<FakeTrack> {
        Arc::new(FakeTrack::new(id, TrackKind::Audio))
    }

    #[test]
    fn test_two_sources_are_mixed() {
        let graph = FakeGraph::default();
        let mix = AudioMix::build(&graph, Some(track("mic")), Some(track("sys")), SourceKind::SystemAudio);
        assert!(mix.is_mixed());
        assert_eq!(mix.track().unwrap().id(), "mixer-output");
        assert_eq!(graph.gains(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_toggle_twice_restores_mix() {
        let graph = FakeGraph::default();
        let mut mix = AudioMix::build(&graph, Some(track("mic")), Some(track("sys")), SourceKind::SystemAudio);

        assert_eq!(mix.toggle(SourceKind::Microphone), Some(false));
        assert_eq!(graph.gains(), vec![0.0, 1.0]);
        assert_eq!(mix.toggle(SourceKind::Microphone), Some(true));
        assert_eq!(graph.gains(), vec![1.0, 1.0]);
        assert!(mix.is_enabled(SourceKind::Microphone));
    }

    #[test]
    fn test_single_source_toggles_track() {
        let graph = FakeGraph::default();
        let mic = track("mic");
        let mut mix = AudioMix::build(&graph, Some(mic.clone()), None, SourceKind::SystemAudio);

        assert!(!mix.is_mixed());
        assert_eq!(graph.mixers_created(), 0);
        assert_eq!(mix.track().unwrap().id(), "mic");
        assert_eq!(mix.toggle(SourceKind::Microphone), Some(false));
        assert!(!mic.is_enabled());
        assert_eq!(mix.toggle(SourceKind::Microphone), Some(true));
        assert!(mic.is_enabled());
        assert_eq!(mix.toggle(SourceKind::SystemAudio), None);
        assert!(!mix.is_enabled(SourceKind::SystemAudio));
    }

    #[test]
    fn test_mixing_failure_keeps_dominant_source() {
        let graph = FakeGraph {
            fail: true,
            ..FakeGraph::default()
        };
        let mix = AudioMix::build(&graph, Some(track("mic")), Some(track("sys")), SourceKind::SystemAudio);
        assert!(!mix.is_mixed());
        assert_eq!(mix.track().unwrap().id(), "sys");
        assert!(!mix.is_enabled(SourceKind::Microphone));

        let mix = AudioMix::build(&graph, Some(track("mic")), Some(track("sys")), SourceKind::Microphone);
        assert_eq!(mix.track().unwrap().id(), "mic");
    }

    #[test]
    fn test_close_stops_mixer_once() {
        let graph = FakeGraph::default();
        let mut mix = AudioMix::build(&graph, Some(track("mic")), Some(track("sys")), SourceKind::Microphone);
        mix.close();
        drop(mix);
        assert_eq!(graph.mixers_closed(), 1);
    }

    #[test]
    fn test_silent_mix() {
        let graph = FakeGraph::default();
        let mix = AudioMix::build(&graph, None, None, SourceKind::Microphone);
        assert!(mix.track().is_none());
        assert!(!mix.is_enabled(SourceKind::Microphone));
    }
}
