//! Container and codec selection
//!
//! Walks the configured MIME preference list and keeps the entries the
//! platform encoder accepts, best first.

use crate::config::RecordingOptions;
use crate::domain::MediaKind;
use crate::error::{CaptureError, Result};

use super::platform::{EncoderFactory, EncoderSettings};

/// Codec named in a `codecs=` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Vp8,
    Vp9,
    Av1,
    H264,
    Opus,
    Vorbis,
    Aac,
}

impl Codec {
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Vp8 => "VP8",
            Codec::Vp9 => "VP9",
            Codec::Av1 => "AV1",
            Codec::H264 => "H.264",
            Codec::Opus => "Opus",
            Codec::Vorbis => "Vorbis",
            Codec::Aac => "AAC",
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Codec::Opus | Codec::Vorbis | Codec::Aac)
    }

    fn parse(token: &str) -> Option<Self> {
        let token = token.trim().trim_matches('"').to_ascii_lowercase();
        let codec = match token.as_str() {
            "vp8" => Codec::Vp8,
            "vp9" => Codec::Vp9,
            "av1" => Codec::Av1,
            "h264" | "avc1" => Codec::H264,
            "opus" => Codec::Opus,
            "vorbis" => Codec::Vorbis,
            "aac" | "mp4a" => Codec::Aac,
            t if t.starts_with("vp09") => Codec::Vp9,
            t if t.starts_with("av01") => Codec::Av1,
            t if t.starts_with("avc1.") => Codec::H264,
            t if t.starts_with("mp4a.") => Codec::Aac,
            _ => return None,
        };
        Some(codec)
    }
}

/// Codecs listed in the MIME string, in order. Unknown names are skipped.
pub fn codecs(mime: &str) -> Vec<Codec> {
    mime.split(';')
        .skip(1)
        .filter_map(|param| param.trim().strip_prefix("codecs="))
        .flat_map(|list| list.trim_matches('"').split(','))
        .filter_map(Codec::parse)
        .collect()
}

/// Human-readable form, e.g. `video/webm (VP9 + Opus)`
pub fn describe(mime: &str) -> String {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    let names: Vec<_> = codecs(mime).iter().map(Codec::name).collect();
    if names.is_empty() {
        essence.to_string()
    } else {
        format!("{} ({})", essence, names.join(" + "))
    }
}

fn preferences(kind: MediaKind, options: &RecordingOptions) -> Result<&[String]> {
    match kind {
        MediaKind::Video => Ok(&options.video_mime_types),
        MediaKind::Audio => Ok(&options.audio_mime_types),
        MediaKind::Image => Err(CaptureError::Unsupported {
            what: "recording an image".to_string(),
        }),
    }
}

/// Preference entries the platform supports, order preserved
pub fn supported_types(factory: &dyn EncoderFactory, kind: MediaKind, options: &RecordingOptions) -> Result<Vec<String>> {
    let candidates = preferences(kind, options)?;
    Ok(candidates
        .iter()
        .filter(|mime| factory.is_type_supported(mime))
        .cloned()
        .collect())
}

/// The first supported entry of the preference list
pub fn best_mime_type(factory: &dyn EncoderFactory, kind: MediaKind, options: &RecordingOptions) -> Result<String> {
    let supported = supported_types(factory, kind, options)?;
    log::debug!("Supported {:?} containers: {:?}", kind, supported);
    supported.into_iter().next().ok_or_else(|| CaptureError::Unsupported {
        what: format!("no supported {:?} container among {:?}", kind, preferences(kind, options).unwrap_or_default()),
    })
}

/// Encoder settings for the chosen container
pub fn encoder_settings(mime_type: &str, kind: MediaKind, options: &RecordingOptions) -> EncoderSettings {
    EncoderSettings {
        mime_type: mime_type.to_string(),
        video_bits_per_second: match kind {
            MediaKind::Video => options.video_bits_per_second,
            _ => None,
        },
        audio_bits_per_second: options.audio_bits_per_second,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screencast::testing::FakeEncoderFactory;

    #[test]
    fn test_codec_name() {
        assert_eq!(Codec::Vp9.name(), "VP9");
        assert_eq!(Codec::H264.name(), "H.264");
        assert_eq!(Codec::Opus.name(), "Opus");
        assert!(Codec::Aac.is_audio());
        assert!(!Codec::Av1.is_audio());
    }

    #[test]
    fn test_codecs_parameter() {
        assert_eq!(codecs("video/webm;codecs=vp9,opus"), vec![Codec::Vp9, Codec::Opus]);
        assert_eq!(codecs("video/mp4; codecs=\"avc1.42E01E, mp4a.40.2\""), vec![Codec::H264, Codec::Aac]);
        assert!(codecs("audio/webm").is_empty());
        assert_eq!(codecs("video/webm;codecs=daala,vp8"), vec![Codec::Vp8]);
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe("video/webm;codecs=vp9,opus"), "video/webm (VP9 + Opus)");
        assert_eq!(describe("audio/ogg"), "audio/ogg");
    }

    #[test]
    fn test_first_supported_preference_wins() {
        let factory = FakeEncoderFactory::default();
        let options = RecordingOptions::default();
        assert_eq!(
            best_mime_type(&factory, MediaKind::Video, &options).unwrap(),
            "video/webm;codecs=vp8,opus"
        );
        assert_eq!(
            best_mime_type(&factory, MediaKind::Audio, &options).unwrap(),
            "audio/webm;codecs=opus"
        );
    }

    #[test]
    fn test_supported_types_keep_preference_order() {
        let factory = FakeEncoderFactory {
            supported: vec!["video/mp4".to_string(), "video/webm".to_string()],
            ..FakeEncoderFactory::default()
        };
        let options = RecordingOptions::default();
        assert_eq!(
            supported_types(&factory, MediaKind::Video, &options).unwrap(),
            vec!["video/webm".to_string(), "video/mp4".to_string()]
        );
    }

    #[test]
    fn test_nothing_supported() {
        let factory = FakeEncoderFactory {
            supported: Vec::new(),
            ..FakeEncoderFactory::default()
        };
        let err = best_mime_type(&factory, MediaKind::Audio, &RecordingOptions::default()).unwrap_err();
        assert!(matches!(err, CaptureError::Unsupported { .. }));
        assert!(best_mime_type(&factory, MediaKind::Image, &RecordingOptions::default()).is_err());
    }

    #[test]
    fn test_audio_settings_drop_video_bitrate() {
        let options = RecordingOptions::default();
        let settings = encoder_settings("audio/webm", MediaKind::Audio, &options);
        assert_eq!(settings.video_bits_per_second, None);
        assert_eq!(settings.audio_bits_per_second, options.audio_bits_per_second);
        let settings = encoder_settings("video/webm", MediaKind::Video, &options);
        assert_eq!(settings.video_bits_per_second, options.video_bits_per_second);
    }
}
