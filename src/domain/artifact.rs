//! The finished media file handed back to the caller

use chrono::{DateTime, Local};

/// Kind of media an artifact holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    fn filename_prefix(self) -> &'static str {
        match self {
            MediaKind::Image => "screenshot",
            MediaKind::Video => "recording",
            MediaKind::Audio => "audio",
        }
    }
}

/// An encoded capture or recording.
///
/// Produced once per completed operation; ownership passes to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub duration_ms: u64,
    pub suggested_filename: String,
    pub kind: MediaKind,
}

impl EncodedArtifact {
    pub fn new(kind: MediaKind, bytes: Vec<u8>, mime_type: impl Into<String>, duration_ms: u64) -> Self {
        let mime_type = mime_type.into();
        let suggested_filename = suggested_filename(kind, &mime_type, Local::now());
        Self {
            bytes,
            mime_type,
            duration_ms,
            suggested_filename,
            kind,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// File extension for a MIME type, ignoring any codec parameters
pub fn extension_for_mime(mime: &str) -> &'static str {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    match essence {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "video/webm" | "audio/webm" => "webm",
        "video/x-matroska" => "mkv",
        "video/mp4" => "mp4",
        "audio/mp4" => "m4a",
        "audio/ogg" => "ogg",
        "audio/wav" | "audio/wave" | "audio/x-wav" => "wav",
        _ => "bin",
    }
}

/// Build a timestamped filename such as `recording-2024-05-01-13-04-59.webm`
pub fn suggested_filename(kind: MediaKind, mime: &str, at: DateTime<Local>) -> String {
    format!(
        "{}-{}.{}",
        kind.filename_prefix(),
        at.format("%Y-%m-%d-%H-%M-%S"),
        extension_for_mime(mime)
    )
}
