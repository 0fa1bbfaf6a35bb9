//! Turning recorded data into a finished file
//!
//! - container duration repair for incremental WebM output (webm.rs)
//! - PCM packaging for the sample-accurate recorder (wav.rs)

pub mod wav;
pub mod webm;

pub use wav::{WAV_MIME, WavInfo, encode_wav, interleave};

/// Containers whose incremental output is written without a usable duration
pub fn needs_duration_repair(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    matches!(essence, "video/webm" | "audio/webm" | "video/x-matroska")
}

/// Write `duration_ms` into the container if it needs it.
///
/// Any failure returns the original bytes so the recording is never lost.
pub fn repair_duration(bytes: Vec<u8>, mime: &str, duration_ms: u64) -> Vec<u8> {
    if !needs_duration_repair(mime) || duration_ms == 0 || bytes.is_empty() {
        return bytes;
    }
    match webm::set_duration(&bytes, duration_ms) {
        Ok(fixed) => fixed,
        Err(err) => {
            log::warn!("Keeping recording without duration metadata: {}", err);
            bytes
        }
    }
}
