//! 16-bit PCM WAV packaging for the sample-accurate recorder

use std::io::Cursor;

use crate::error::{CaptureError, Result};

pub const WAV_MIME: &str = "audio/wav";

fn wav_error(e: hound::Error) -> CaptureError {
    CaptureError::encoding(WAV_MIME, e.to_string())
}

/// Interleave per-channel sample arrays (L, R, L, R, ...).
///
/// Mono passes through unchanged. Channels of unequal length are cut to the
/// shortest one.
pub fn interleave(channels: &[Vec<f32>]) -> Vec<f32> {
    match channels {
        [] => Vec::new(),
        [mono] => mono.clone(),
        _ => {
            let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
            let mut out = Vec::with_capacity(frames * channels.len());
            for i in 0..frames {
                for channel in channels {
                    out.push(channel[i]);
                }
            }
            out
        }
    }
}

fn to_pcm16(sample: f32) -> i16 {
    let s = if sample.is_finite() { sample.clamp(-1.0, 1.0) } else { 0.0 };
    (s * i16::MAX as f32).round() as i16
}

/// Pack interleaved float samples into a WAV file.
///
/// The header is written from the sample count, so the result needs no
/// duration repair.
pub fn encode_wav(interleaved: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    if channels == 0 || interleaved.len() % channels as usize != 0 {
        return Err(CaptureError::encoding(
            WAV_MIME,
            format!("{} samples do not split into {} channels", interleaved.len(), channels),
        ));
    }
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + interleaved.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
        let mut samples = writer.get_i16_writer(interleaved.len() as u32);
        for &s in interleaved {
            samples.write_sample(to_pcm16(s));
        }
        samples.flush().map_err(wav_error)?;
        writer.finalize().map_err(wav_error)?;
    }
    Ok(cursor.into_inner())
}

/// Header fields read back from a WAV file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Samples per channel
    pub frames: u32,
}

impl WavInfo {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let reader = hound::WavReader::new(Cursor::new(bytes)).map_err(wav_error)?;
        let spec = reader.spec();
        Ok(Self {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
            frames: reader.duration(),
        })
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames as u64 * 1000 / self.sample_rate as u64
    }
}
