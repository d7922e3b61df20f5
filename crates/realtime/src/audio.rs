//! PCM16 conversion and block framing for captured audio.

use base64::Engine;
use bytes::Bytes;

/// Sample rate the realtime endpoint expects for `pcm16` input and output.
pub const REALTIME_PCM16_SAMPLE_RATE: u32 = 24_000;

/// Samples per binary frame, matching a 4096-frame audio-processing callback.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Converts one floating-point sample to PCM16.
///
/// The sample is clamped to `[-1.0, 1.0]` first; negative values scale by
/// 32768 and positive values by 32767 so both ends of the range are reachable.
/// NaN maps to silence.
pub fn float_to_pcm16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Converts a slice of f32 samples to PCM16.
pub fn convert_f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples.iter().copied().map(float_to_pcm16).collect()
}

/// Converts PCM16 samples back to f32 in `[-1.0, 1.0)`.
pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Serializes PCM16 samples as little-endian bytes.
pub fn pcm16_to_le_bytes(pcm16: &[i16]) -> Vec<u8> {
    pcm16.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Reads little-endian PCM16 bytes. A trailing odd byte is ignored.
pub fn le_bytes_to_pcm16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

/// Base64-encodes raw little-endian PCM16 bytes for JSON transport.
pub fn encode_pcm16_base64(le_bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(le_bytes)
}

/// Decodes a base64 `response.audio.delta` chunk into PCM16 samples.
///
/// Invalid base64 yields an empty vector and is logged.
pub fn decode_audio_delta(base64_fragment: &str) -> Vec<i16> {
    match base64::engine::general_purpose::STANDARD.decode(base64_fragment) {
        Ok(bytes) => le_bytes_to_pcm16(&bytes),
        Err(e) => {
            tracing::error!(error = %e, "Failed to decode base64 audio delta");
            Vec::new()
        }
    }
}

/// Accumulates captured samples and emits fixed-size PCM16 frames.
///
/// Capture sources hand over samples in whatever chunk size the device uses;
/// the wire carries exactly `block_size` samples per binary frame.
#[derive(Debug)]
pub struct Pcm16Blocker {
    block_size: usize,
    pending: Vec<i16>,
}

impl Pcm16Blocker {
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            pending: Vec::with_capacity(block_size),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Samples held back waiting for a full block.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Feeds samples and returns every completed frame as little-endian bytes.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Bytes> {
        let mut frames = Vec::new();
        for &sample in samples {
            self.pending.push(float_to_pcm16(sample));
            if self.pending.len() == self.block_size {
                frames.push(Bytes::from(pcm16_to_le_bytes(&self.pending)));
                self.pending.clear();
            }
        }
        frames
    }

    /// Drops any partial block.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}
