//! PCM16 quantization and outbound chunk batching.

use base64::prelude::*;

use crate::config::OUTBOUND_CHUNK_BYTES;

/// Quantize one f32 sample in [-1.0, 1.0] to a signed 16-bit value.
///
/// Floor-then-clamp, with asymmetric scaling so the full int16 range is
/// reachable at both ends: -1.0 maps to -32768 and 1.0 to 32767.
#[inline]
pub fn quantize_sample(sample: f32) -> i16 {
    let scaled = if sample < 0.0 {
        sample * 32_768.0
    } else {
        sample * 32_767.0
    };
    scaled.floor().clamp(-32_768.0, 32_767.0) as i16
}

/// Quantize a block of f32 samples to little-endian PCM16 bytes.
pub fn quantize_block(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&quantize_sample(sample).to_le_bytes());
    }
    bytes
}

/// Accumulates outbound PCM16 bytes and emits fixed-size base64 chunks.
///
/// Whenever the buffer holds at least [`OUTBOUND_CHUNK_BYTES`], exactly that
/// many bytes are drained. The drained block is only transmitted while the
/// clear-to-send flag is up; otherwise it is discarded, never deferred, so
/// audio captured during playback cannot arrive late.
#[derive(Debug, Default)]
pub struct OutboundAudioBuffer {
    pending: Vec<u8>,
}

impl OutboundAudioBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Quantize and accumulate a block of samples, transmitting every full
    /// chunk through `transmit` as a base64 string.
    pub fn push<F: FnMut(String)>(&mut self, samples: &[f32], clear_to_send: bool, mut transmit: F) {
        self.pending.extend(quantize_block(samples));

        while self.pending.len() >= OUTBOUND_CHUNK_BYTES {
            let chunk: Vec<u8> = self.pending.drain(..OUTBOUND_CHUNK_BYTES).collect();
            if clear_to_send {
                transmit(BASE64_STANDARD.encode(&chunk));
            }
        }
    }

    /// Drop any accumulated bytes.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Bytes currently accumulated below the chunk threshold.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
