//! Speech band-pass filtering for captured audio.
//!
//! A low-pass biquad near 2.5 kHz cascaded with a high-pass biquad near
//! 300 Hz. The combination removes sub-300 Hz rumble and high-frequency
//! hiss that is useless to the speech model, cutting false speech triggers
//! and payload noise. Coefficients follow the RBJ audio-EQ cookbook.

use std::f32::consts::PI;

use crate::error::{SessionError, SessionResult};

/// Low-pass cutoff in Hz.
pub const LOW_PASS_CUTOFF_HZ: f32 = 2_500.0;

/// High-pass cutoff in Hz.
pub const HIGH_PASS_CUTOFF_HZ: f32 = 300.0;

/// Moderate resonance for the low-pass stage.
const LOW_PASS_Q: f32 = 1.0;

/// Butterworth response for the high-pass stage.
const HIGH_PASS_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// One direct-form-I biquad section.
#[derive(Debug, Clone)]
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    fn low_pass(sample_rate: f32, cutoff: f32, q: f32) -> Self {
        let w0 = 2.0 * PI * cutoff / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let b1 = 1.0 - cos_w0;
        let b0 = b1 / 2.0;
        Self::normalized(b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    fn high_pass(sample_rate: f32, cutoff: f32, q: f32) -> Self {
        let w0 = 2.0 * PI * cutoff / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = (1.0 + cos_w0) / 2.0;
        Self::normalized(b0, -2.0 * b0, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    fn normalized(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    #[inline]
    fn process_sample(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// Cascaded low-pass + high-pass chain applied to every captured block.
#[derive(Debug)]
pub struct SpeechBandFilter {
    low_pass: Biquad,
    high_pass: Biquad,
}

impl SpeechBandFilter {
    /// Create the filter chain for the given sample rate.
    pub fn new(sample_rate: u32) -> SessionResult<Self> {
        let nyquist = sample_rate as f32 / 2.0;
        if LOW_PASS_CUTOFF_HZ >= nyquist || HIGH_PASS_CUTOFF_HZ >= nyquist {
            return Err(SessionError::AudioGraph(format!(
                "sample rate {sample_rate}Hz too low for speech band filters"
            )));
        }

        Ok(Self {
            low_pass: Biquad::low_pass(sample_rate as f32, LOW_PASS_CUTOFF_HZ, LOW_PASS_Q),
            high_pass: Biquad::high_pass(sample_rate as f32, HIGH_PASS_CUTOFF_HZ, HIGH_PASS_Q),
        })
    }

    /// Filter one block in place, low-pass first then high-pass.
    pub fn process(&mut self, block: &mut [f32]) {
        for sample in block.iter_mut() {
            let low_passed = self.low_pass.process_sample(*sample);
            *sample = self.high_pass.process_sample(low_passed);
        }
    }

    /// Reset filter memory.
    pub fn reset(&mut self) {
        self.low_pass.reset();
        self.high_pass.reset();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(block: &[f32]) -> f32 {
        (block.iter().map(|s| s * s).sum::<f32>() / block.len() as f32).sqrt()
    }

    fn tone(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_rejects_too_low_sample_rate() {
        assert!(SpeechBandFilter::new(4_000).is_err());
        assert!(SpeechBandFilter::new(24_000).is_ok());
    }

    #[test]
    fn test_dc_offset_rejected() {
        let mut filter = SpeechBandFilter::new(24_000).unwrap();
        let mut block = vec![0.8f32; 24_000];
        filter.process(&mut block);

        // After settling, the high-pass stage has removed the constant offset
        let tail = &block[12_000..];
        assert!(rms(tail) < 0.01, "residual DC rms {}", rms(tail));
    }

    #[test]
    fn test_speech_band_passes() {
        let mut filter = SpeechBandFilter::new(24_000).unwrap();
        let mut block = tone(1_000.0, 24_000.0, 24_000);
        let input_rms = rms(&block);
        filter.process(&mut block);

        let output_rms = rms(&block[12_000..]);
        assert!(output_rms > input_rms * 0.5, "1kHz attenuated to {output_rms}");
    }

    #[test]
    fn test_hiss_band_attenuated() {
        let mut filter = SpeechBandFilter::new(24_000).unwrap();
        let mut block = tone(9_000.0, 24_000.0, 24_000);
        let input_rms = rms(&block);
        filter.process(&mut block);

        let output_rms = rms(&block[12_000..]);
        assert!(
            output_rms < input_rms * 0.2,
            "9kHz only attenuated to {output_rms}"
        );
    }

    #[test]
    fn test_reset_clears_memory() {
        let mut filter = SpeechBandFilter::new(24_000).unwrap();
        let mut block = vec![1.0f32; 64];
        filter.process(&mut block);
        filter.reset();

        let mut silent = vec![0.0f32; 64];
        filter.process(&mut silent);
        assert!(rms(&silent) < 1e-6);
    }
}
