//! Streaming linear-interpolation resampler.
//!
//! Converts capture audio from the device's native rate to the fixed session
//! rate with zero algorithmic latency. Fractional read position and the last
//! input sample carry across calls so chunk boundaries stay seamless.

use tracing::debug;

use crate::error::{SessionError, SessionResult};

/// Stateful linear-interpolation resampler, f32 in and f32 out.
#[derive(Debug)]
pub struct StreamResampler {
    /// Input samples consumed per output sample
    ratio: f64,
    /// Fractional position in the input stream, preserved across calls
    fractional_pos: f64,
    /// Last input sample of the previous block
    prev_sample: f32,
    /// Whether any input has been seen yet
    primed: bool,
}

impl StreamResampler {
    /// Create a resampler converting `input_rate` Hz to `output_rate` Hz.
    pub fn new(input_rate: u32, output_rate: u32) -> SessionResult<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(SessionError::AudioGraph(format!(
                "invalid resample rates: {input_rate} -> {output_rate}"
            )));
        }

        let ratio = input_rate as f64 / output_rate as f64;
        debug!(
            "resampler created: {}Hz -> {}Hz (ratio {:.4})",
            input_rate, output_rate, ratio
        );

        Ok(Self {
            ratio,
            fractional_pos: 0.0,
            prev_sample: 0.0,
            primed: false,
        })
    }

    /// Resample one block of input samples.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if input.is_empty() {
            return Vec::new();
        }

        let estimated = (input.len() as f64 / self.ratio) as usize + 2;
        let mut output = Vec::with_capacity(estimated);

        if !self.primed {
            self.prev_sample = input[0];
            self.primed = true;
        }

        while self.fractional_pos < input.len() as f64 {
            let idx = self.fractional_pos.floor() as usize;
            let frac = (self.fractional_pos - idx as f64) as f32;

            let a = if idx == 0 && frac < 0.001 {
                self.prev_sample
            } else {
                input[idx]
            };
            let b = if idx + 1 < input.len() {
                input[idx + 1]
            } else {
                input[idx]
            };

            output.push(a + frac * (b - a));
            self.fractional_pos += self.ratio;
        }

        self.fractional_pos -= input.len() as f64;
        if let Some(&last) = input.last() {
            self.prev_sample = last;
        }

        output
    }

    /// Reset stream state.
    pub fn reset(&mut self) {
        self.fractional_pos = 0.0;
        self.prev_sample = 0.0;
        self.primed = false;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_rates() {
        assert!(StreamResampler::new(0, 24_000).is_err());
        assert!(StreamResampler::new(48_000, 0).is_err());
    }

    #[test]
    fn test_downsample_2x() {
        let mut resampler = StreamResampler::new(48_000, 24_000).unwrap();

        // 1ms of input produces ~1ms of output
        let input: Vec<f32> = (0..48).map(|i| i as f32 / 48.0).collect();
        let output = resampler.process(&input);
        assert!((23..=25).contains(&output.len()));
    }

    #[test]
    fn test_identity_rate_preserves_samples() {
        let mut resampler = StreamResampler::new(24_000, 24_000).unwrap();
        let input = vec![0.1f32, 0.2, 0.3, 0.4];
        let output = resampler.process(&input);
        assert_eq!(output.len(), input.len());
        for (o, i) in output.iter().zip(&input) {
            assert!((o - i).abs() < 1e-6);
        }
    }

    #[test]
    fn test_streaming_continuity_across_blocks() {
        let mut resampler = StreamResampler::new(48_000, 24_000).unwrap();

        let block: Vec<f32> = vec![0.5; 480];
        let out1 = resampler.process(&block);
        let out2 = resampler.process(&block);

        assert!(!out1.is_empty());
        assert!(!out2.is_empty());
        // Constant input stays constant through interpolation
        for s in out1.iter().chain(&out2) {
            assert!((s - 0.5).abs() < 1e-6);
        }
        assert!((out1.len() as i32 - out2.len() as i32).abs() <= 1);
    }

    #[test]
    fn test_empty_input_empty_output() {
        let mut resampler = StreamResampler::new(48_000, 24_000).unwrap();
        assert!(resampler.process(&[]).is_empty());
    }
}
