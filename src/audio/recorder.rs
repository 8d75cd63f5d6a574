//! Microphone capture graph.
//!
//! The embedding host acquires the capture device (mono, echo-cancelled,
//! noise-suppressed) and hands the recorder a [`CaptureStream`] of raw f32
//! blocks at the device's native rate. The recorder owns the processing
//! graph from there: resample to the session rate, band-pass filter, then
//! deliver fixed-format blocks to the caller's handler.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::filter::SpeechBandFilter;
use super::resampler::StreamResampler;
use crate::config::TARGET_SAMPLE_RATE;
use crate::error::SessionResult;

/// A live audio capture stream handed over by the host.
///
/// The recorder takes exclusive ownership; dropping the receiver releases
/// the capture device back to the system.
pub struct CaptureStream {
    /// Native sample rate of the capture device in Hz
    pub sample_rate: u32,
    /// Blocks of raw f32 samples from the device
    pub frames: mpsc::Receiver<Vec<f32>>,
}

impl CaptureStream {
    /// Wrap an already-acquired capture feed.
    pub fn new(sample_rate: u32, frames: mpsc::Receiver<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            frames,
        }
    }
}

/// Handler invoked with each processed block of f32 samples at the session
/// rate.
pub type FrameHandler = Arc<dyn Fn(&[f32]) + Send + Sync>;

/// Owns the capture processing graph and its driving task.
pub struct Recorder {
    task: Option<JoinHandle<()>>,
}

impl Recorder {
    /// Build the processing graph and start draining the capture stream.
    ///
    /// Fails without leaving anything behind if the resampler or filter
    /// chain cannot be constructed for the stream's native rate.
    pub fn start(stream: CaptureStream, handler: FrameHandler) -> SessionResult<Self> {
        let mut resampler = StreamResampler::new(stream.sample_rate, TARGET_SAMPLE_RATE)?;
        let mut filter = SpeechBandFilter::new(TARGET_SAMPLE_RATE)?;
        let mut frames = stream.frames;

        info!(
            "recorder started: {}Hz capture -> {}Hz session audio",
            stream.sample_rate, TARGET_SAMPLE_RATE
        );

        let task = tokio::spawn(async move {
            while let Some(block) = frames.recv().await {
                let mut processed = resampler.process(&block);
                if processed.is_empty() {
                    continue;
                }
                filter.process(&mut processed);
                handler(&processed);
            }
            debug!("capture stream ended");
        });

        Ok(Self { task: Some(task) })
    }

    /// Stop processing and release the capture stream.
    ///
    /// Idempotent; safe to call when never started or already stopped.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("recorder stopped");
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_frames_resampled_and_delivered() {
        let (tx, rx) = mpsc::channel(8);
        let received: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = received.clone();
        let handler: FrameHandler = Arc::new(move |block: &[f32]| {
            sink.lock().unwrap().extend_from_slice(block);
        });

        let mut recorder = Recorder::start(CaptureStream::new(48_000, rx), handler).unwrap();

        // 10ms of 48kHz capture should produce ~240 samples at 24kHz
        tx.send(vec![0.3f32; 480]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let count = received.lock().unwrap().len();
        assert!((230..=250).contains(&count), "got {count} samples");

        recorder.stop();
    }

    #[tokio::test]
    async fn test_invalid_capture_rate_fails_construction() {
        let (_tx, rx) = mpsc::channel::<Vec<f32>>(1);
        let handler: FrameHandler = Arc::new(|_| {});
        assert!(Recorder::start(CaptureStream::new(0, rx), handler).is_err());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (_tx, rx) = mpsc::channel::<Vec<f32>>(1);
        let handler: FrameHandler = Arc::new(|_| {});
        let mut recorder = Recorder::start(CaptureStream::new(48_000, rx), handler).unwrap();
        recorder.stop();
        recorder.stop();
    }
}
