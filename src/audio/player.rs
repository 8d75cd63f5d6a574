//! Playback of synthesized audio and output-channel silence monitoring.
//!
//! The player forwards PCM16 frames to a host-provided low-latency sink and
//! keeps an energy analyser over the played signal. A polling monitor
//! classifies the output channel as active or silent; the session manager
//! uses the silence signal to re-open the microphone after the model stops
//! speaking on speaker setups without hardware echo cancellation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// RMS threshold below which the output channel counts as silent, on the
/// analyser's 0-255 byte domain centered at 128.
pub const SILENCE_RMS_THRESHOLD: f32 = 1.0;

/// Continuous quiet time before the output channel is declared silent.
pub const SILENCE_DURATION_MS: u64 = 1_400;

/// Monitor polling period, matching a host frame tick.
const MONITOR_POLL_MS: u64 = 16;

/// Quiet window after the last frame before the analyser reads as empty.
const ANALYSER_IDLE_MS: u64 = 250;

/// Destination for playback frames, implemented by the embedding host.
///
/// `write` queues a frame for immediate rendering and must not block;
/// `flush` drops everything still queued.
pub trait PlaybackSink: Send + Sync {
    /// Queue one PCM16 frame for playback.
    fn write(&self, frame: Bytes);

    /// Discard all queued, not-yet-rendered audio.
    fn flush(&self);
}

/// Callback fired while the output channel is silent.
///
/// Level-triggered: it may fire on every poll for as long as silence
/// persists, so callers must be idempotent to repeat triggers.
pub type SilenceCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug)]
struct AnalyserState {
    /// Energy of the most recently played frame
    rms: f32,
    /// Last time the signal exceeded the silence threshold
    last_active: Instant,
    /// Last time any frame was played
    last_frame: Instant,
}

/// Owns the playback path and its silence monitor.
pub struct Player {
    sink: Arc<dyn PlaybackSink>,
    sample_rate: u32,
    analyser: Arc<Mutex<AnalyserState>>,
    monitor: Option<JoinHandle<()>>,
}

impl Player {
    /// Construct the playback path at the given sample rate.
    pub fn start(sink: Arc<dyn PlaybackSink>, sample_rate: u32) -> Self {
        debug!("player started at {}Hz", sample_rate);
        let now = Instant::now();
        Self {
            sink,
            sample_rate,
            analyser: Arc::new(Mutex::new(AnalyserState {
                rms: 0.0,
                last_active: now,
                last_frame: now,
            })),
            monitor: None,
        }
    }

    /// Sample rate the playback path was constructed at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Queue one PCM16 frame for immediate rendering.
    ///
    /// Does not block; successive calls play back in order.
    pub fn play(&self, frame: Bytes) {
        let rms = byte_domain_rms(&frame);
        if let Ok(mut state) = self.analyser.lock() {
            let now = Instant::now();
            state.rms = rms;
            state.last_frame = now;
            if rms > SILENCE_RMS_THRESHOLD {
                state.last_active = now;
            }
        }
        self.sink.write(frame);
    }

    /// Begin polling the analyser, invoking `on_silence` while the output
    /// channel has been quiet for longer than [`SILENCE_DURATION_MS`].
    ///
    /// A no-op when the monitor is already running; the loop runs until
    /// [`Player::stop`] tears the analyser down.
    pub fn start_monitoring(&mut self, on_silence: SilenceCallback) {
        if self.monitor.is_some() {
            return;
        }

        let analyser = self.analyser.clone();
        self.monitor = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(MONITOR_POLL_MS));
            loop {
                tick.tick().await;

                let (rms, last_active) = match analyser.lock() {
                    Ok(state) => {
                        // Nothing played recently means the channel is idle
                        let rms = if state.last_frame.elapsed()
                            > Duration::from_millis(ANALYSER_IDLE_MS)
                        {
                            0.0
                        } else {
                            state.rms
                        };
                        (rms, state.last_active)
                    }
                    Err(_) => continue,
                };

                if rms < SILENCE_RMS_THRESHOLD
                    && last_active.elapsed() >= Duration::from_millis(SILENCE_DURATION_MS)
                {
                    trace!("output channel silent");
                    on_silence();
                }
            }
        }));
    }

    /// Flush the sink's queue without tearing down the analyser.
    ///
    /// Interrupts the current utterance while keeping the session alive.
    pub fn clear_buffer(&self) {
        self.sink.flush();
    }

    /// Flush queued audio and stop the monitor. Idempotent.
    pub fn stop(&mut self) {
        self.sink.flush();
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
            debug!("player stopped");
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
    }
}

/// RMS of a PCM16 frame mapped onto the analyser's unsigned byte domain,
/// where 128 is the zero line.
fn byte_domain_rms(frame: &[u8]) -> f32 {
    let sample_count = frame.len() / 2;
    if sample_count == 0 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    for pair in frame.chunks_exact(2) {
        let sample = i16::from_le_bytes([pair[0], pair[1]]) as f64;
        let deviation = sample / 256.0;
        sum += deviation * deviation;
    }
    (sum / sample_count as f64).sqrt() as f32
}

// =============================================================================
// Tests
// =============================================================================
