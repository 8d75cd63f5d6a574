//! Client-side audio pipeline.
//!
//! Capture path: [`CaptureStream`] -> [`StreamResampler`] ->
//! [`SpeechBandFilter`] -> quantized PCM16 chunks for transmission.
//! Playback path: decoded PCM16 frames -> [`Player`] -> host
//! [`PlaybackSink`], with an energy analyser watching the played signal.

pub mod filter;
pub mod pcm;
pub mod player;
pub mod recorder;
pub mod resampler;

pub use filter::{HIGH_PASS_CUTOFF_HZ, LOW_PASS_CUTOFF_HZ, SpeechBandFilter};
pub use pcm::{OutboundAudioBuffer, quantize_block, quantize_sample};
pub use player::{
    PlaybackSink, Player, SILENCE_DURATION_MS, SILENCE_RMS_THRESHOLD, SilenceCallback,
};
pub use recorder::{CaptureStream, FrameHandler, Recorder};
pub use resampler::StreamResampler;
