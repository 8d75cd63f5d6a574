//! Realtime voice transport for chat clients.
//!
//! Streams microphone audio to a backend relay over a WebSocket and plays
//! model responses back, with client-side resampling to 24 kHz PCM16, a
//! speech band-pass filter, and echo-avoidance flow control for speaker
//! setups. Also provides incremental reassembly of newline-delimited JSON
//! chat streams.
//!
//! The entry point is [`AudioManager`]: give it a backend host, a
//! [`SessionConfig`], a token provider and a [`PlaybackSink`], then start a
//! session with a [`CaptureStream`] of mic frames.

pub mod audio;
pub mod config;
pub mod error;
pub mod messages;
pub mod session;
pub mod stream;

// Re-export commonly used items for convenience
pub use audio::{CaptureStream, PlaybackSink, Player, Recorder};
pub use config::{SessionConfig, TurnDetection, Voice};
pub use error::{SessionError, SessionResult};
pub use messages::{ClientEvent, ServerEvent};
pub use session::{AudioManager, SessionState, TokenProvider};
pub use stream::ChunkAssembler;
