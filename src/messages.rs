//! Relay WebSocket message types.
//!
//! All events are JSON-encoded and dispatched on a `type` discriminator.
//!
//! Client events (sent to the relay):
//! - auth_config - Bearer token plus the full session configuration
//! - input_audio_buffer.append - Append one base64 PCM16 chunk
//! - response.cancel - Cancel the in-flight response
//! - stop_audio_conversation - End the audio conversation
//!
//! Server events (received from the relay):
//! - backend-authorized.done - Auth accepted, session may go live
//! - backend-business-error - Non-fatal error reported by the backend
//! - input_audio_buffer.speech_started - Server VAD detected user speech
//! - response.audio.delta - Synthesized audio chunk
//!
//! Anything else the relay sends deserializes to [`ServerEvent::Unknown`] and
//! is ignored, so new server event types never break older clients.

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;

// =============================================================================
// Client Events (sent to relay)
// =============================================================================

/// Client events sent over the relay channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Authentication handshake carrying the token and session configuration
    #[serde(rename = "auth_config")]
    AuthConfig {
        /// Bearer token from the token provider
        token: String,
        /// Session configuration for this conversation
        session: SessionConfig,
    },

    /// Append audio to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded PCM16 audio
        audio: String,
    },

    /// Cancel the current response
    #[serde(rename = "response.cancel")]
    ResponseCancel,

    /// Stop the audio conversation
    #[serde(rename = "stop_audio_conversation")]
    StopAudioConversation,
}

impl ClientEvent {
    /// Create an audio append event from raw PCM16 bytes.
    pub fn audio_append(data: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
        }
    }
}

// =============================================================================
// Server Events (received from relay)
// =============================================================================

/// Server events received over the relay channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Authorization acknowledged; the only entry into the active state
    #[serde(rename = "backend-authorized.done")]
    Authorized,

    /// Non-fatal business error reported by the backend
    #[serde(rename = "backend-business-error")]
    BusinessError {
        /// Human-readable error message
        message: String,
    },

    /// Server VAD detected the user starting to speak
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    /// Synthesized audio chunk for the current response item
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        /// Identifier of the response item this delta belongs to
        item_id: String,
        /// Base64-encoded PCM16 audio delta
        delta: String,
    },

    /// Any event type this client does not consume
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Decode the base64 audio payload of an AudioDelta event.
    pub fn decode_audio_delta(delta: &str) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(delta)
    }
}

// =============================================================================
// Tests
// =============================================================================
