//! Session configuration and relay endpoint derivation.
//!
//! A [`SessionConfig`] is built by the caller before a session starts and is
//! immutable for the lifetime of that session; edits made mid-session only
//! apply to the next one.

use serde::{Deserialize, Serialize};

/// Fixed sample rate for session audio (both directions), in Hz.
pub const TARGET_SAMPLE_RATE: u32 = 24_000;

/// Relay path carrying the realtime audio WebSocket.
pub const REALTIME_AUDIO_PATH: &str = "/api/v1/chats/ws-realtime-audio";

/// Size of one outbound audio chunk in bytes (PCM16, little-endian).
pub const OUTBOUND_CHUNK_BYTES: usize = 4_800;

/// Lowest accepted sampling temperature.
pub const TEMPERATURE_MIN: f32 = 0.6;

/// Highest accepted sampling temperature.
pub const TEMPERATURE_MAX: f32 = 1.2;

// =============================================================================
// Voices
// =============================================================================

/// Voices supported by the relay backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    /// Alloy voice (default)
    #[default]
    Alloy,
    /// Ash voice
    Ash,
    /// Ballad voice
    Ballad,
    /// Coral voice
    Coral,
    /// Echo voice
    Echo,
    /// Sage voice
    Sage,
    /// Shimmer voice
    Shimmer,
    /// Verse voice
    Verse,
}

impl Voice {
    /// Convert to the wire parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "alloy" => Self::Alloy,
            "ash" => Self::Ash,
            "ballad" => Self::Ballad,
            "coral" => Self::Coral,
            "echo" => Self::Echo,
            "sage" => Self::Sage,
            "shimmer" => Self::Shimmer,
            "verse" => Self::Verse,
            _ => Self::default(),
        }
    }

    /// Get all supported voices.
    pub fn all() -> &'static [Voice] {
        &[
            Self::Alloy,
            Self::Ash,
            Self::Ballad,
            Self::Coral,
            Self::Echo,
            Self::Sage,
            Self::Shimmer,
            Self::Verse,
        ]
    }
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Turn detection
// =============================================================================

/// Turn detection configuration sent with the session config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    /// Server-side energy VAD
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold (0.0 to 1.0)
        #[serde(skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        /// Audio to include before detected speech (ms)
        #[serde(skip_serializing_if = "Option::is_none")]
        prefix_padding_ms: Option<u32>,
        /// Trailing silence before end of turn (ms)
        #[serde(skip_serializing_if = "Option::is_none")]
        silence_duration_ms: Option<u32>,
    },
    /// No automatic turn detection
    #[serde(rename = "none")]
    None {},
}

impl Default for TurnDetection {
    fn default() -> Self {
        TurnDetection::ServerVad {
            threshold: Some(0.5),
            prefix_padding_ms: Some(300),
            silence_duration_ms: Some(500),
        }
    }
}

// =============================================================================
// Session configuration
// =============================================================================

/// Configuration for one voice session.
///
/// Carried verbatim in the `auth_config` frame; the `headset` flag is also
/// read client-side to disable the echo-avoidance flow control when the
/// user's hardware performs its own echo cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// System instructions for the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Enabled response modalities
    pub modalities: Vec<String>,

    /// Transcription model identifier for user speech
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription_model: Option<String>,

    /// Turn detection parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,

    /// Voice for synthesized output
    pub voice: Voice,

    /// Sampling temperature, clamped to the supported range before sending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum output token count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// Enabled tool identifiers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,

    /// The user's hardware performs echo cancellation; disables the
    /// half-duplex mic/speaker flow control
    #[serde(default)]
    pub headset: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            instructions: None,
            modalities: vec!["text".to_string(), "audio".to_string()],
            transcription_model: None,
            turn_detection: Some(TurnDetection::default()),
            voice: Voice::default(),
            temperature: None,
            max_output_tokens: None,
            tools: Vec::new(),
            headset: false,
        }
    }
}

impl SessionConfig {
    /// Copy of this config with the temperature clamped to the supported range.
    pub fn normalized(&self) -> Self {
        let mut config = self.clone();
        config.temperature = config
            .temperature
            .map(|t| t.clamp(TEMPERATURE_MIN, TEMPERATURE_MAX));
        config
    }
}

// =============================================================================
// Endpoint derivation
// =============================================================================

/// Strip any HTTP scheme and trailing slash from a configured backend host.
pub(crate) fn backend_authority(backend_host: &str) -> &str {
    backend_host
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
}

/// Build the relay WebSocket URL for a configured backend host.
///
/// Local backends are reached over plain `ws://`; anything else uses the
/// secure scheme.
pub fn relay_url(backend_host: &str) -> String {
    let authority = backend_authority(backend_host);
    let scheme = if authority.starts_with("localhost") || authority.starts_with("127.0.0.1") {
        "ws"
    } else {
        "wss"
    };
    format!("{scheme}://{authority}{REALTIME_AUDIO_PATH}")
}

// =============================================================================
// Tests
// =============================================================================
