//! Error types for realtime voice sessions.

use thiserror::Error;

/// Errors that can occur while running a voice session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The token provider refused or failed to produce a bearer token
    #[error("Token acquisition failed: {0}")]
    TokenAcquisition(String),

    /// Opening the relay WebSocket failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket transport error after the channel was open
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Building the capture or playback audio graph failed
    #[error("Audio graph error: {0}")]
    AudioGraph(String),

    /// Invalid session configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Event serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No open session channel
    #[error("Not connected")]
    NotConnected,
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
