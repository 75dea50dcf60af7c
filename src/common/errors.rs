use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exception severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Common,
    Suspicious,
    Fault,
}

/// Errors surfaced by the command router.
///
/// None of these are fatal: the router logs them and drops the command.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A required field was missing, empty or unparseable.
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// Source resolution failed or matched nothing.
    #[error("failed to load '{source_ref}': {message}")]
    LoadFailure { source_ref: String, message: String },

    /// The control channel is gone.
    #[error("control channel disconnected")]
    TransportDisconnect,

    /// Creating another session would exceed `sessions.max_sessions`.
    #[error("session limit of {0} reached")]
    SessionLimit(usize),

    #[error(transparent)]
    Voice(#[from] VoiceError),
}

impl BridgeError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedCommand(message.into())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedCommand(e.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VoiceError {
    #[error("invalid voice server update: {0}")]
    InvalidServerUpdate(&'static str),
}

/// Raised by a playback driver that cannot start a track.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("track rejected: {0}")]
    Rejected(String),
}
