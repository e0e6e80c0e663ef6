//! Error types for the playback core

use thiserror::Error;

/// Result type alias for playback operations
pub type Result<T> = std::result::Result<T, Error>;

/// Playback error types
#[derive(Error, Debug)]
pub enum Error {
    // Input errors
    #[error("No media source supplied")]
    NoSource,

    // Engine lifecycle errors
    #[error("No playback engine available for source kind: {kind}")]
    EngineUnsupported { kind: String },

    #[error("Engine is not attached to a playback surface")]
    NotAttached,

    // Load errors
    #[error("Load deadline exceeded")]
    LoadTimeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Media format not supported: {0}")]
    MediaFormatUnsupported(String),

    #[error("DRM failure: {0}")]
    Drm(String),

    #[error("Unclassified load failure: {0}")]
    UnknownLoad(String),

    // Manifest errors
    #[error("Failed to parse manifest: {0}")]
    ManifestParse(String),

    // Playback surface errors
    #[error("Autoplay rejected by the environment")]
    AutoplayBlocked,

    #[error("Invalid playback state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    // Transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Returns true if this error may succeed on retry without teardown
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Http(_))
    }

    /// Returns the error code used in logs and analytics
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NoSource => "NO_SOURCE",
            Error::EngineUnsupported { .. } => "ENGINE_UNSUPPORTED",
            Error::NotAttached => "NOT_ATTACHED",
            Error::LoadTimeout => "LOAD_TIMEOUT",
            Error::Network(_) => "NETWORK",
            Error::MediaFormatUnsupported(_) => "MEDIA_UNSUPPORTED",
            Error::Drm(_) => "DRM",
            Error::UnknownLoad(_) => "UNKNOWN_LOAD",
            Error::ManifestParse(_) => "MANIFEST_PARSE",
            Error::AutoplayBlocked => "AUTOPLAY_BLOCKED",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::Http(_) => "HTTP",
        }
    }

    /// Human-readable message for the UI shell.
    ///
    /// Raw engine diagnostics go to the log, never into this string.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::NoSource => "No video source provided",
            Error::EngineUnsupported { .. } => "This stream format is not supported on this device",
            Error::LoadTimeout => "Loading timed out - check your connection and try again",
            Error::Network(_) | Error::Http(_) => "A network error interrupted playback",
            Error::MediaFormatUnsupported(_) | Error::ManifestParse(_) => {
                "The stream could not be decoded"
            }
            Error::Drm(_) => "The stream is protected and could not be unlocked",
            Error::AutoplayBlocked => "Press play to start playback",
            _ => "Playback failed due to an unexpected error",
        }
    }
}
