//! Core types for the playback core

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied hint about the stream container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceHint {
    Hls,
    Dash,
    Mp4,
}

/// Raw input describing what to play.
///
/// Immutable once supplied; a new value triggers full session
/// teardown and rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSource {
    /// Opaque source string, possibly carrying an inline DRM block
    pub raw_url: String,
    /// Advisory container hint; URL sniffing takes precedence
    pub hinted_type: Option<SourceHint>,
}

impl StreamSource {
    pub fn new(raw_url: impl Into<String>) -> Self {
        Self {
            raw_url: raw_url.into(),
            hinted_type: None,
        }
    }

    pub fn with_hint(mut self, hint: SourceHint) -> Self {
        self.hinted_type = Some(hint);
        self
    }
}

/// Resolved playback kind of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    Hls,
    Dash,
    Native,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Hls => write!(f, "hls"),
            SourceKind::Dash => write!(f, "dash"),
            SourceKind::Native => write!(f, "native"),
        }
    }
}

/// Inline clearkey credentials extracted from the source URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearKeyPair {
    /// Key-exchange scheme; only `clearkey` is interpreted
    pub scheme: String,
    /// Hex key identifier
    pub key_id: String,
    /// Hex key
    pub key: String,
}

/// A source string resolved into a clean URL, a playback kind and
/// optional clearkey credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSource {
    /// Playback URL with any inline DRM block stripped
    pub clean_url: String,
    /// Resolved playback kind
    pub kind: SourceKind,
    /// Present only for a syntactically valid clearkey block
    pub drm: Option<ClearKeyPair>,
}

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// No content loaded
    Idle,
    /// Engine constructed, load in flight
    Loading,
    /// Load finished but playback not started (autoplay rejected)
    Ready,
    /// Content is playing
    Playing,
    /// Playback paused
    Paused,
    /// Stalled waiting for data; returns to the prior state on resume
    Buffering,
    /// Terminal for the session; re-entry only via an explicit retry
    Error,
}

impl SessionState {
    /// Check if a transition to the target state is valid.
    ///
    /// Every state accepts `Loading` (new source) and `Idle` (teardown).
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        if matches!(target, Loading | Idle) {
            return true;
        }
        matches!(
            (self, target),
            // From Idle
            (Idle, Error) |
            // From Loading
            (Loading, Ready) | (Loading, Playing) | (Loading, Error) |
            // From Ready
            (Ready, Playing) | (Ready, Paused) | (Ready, Error) |
            // From Playing
            (Playing, Paused) | (Playing, Buffering) | (Playing, Error) |
            // From Paused
            (Paused, Playing) | (Paused, Buffering) | (Paused, Error) |
            // From Buffering
            (Buffering, Playing) | (Buffering, Paused) | (Buffering, Error)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Loading => write!(f, "loading"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Playing => write!(f, "playing"),
            SessionState::Paused => write!(f, "paused"),
            SessionState::Buffering => write!(f, "buffering"),
            SessionState::Error => write!(f, "error"),
        }
    }
}

/// Observable playback state exposed to the UI shell.
///
/// Mutated only by the media-surface bridge and the session manager;
/// read-only to the shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub is_muted: bool,
    /// Volume, 0-100
    pub volume: u8,
    /// Current position in seconds
    pub current_time: f64,
    /// Content duration in seconds, once known
    pub duration: Option<f64>,
    pub is_loading: bool,
    /// User-facing message when the session is in `Error`
    pub error: Option<String>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            is_playing: false,
            is_muted: false,
            volume: 100,
            current_time: 0.0,
            duration: None,
            is_loading: false,
            error: None,
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Deadline for a full load attempt
    pub load_timeout: Duration,
    /// Per-request timeout for manifest fetches
    pub request_timeout: Duration,
    /// Attempt cap for recoverable manifest fetch failures
    pub retry_attempts: u32,
    /// Base delay for exponential backoff between retries
    pub retry_base_delay: Duration,
    /// Upper bound on a single backoff delay
    pub retry_max_delay: Duration,
    /// Forward buffering goal in seconds
    pub buffer_goal_secs: f64,
    /// Behind-buffer retention limit in seconds
    pub buffer_behind_secs: f64,
    /// Start playback as soon as the load resolves
    pub autoplay: bool,
    /// Volume applied to the surface when a load resolves, 0-100
    pub initial_volume: u8,
    /// Mute flag applied to the surface when a load resolves
    pub initial_muted: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(10),
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(8),
            buffer_goal_secs: 30.0,
            buffer_behind_secs: 30.0,
            autoplay: true,
            initial_volume: 100,
            initial_muted: false,
        }
    }
}
