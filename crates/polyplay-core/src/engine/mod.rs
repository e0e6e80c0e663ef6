//! Playback engine adapters
//!
//! Each concrete streaming engine sits behind the same narrow
//! lifecycle: attach to the surface, load a resolved source, destroy.
//! Engines report readiness and failures to their owner through an
//! event channel; the session manager is the only consumer.

mod dash;
mod hls;
mod native;

pub use dash::DashEngine;
pub use hls::HlsEngine;
pub use native::NativeEngine;

use crate::error::{Error, Result};
use crate::surface::MediaSurface;
use crate::types::{ClearKeyPair, PlayerConfig, SourceKind};
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Concrete engine families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Hls,
    DashCapable,
    Native,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Hls => write!(f, "hls"),
            EngineKind::DashCapable => write!(f, "dash-capable"),
            EngineKind::Native => write!(f, "native"),
        }
    }
}

/// Coarse failure buckets surfaced to the session manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    MediaFormatUnsupported,
    Drm,
    Unknown,
}

impl ErrorCategory {
    /// Bucket a numeric engine error code by range.
    ///
    /// Follows the common streaming-engine convention: 1xxx network,
    /// 3xxx media/format, 6xxx DRM; everything else is unclassified.
    pub fn from_engine_code(code: u32) -> Self {
        match code {
            1000..=1999 => ErrorCategory::Network,
            3000..=4999 => ErrorCategory::MediaFormatUnsupported,
            6000..=6999 => ErrorCategory::Drm,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Derive the bucket from a terminal load error
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::Network(_) | Error::Http(_) | Error::LoadTimeout => ErrorCategory::Network,
            Error::MediaFormatUnsupported(_) | Error::ManifestParse(_) => {
                ErrorCategory::MediaFormatUnsupported
            }
            Error::Drm(_) => ErrorCategory::Drm,
            _ => ErrorCategory::Unknown,
        }
    }

    /// User-facing message class for this bucket
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "A network error interrupted playback",
            ErrorCategory::MediaFormatUnsupported => "The stream could not be decoded",
            ErrorCategory::Drm => "The stream is protected and could not be unlocked",
            ErrorCategory::Unknown => "Playback failed due to an unexpected error",
        }
    }
}

/// Events an engine reports to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Manifest parsed / metadata available; playback may start
    Ready,
    /// Engine failure. Non-fatal errors were already recovered in
    /// place and are reported for observability only.
    Error {
        fatal: bool,
        category: ErrorCategory,
        detail: String,
    },
}

/// Uniform engine lifecycle.
///
/// `destroy` is idempotent and must be safe to call at any point,
/// including after a failed or never-completed `load`. Engines also
/// call it from `Drop` so an aborted load task cannot leak resources.
#[async_trait]
pub trait PlaybackEngine: Send {
    fn kind(&self) -> EngineKind;

    /// Bind the engine to the playback surface
    fn attach(&mut self, surface: Arc<dyn MediaSurface>) -> Result<()>;

    /// Begin fetching and validating the source; resolves when
    /// playback is ready to start
    async fn load(&mut self, clean_url: &str, drm: Option<&ClearKeyPair>) -> Result<()>;

    /// Release all resources and detach listeners
    fn destroy(&mut self);
}

/// Everything an engine constructor needs from the session
#[derive(Clone)]
pub struct EngineContext {
    pub config: PlayerConfig,
    pub events: mpsc::UnboundedSender<EngineEvent>,
}

type EngineFactory = Arc<dyn Fn(EngineContext) -> Result<Box<dyn PlaybackEngine>> + Send + Sync>;

/// Lazy `kind -> constructor` capability registry.
///
/// Engines are resolved at session-construction time, never ahead of
/// it. A factory fails with [`Error::EngineUnsupported`] when the
/// runtime lacks what its engine needs; tests install mock factories
/// through [`EngineRegistry::register`].
#[derive(Clone)]
pub struct EngineRegistry {
    factories: HashMap<SourceKind, EngineFactory>,
}

impl EngineRegistry {
    /// Empty registry with no capabilities
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry wired with the built-in engines
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(SourceKind::Hls, |ctx| Ok(Box::new(HlsEngine::new(ctx))));
        registry.register(SourceKind::Dash, |ctx| Ok(Box::new(DashEngine::new(ctx))));
        registry.register(SourceKind::Native, |ctx| {
            Ok(Box::new(NativeEngine::new(ctx)))
        });
        registry
    }

    /// Install or replace the factory for a source kind
    pub fn register<F>(&mut self, kind: SourceKind, factory: F)
    where
        F: Fn(EngineContext) -> Result<Box<dyn PlaybackEngine>> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Arc::new(factory));
    }

    /// True when a factory exists for the kind
    pub fn supports(&self, kind: SourceKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Construct the engine for a kind
    pub fn create(&self, kind: SourceKind, ctx: EngineContext) -> Result<Box<dyn PlaybackEngine>> {
        let factory = self
            .factories
            .get(&kind)
            .ok_or_else(|| Error::EngineUnsupported {
                kind: kind.to_string(),
            })?;
        factory(ctx)
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Exponential backoff with randomized jitter, capped at `max`.
///
/// The jitter factor is drawn from `[0.5, 1.5)` so concurrent retries
/// spread out instead of stampeding.
pub(crate) fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt.min(16)));
    let capped = exp.min(max);
    let jitter: f64 = rand::thread_rng().gen_range(0.5..1.5);
    capped.mul_f64(jitter).min(max)
}
