//! Polyplay Core - unified playback core
//!
//! Wraps adaptive-streaming engines (HLS, DASH, plain progressive
//! playback) behind one control surface:
//! - Stream-source resolution with inline clearkey extraction
//! - Lazy engine selection through a capability registry
//! - A single-owner playback session with a load deadline and a
//!   uniform state machine
//! - A transport bridge mapping surface events into observable state
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Polyplay Core                        │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌────────────┐   ┌─────────────┐   ┌────────────────┐   │
//! │  │    URL     │   │   Engine    │   │  Media-Surface │   │
//! │  │  Resolver  │   │  Registry   │   │     Bridge     │   │
//! │  └─────┬──────┘   └──────┬──────┘   └───────┬────────┘   │
//! │        │                 │                  │            │
//! │        └─────────────────┼──────────────────┘            │
//! │                          │                               │
//! │                   ┌──────┴──────┐                        │
//! │                   │   Session   │                        │
//! │                   │   Manager   │                        │
//! │                   └──────┬──────┘                        │
//! │                          │                               │
//! │                   ┌──────┴──────┐                        │
//! │                   │  Playback   │                        │
//! │                   │   Surface   │                        │
//! │                   └─────────────┘                        │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod error;
pub mod resolve;
pub mod session;
pub mod surface;
pub mod types;

mod bridge;

pub use engine::{
    DashEngine, EngineContext, EngineEvent, EngineKind, EngineRegistry, ErrorCategory, HlsEngine,
    NativeEngine, PlaybackEngine,
};
pub use error::{Error, Result};
pub use resolve::{resolve, resolve_source};
pub use session::SessionManager;
pub use surface::{MediaSurface, SimSurface, TransportEvent};
pub use types::{
    ClearKeyPair, PlaybackState, PlayerConfig, ResolvedSource, SessionId, SessionState, SourceHint,
    SourceKind, StreamSource,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the playback core
pub fn init() {
    tracing::info!(version = VERSION, "Polyplay Core initialized");
}
