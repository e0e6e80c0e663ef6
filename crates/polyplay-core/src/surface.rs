//! Playback surface abstraction
//!
//! The surface is the platform primitive that decodes and renders a
//! media stream. Engines hand it a source URL; it reports transport
//! events back. One surface persists across engine swaps within a
//! component instance.

use crate::error::{Error, Result};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

/// Native transport notifications emitted by a playback surface
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Playback position progressed (seconds)
    TimeUpdate(f64),
    /// Content duration became known or changed (seconds)
    DurationChange(f64),
    /// Metadata for the current source is available
    LoadedMetadata,
    /// Playback started or resumed
    Play,
    /// Playback paused
    Pause,
    /// Playback stalled waiting for data
    Waiting,
    /// Enough data buffered to (re)start
    CanPlay,
    /// Playback reached the end of the content
    Ended,
    /// Surface-level playback failure
    SurfaceError(String),
}

/// The single playback surface a session renders into.
///
/// Commands are fire-and-forget except `play`, which an environment may
/// reject (autoplay policy). Implementations fan transport events out
/// to every subscriber.
pub trait MediaSurface: Send + Sync {
    /// Assign a source URL directly to the surface
    fn set_source(&self, url: &str);

    /// Detach the current source and stop any fetch in progress
    fn clear_source(&self);

    /// Start playback; fails with [`Error::AutoplayBlocked`] when the
    /// environment rejects unattended playback
    fn play(&self) -> Result<()>;

    fn pause(&self);

    fn seek_to(&self, seconds: f64);

    /// Volume, 0-100
    fn set_volume(&self, volume: u8);

    fn set_muted(&self, muted: bool);

    fn toggle_fullscreen(&self);

    fn current_time(&self) -> f64;

    fn duration(&self) -> Option<f64>;

    /// Whether the surface can play HLS without a dedicated engine
    fn supports_native_hls(&self) -> bool;

    /// Register a new transport-event subscriber
    fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent>;
}

/// In-memory surface for headless probing and tests.
///
/// Behaves like a cooperative media element: commands mutate internal
/// state and echo the matching transport events synchronously. Tests
/// drive stalls and progress through the `emit_*` helpers.
pub struct SimSurface {
    inner: Mutex<SimState>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
}

#[derive(Debug)]
struct SimState {
    source: Option<String>,
    playing: bool,
    muted: bool,
    volume: u8,
    current_time: f64,
    duration: Option<f64>,
    fullscreen: bool,
    allow_autoplay: bool,
    native_hls: bool,
    /// Emit `LoadedMetadata` as soon as a source is assigned
    auto_metadata: bool,
}

impl SimSurface {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SimState {
                source: None,
                playing: false,
                muted: false,
                volume: 100,
                current_time: 0.0,
                duration: None,
                fullscreen: false,
                allow_autoplay: true,
                native_hls: false,
                auto_metadata: true,
            }),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Reject `play` calls until a user gesture, like a strict browser
    pub fn with_autoplay_blocked(self) -> Self {
        self.inner.lock().unwrap().allow_autoplay = false;
        self
    }

    /// Report native HLS capability
    pub fn with_native_hls(self) -> Self {
        self.inner.lock().unwrap().native_hls = true;
        self
    }

    /// Require the test to emit `LoadedMetadata` explicitly
    pub fn with_manual_metadata(self) -> Self {
        self.inner.lock().unwrap().auto_metadata = false;
        self
    }

    /// Inject a raw transport event
    pub fn emit(&self, event: TransportEvent) {
        trace!(?event, "sim surface event");
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Signal that the current source's metadata is available
    pub fn emit_metadata(&self, duration: f64) {
        self.inner.lock().unwrap().duration = Some(duration);
        self.emit(TransportEvent::DurationChange(duration));
        self.emit(TransportEvent::LoadedMetadata);
    }

    /// Move the playhead and report progress
    pub fn advance_time(&self, seconds: f64) {
        let time = {
            let mut inner = self.inner.lock().unwrap();
            inner.current_time += seconds;
            inner.current_time
        };
        self.emit(TransportEvent::TimeUpdate(time));
    }

    /// Enter a buffering stall
    pub fn begin_stall(&self) {
        self.emit(TransportEvent::Waiting);
    }

    /// Recover from a buffering stall
    pub fn end_stall(&self) {
        self.emit(TransportEvent::CanPlay);
    }

    pub fn source(&self) -> Option<String> {
        self.inner.lock().unwrap().source.clone()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.inner.lock().unwrap().fullscreen
    }

    pub fn volume(&self) -> u8 {
        self.inner.lock().unwrap().volume
    }

    pub fn is_muted(&self) -> bool {
        self.inner.lock().unwrap().muted
    }
}

impl Default for SimSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaSurface for SimSurface {
    fn set_source(&self, url: &str) {
        let auto = {
            let mut inner = self.inner.lock().unwrap();
            inner.source = Some(url.to_string());
            inner.current_time = 0.0;
            inner.auto_metadata
        };
        if auto {
            self.emit(TransportEvent::LoadedMetadata);
        }
    }

    fn clear_source(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.source = None;
        inner.playing = false;
    }

    fn play(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            if !inner.allow_autoplay {
                return Err(Error::AutoplayBlocked);
            }
            inner.playing = true;
        }
        self.emit(TransportEvent::Play);
        Ok(())
    }

    fn pause(&self) {
        self.inner.lock().unwrap().playing = false;
        self.emit(TransportEvent::Pause);
    }

    fn seek_to(&self, seconds: f64) {
        self.inner.lock().unwrap().current_time = seconds;
        self.emit(TransportEvent::TimeUpdate(seconds));
    }

    fn set_volume(&self, volume: u8) {
        self.inner.lock().unwrap().volume = volume.min(100);
    }

    fn set_muted(&self, muted: bool) {
        self.inner.lock().unwrap().muted = muted;
    }

    fn toggle_fullscreen(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.fullscreen = !inner.fullscreen;
    }

    fn current_time(&self) -> f64 {
        self.inner.lock().unwrap().current_time
    }

    fn duration(&self) -> Option<f64> {
        self.inner.lock().unwrap().duration
    }

    fn supports_native_hls(&self) -> bool {
        self.inner.lock().unwrap().native_hls
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }
}
