//! Playback session management
//!
//! Owns the single active engine for the component's lifetime,
//! enforces at-most-one-engine-at-a-time, arms the load deadline and
//! exposes the unified state machine to the UI shell.

use crate::bridge;
use crate::engine::{EngineContext, EngineEvent, EngineRegistry, PlaybackEngine};
use crate::error::Error;
use crate::resolve::resolve_source;
use crate::surface::MediaSurface;
use crate::types::{PlaybackState, PlayerConfig, SessionId, SessionState, StreamSource};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Exclusive slot for the live engine handle.
///
/// Installing a new handle always tears the old one down first, so two
/// live engines can never coexist.
#[derive(Default)]
pub(crate) struct EngineSlot {
    engine: Option<Box<dyn PlaybackEngine>>,
}

impl EngineSlot {
    /// Destroy any current engine and install the replacement
    pub(crate) fn install(&mut self, engine: Box<dyn PlaybackEngine>) {
        self.clear();
        self.engine = Some(engine);
    }

    /// Destroy and drop the current engine, if any. Idempotent.
    pub(crate) fn clear(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
        }
    }

    pub(crate) fn is_occupied(&self) -> bool {
        self.engine.is_some()
    }
}

/// State shared between the session manager, its spawned tasks and the
/// media-surface bridge
pub(crate) struct Shared {
    pub(crate) state_tx: watch::Sender<SessionState>,
    pub(crate) playback_tx: watch::Sender<PlaybackState>,
    /// State to return to when a buffering stall resolves
    pub(crate) resume_state: StdMutex<SessionState>,
    /// Session identity; bumped on every new source and on shutdown.
    /// Late callbacks from a superseded identity are discarded.
    pub(crate) generation: AtomicU64,
    pub(crate) shut_down: AtomicBool,
    pub(crate) engine: Mutex<EngineSlot>,
}

impl Shared {
    fn new(initial_playback: PlaybackState) -> Self {
        Self {
            state_tx: watch::Sender::new(SessionState::Idle),
            playback_tx: watch::Sender::new(initial_playback),
            resume_state: StdMutex::new(SessionState::Paused),
            generation: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
            engine: Mutex::new(EngineSlot::default()),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub(crate) fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Apply a transition if the table allows it; log and skip otherwise
    pub(crate) fn transition(&self, target: SessionState) -> bool {
        if self.is_shut_down() {
            return false;
        }
        let current = self.state();
        if current == target {
            return true;
        }
        if !current.can_transition_to(target) {
            warn!(from = %current, to = %target, "state transition rejected");
            return false;
        }
        info!(from = %current, to = %target, "state transition");
        self.state_tx.send_replace(target);
        true
    }

    /// Mutate the observable playback state
    pub(crate) fn update_playback(&self, f: impl FnOnce(&mut PlaybackState)) {
        if self.is_shut_down() {
            return;
        }
        self.playback_tx.send_modify(f);
    }
}

struct SessionTasks {
    load: Option<JoinHandle<()>>,
    pump: Option<JoinHandle<()>>,
}

/// Orchestrator tying one resolved source to one live engine.
///
/// All engine callbacks and transport events land on the same runtime
/// as the user-intent handlers; suspension points are the engine load
/// and the load deadline.
pub struct SessionManager {
    id: SessionId,
    config: PlayerConfig,
    surface: Arc<dyn MediaSurface>,
    registry: EngineRegistry,
    shared: Arc<Shared>,
    last_source: RwLock<Option<StreamSource>>,
    tasks: Mutex<SessionTasks>,
    bridge_task: StdMutex<Option<JoinHandle<()>>>,
    /// Serializes `new_source` so teardown always completes before the
    /// next load begins
    source_gate: Mutex<()>,
}

impl SessionManager {
    /// Create a session bound to a playback surface and start the
    /// transport bridge
    pub fn new(surface: Arc<dyn MediaSurface>, config: PlayerConfig) -> Self {
        Self::with_registry(surface, config, EngineRegistry::with_defaults())
    }

    /// Create a session with a custom engine registry
    pub fn with_registry(
        surface: Arc<dyn MediaSurface>,
        config: PlayerConfig,
        registry: EngineRegistry,
    ) -> Self {
        let initial = PlaybackState {
            volume: config.initial_volume,
            is_muted: config.initial_muted,
            ..PlaybackState::default()
        };
        let shared = Arc::new(Shared::new(initial));
        let bridge_task = bridge::spawn(surface.clone(), shared.clone());

        Self {
            id: SessionId::new(),
            config,
            surface,
            registry,
            shared,
            last_source: RwLock::new(None),
            tasks: Mutex::new(SessionTasks {
                load: None,
                pump: None,
            }),
            bridge_task: StdMutex::new(Some(bridge_task)),
            source_gate: Mutex::new(()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current state-machine state
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Subscribe to state-machine transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Snapshot of the observable playback state
    pub fn playback(&self) -> PlaybackState {
        self.shared.playback_tx.borrow().clone()
    }

    /// Subscribe to playback-state changes
    pub fn subscribe_playback(&self) -> watch::Receiver<PlaybackState> {
        self.shared.playback_tx.subscribe()
    }

    /// Supply a (new) stream source.
    ///
    /// Unconditionally tears down any existing session, resolves the
    /// source, constructs the matching engine and starts a deadline-
    /// bounded load. Returns once the load is in flight; progress is
    /// observable through the state subscriptions.
    #[instrument(skip(self, source), fields(session_id = %self.id))]
    pub async fn new_source(&self, source: StreamSource) {
        if self.shared.is_shut_down() {
            return;
        }
        let _gate = self.source_gate.lock().await;

        // Supersede any in-flight load before touching the engine slot
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.teardown_tasks().await;
        self.shared.engine.lock().await.clear();

        *self.last_source.write().await = Some(source.clone());

        if source.raw_url.trim().is_empty() {
            warn!("no source supplied");
            self.fail(&Error::NoSource);
            return;
        }

        let resolved = resolve_source(&source);
        info!(
            url = %resolved.clean_url,
            kind = %resolved.kind,
            drm = resolved.drm.is_some(),
            "source resolved"
        );

        self.shared.update_playback(|p| {
            p.is_loading = true;
            p.error = None;
            p.is_playing = false;
            p.current_time = 0.0;
            p.duration = None;
        });
        self.shared.transition(SessionState::Loading);

        // Engines are resolved lazily, at session-construction time
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let ctx = EngineContext {
            config: self.config.clone(),
            events: events_tx,
        };
        let mut engine = match self.registry.create(resolved.kind, ctx) {
            Ok(engine) => engine,
            Err(err) => {
                error!(%err, kind = %resolved.kind, "engine construction failed");
                self.fail(&err);
                return;
            }
        };
        if let Err(err) = engine.attach(self.surface.clone()) {
            error!(%err, "engine attach failed");
            self.fail(&err);
            return;
        }

        let mut tasks = self.tasks.lock().await;
        tasks.pump = Some(self.spawn_event_pump(events_rx, generation));
        tasks.load = Some(self.spawn_load(engine, resolved.clean_url, resolved.drm, generation));
    }

    /// Run the deadline-bounded load, owning the engine until it either
    /// lands in the slot or is destroyed
    fn spawn_load(
        &self,
        mut engine: Box<dyn PlaybackEngine>,
        clean_url: String,
        drm: Option<crate::types::ClearKeyPair>,
        generation: u64,
    ) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let surface = self.surface.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                res = engine.load(&clean_url, drm.as_ref()) => res,
                _ = tokio::time::sleep(config.load_timeout) => Err(Error::LoadTimeout),
            };

            // A superseded session's late outcome must not leak out
            if shared.current_generation() != generation || shared.is_shut_down() {
                debug!("discarding load outcome for superseded session");
                engine.destroy();
                return;
            }

            match outcome {
                Ok(()) => {
                    shared.engine.lock().await.install(engine);

                    // A fresh surface must match what subscribers
                    // already observe, not the construction-time config
                    let snapshot = shared.playback_tx.borrow().clone();
                    surface.set_muted(snapshot.is_muted);
                    surface.set_volume(snapshot.volume);

                    let next = if config.autoplay {
                        match surface.play() {
                            Ok(()) => SessionState::Playing,
                            Err(Error::AutoplayBlocked) => {
                                // Swallowed, not surfaced as an error
                                debug!("autoplay rejected by the environment");
                                SessionState::Ready
                            }
                            Err(err) => {
                                warn!(%err, "playback start failed, waiting for user intent");
                                SessionState::Ready
                            }
                        }
                    } else {
                        SessionState::Ready
                    };

                    shared.update_playback(|p| {
                        p.is_loading = false;
                        p.error = None;
                        p.is_playing = next == SessionState::Playing;
                    });
                    shared.transition(next);
                }
                Err(err) => {
                    error!(%err, code = err.error_code(), "load failed");
                    // Deadline expiry and fatal error share one exit
                    // path, so the engine is destroyed exactly once
                    engine.destroy();
                    shared.update_playback(|p| {
                        p.is_loading = false;
                        p.error = Some(err.user_message().to_string());
                    });
                    shared.transition(SessionState::Error);
                }
            }
        })
    }

    /// Consume engine events for one session identity
    fn spawn_event_pump(
        &self,
        mut events: mpsc::UnboundedReceiver<EngineEvent>,
        generation: u64,
    ) -> JoinHandle<()> {
        let shared = self.shared.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if shared.current_generation() != generation || shared.is_shut_down() {
                    debug!(?event, "discarding event from superseded session");
                    break;
                }
                match event {
                    EngineEvent::Ready => {
                        // Load completion drives the state machine; a
                        // ready signal after Error stays ignored
                        debug!("engine reported ready");
                    }
                    EngineEvent::Error {
                        fatal: false,
                        category,
                        detail,
                    } => {
                        debug!(?category, %detail, "engine recovered from transient error");
                    }
                    EngineEvent::Error {
                        fatal: true,
                        category,
                        detail,
                    } => {
                        error!(?category, %detail, "fatal engine error");
                        shared.engine.lock().await.clear();
                        shared.update_playback(|p| {
                            p.is_loading = false;
                            p.is_playing = false;
                            p.error = Some(category.user_message().to_string());
                        });
                        shared.transition(SessionState::Error);
                        break;
                    }
                }
            }
        })
    }

    /// Transition to `Error` with the taxonomy-mapped message
    fn fail(&self, err: &Error) {
        self.shared.update_playback(|p| {
            p.is_loading = false;
            p.is_playing = false;
            p.error = Some(err.user_message().to_string());
        });
        self.shared.transition(SessionState::Error);
    }

    /// Abort in-flight load and event-pump tasks and wait until they
    /// are gone, so an aborted load's engine is dropped (and therefore
    /// destroyed) before the caller proceeds
    async fn teardown_tasks(&self) {
        let (load, pump) = {
            let mut tasks = self.tasks.lock().await;
            (tasks.load.take(), tasks.pump.take())
        };
        if let Some(handle) = load {
            handle.abort();
            let _ = handle.await;
        }
        if let Some(handle) = pump {
            handle.abort();
            let _ = handle.await;
        }
    }

    /// Re-run resolution and engine construction with the last input.
    ///
    /// The explicit user path out of the terminal `Error` state.
    pub async fn retry(&self) {
        let source = self.last_source.read().await.clone();
        match source {
            Some(source) => {
                info!("retrying last source");
                self.new_source(source).await;
            }
            None => self.fail(&Error::NoSource),
        }
    }

    // ------------------------------------------------------------------
    // User intents: act directly on the playback surface and are safe
    // to call in any session state.
    // ------------------------------------------------------------------

    pub fn toggle_play(&self) {
        if self.shared.is_shut_down() {
            return;
        }
        if self.playback().is_playing {
            self.surface.pause();
        } else if let Err(err) = self.surface.play() {
            debug!(%err, "play intent rejected");
        }
    }

    pub fn toggle_mute(&self) {
        if self.shared.is_shut_down() {
            return;
        }
        let muted = !self.playback().is_muted;
        self.surface.set_muted(muted);
        self.shared.update_playback(|p| p.is_muted = muted);
    }

    pub fn set_volume(&self, volume: u8) {
        if self.shared.is_shut_down() {
            return;
        }
        let volume = volume.min(100);
        self.surface.set_volume(volume);
        self.shared.update_playback(|p| p.volume = volume);
    }

    pub fn seek_to(&self, seconds: f64) {
        if self.shared.is_shut_down() {
            return;
        }
        let duration = self.playback().duration;
        let clamped = match duration {
            Some(duration) => seconds.clamp(0.0, duration),
            None => seconds.max(0.0),
        };
        self.surface.seek_to(clamped);
    }

    pub fn toggle_fullscreen(&self) {
        if self.shared.is_shut_down() {
            return;
        }
        self.surface.toggle_fullscreen();
    }

    /// Hard cancellation on unmount.
    ///
    /// Unsubscribes transport listeners, aborts in-flight work and
    /// destroys the engine. No state mutation can happen afterwards.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn shutdown(&self) {
        if self.shared.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.teardown_tasks().await;
        let bridge = self.bridge_task.lock().unwrap().take();
        if let Some(handle) = bridge {
            handle.abort();
            let _ = handle.await;
        }
        self.shared.engine.lock().await.clear();
        // Final observable state; send_replace bypasses the shut_down
        // guard on purpose
        self.shared.state_tx.send_replace(SessionState::Idle);
        info!("session shut down");
    }

    /// True while an engine handle is installed (load resolved and the
    /// session was neither superseded nor torn down)
    pub async fn has_live_engine(&self) -> bool {
        self.shared.engine.lock().await.is_occupied()
    }
}
