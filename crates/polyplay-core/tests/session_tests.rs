//! Integration tests for the playback session manager

use polyplay_core::{
    EngineContext, EngineEvent, EngineKind, EngineRegistry, Error, MediaSurface, PlaybackEngine,
    PlayerConfig, Result, SessionManager, SessionState, SimSurface, SourceKind, StreamSource,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// How a mock engine responds to `load`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadBehavior {
    Succeed,
    Fail,
    /// Never resolve; the session deadline decides
    Pend,
}

/// Shared observation point for every mock engine a registry creates
struct MockHarness {
    constructed: AtomicUsize,
    destroyed: AtomicUsize,
    alive: AtomicIsize,
    behavior: Mutex<LoadBehavior>,
    /// Event senders handed to each constructed engine, oldest first
    event_senders: Mutex<Vec<mpsc::UnboundedSender<EngineEvent>>>,
}

impl MockHarness {
    fn new(behavior: LoadBehavior) -> Arc<Self> {
        Arc::new(Self {
            constructed: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
            alive: AtomicIsize::new(0),
            behavior: Mutex::new(behavior),
            event_senders: Mutex::new(Vec::new()),
        })
    }

    fn set_behavior(&self, behavior: LoadBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }

    fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn alive(&self) -> isize {
        self.alive.load(Ordering::SeqCst)
    }

    fn latest_events(&self) -> Option<mpsc::UnboundedSender<EngineEvent>> {
        self.event_senders.lock().unwrap().last().cloned()
    }

    /// Registry whose HLS and native factories produce mock engines
    fn registry(self: &Arc<Self>) -> EngineRegistry {
        let mut registry = EngineRegistry::new();
        for kind in [SourceKind::Hls, SourceKind::Dash, SourceKind::Native] {
            let harness = self.clone();
            registry.register(kind, move |ctx| Ok(Box::new(MockEngine::new(&harness, ctx))));
        }
        registry
    }
}

struct MockEngine {
    harness: Arc<MockHarness>,
    destroyed: bool,
}

impl MockEngine {
    fn new(harness: &Arc<MockHarness>, ctx: EngineContext) -> Self {
        harness.constructed.fetch_add(1, Ordering::SeqCst);
        harness.alive.fetch_add(1, Ordering::SeqCst);
        harness.event_senders.lock().unwrap().push(ctx.events);
        Self {
            harness: harness.clone(),
            destroyed: false,
        }
    }
}

#[async_trait]
impl PlaybackEngine for MockEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Hls
    }

    fn attach(&mut self, _surface: Arc<dyn polyplay_core::MediaSurface>) -> Result<()> {
        Ok(())
    }

    async fn load(&mut self, _clean_url: &str, _drm: Option<&polyplay_core::ClearKeyPair>) -> Result<()> {
        let behavior = *self.harness.behavior.lock().unwrap();
        match behavior {
            LoadBehavior::Succeed => Ok(()),
            LoadBehavior::Fail => Err(Error::UnknownLoad("mock load failure".into())),
            LoadBehavior::Pend => std::future::pending().await,
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.harness.destroyed.fetch_add(1, Ordering::SeqCst);
        self.harness.alive.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn short_deadline_config() -> PlayerConfig {
    PlayerConfig {
        load_timeout: Duration::from_millis(200),
        ..PlayerConfig::default()
    }
}

async fn wait_for_state(session: &SessionManager, target: SessionState) {
    let mut rx = session.subscribe_state();
    tokio::time::timeout(Duration::from_secs(5), async {
        while *rx.borrow_and_update() != target {
            rx.changed().await.expect("state channel open");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("session never reached {target}"));
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_successful_load_reaches_playing() {
    let harness = MockHarness::new(LoadBehavior::Succeed);
    let surface = Arc::new(SimSurface::new());
    let session =
        SessionManager::with_registry(surface, PlayerConfig::default(), harness.registry());

    session.new_source(StreamSource::new("https://x/a.m3u8")).await;
    wait_for_state(&session, SessionState::Playing).await;

    assert!(session.has_live_engine().await);
    assert!(session.playback().is_playing);
    assert!(session.playback().error.is_none());
    assert_eq!(harness.constructed(), 1);
    assert_eq!(harness.alive(), 1);
}

#[tokio::test]
async fn test_at_most_one_engine_across_source_changes() {
    let harness = MockHarness::new(LoadBehavior::Succeed);
    let surface = Arc::new(SimSurface::new());
    let session =
        SessionManager::with_registry(surface, PlayerConfig::default(), harness.registry());

    for url in [
        "https://x/a.m3u8",
        "https://x/b.mpd",
        "https://x/c.mp4",
        "https://x/d.m3u8",
    ] {
        session.new_source(StreamSource::new(url)).await;
        wait_for_state(&session, SessionState::Playing).await;
        assert!(harness.alive() <= 1, "more than one live engine");
    }

    assert_eq!(harness.constructed(), 4);
    assert_eq!(harness.destroyed(), 3);
    assert_eq!(harness.alive(), 1);
}

#[tokio::test]
async fn test_new_source_supersedes_pending_load() {
    let harness = MockHarness::new(LoadBehavior::Pend);
    let surface = Arc::new(SimSurface::new());
    let session =
        SessionManager::with_registry(surface, PlayerConfig::default(), harness.registry());

    session.new_source(StreamSource::new("https://x/slow.m3u8")).await;
    settle().await;

    harness.set_behavior(LoadBehavior::Succeed);
    session.new_source(StreamSource::new("https://x/fast.m3u8")).await;
    wait_for_state(&session, SessionState::Playing).await;

    assert_eq!(harness.constructed(), 2);
    assert_eq!(harness.alive(), 1);
    assert_eq!(harness.destroyed(), 1);
}

#[tokio::test]
async fn test_load_deadline_destroys_engine_exactly_once() {
    let harness = MockHarness::new(LoadBehavior::Pend);
    let surface = Arc::new(SimSurface::new());
    let session =
        SessionManager::with_registry(surface, short_deadline_config(), harness.registry());

    session.new_source(StreamSource::new("https://x/a.m3u8")).await;
    wait_for_state(&session, SessionState::Error).await;

    assert_eq!(harness.destroyed(), 1);
    assert_eq!(harness.alive(), 0);
    assert!(!session.has_live_engine().await);
    let error = session.playback().error.expect("error message set");
    assert!(error.contains("timed out"), "unexpected message: {error}");
}

#[tokio::test]
async fn test_late_success_event_after_timeout_is_ignored() {
    let harness = MockHarness::new(LoadBehavior::Pend);
    let surface = Arc::new(SimSurface::new());
    let session =
        SessionManager::with_registry(surface, short_deadline_config(), harness.registry());

    session.new_source(StreamSource::new("https://x/a.m3u8")).await;
    wait_for_state(&session, SessionState::Error).await;

    // Out-of-order success from the already-destroyed engine
    if let Some(events) = harness.latest_events() {
        let _ = events.send(EngineEvent::Ready);
    }
    settle().await;

    assert_eq!(session.state(), SessionState::Error);
    assert_eq!(harness.destroyed(), 1);
}

#[tokio::test]
async fn test_fatal_load_error_reaches_error_state() {
    let harness = MockHarness::new(LoadBehavior::Fail);
    let surface = Arc::new(SimSurface::new());
    let session =
        SessionManager::with_registry(surface, PlayerConfig::default(), harness.registry());

    session.new_source(StreamSource::new("https://x/a.m3u8")).await;
    wait_for_state(&session, SessionState::Error).await;

    assert_eq!(harness.destroyed(), 1);
    assert!(session.playback().error.is_some());
    assert!(!session.playback().is_loading);
}

#[tokio::test]
async fn test_retry_after_error_can_succeed() {
    let harness = MockHarness::new(LoadBehavior::Fail);
    let surface = Arc::new(SimSurface::new());
    let session =
        SessionManager::with_registry(surface, PlayerConfig::default(), harness.registry());

    session.new_source(StreamSource::new("https://x/a.m3u8")).await;
    wait_for_state(&session, SessionState::Error).await;

    // The previously failing source is now valid
    harness.set_behavior(LoadBehavior::Succeed);
    session.retry().await;
    wait_for_state(&session, SessionState::Playing).await;

    assert_eq!(harness.constructed(), 2);
    assert_eq!(harness.alive(), 1);
    assert!(session.playback().error.is_none());
}

#[tokio::test]
async fn test_no_source_yields_error_without_engine() {
    let harness = MockHarness::new(LoadBehavior::Succeed);
    let surface = Arc::new(SimSurface::new());
    let session =
        SessionManager::with_registry(surface, PlayerConfig::default(), harness.registry());

    session.new_source(StreamSource::new("  ")).await;

    assert_eq!(session.state(), SessionState::Error);
    assert_eq!(harness.constructed(), 0);
    assert_eq!(
        session.playback().error.as_deref(),
        Some("No video source provided")
    );
}

#[tokio::test]
async fn test_unsupported_kind_yields_error() {
    let harness = MockHarness::new(LoadBehavior::Succeed);
    let surface = Arc::new(SimSurface::new());
    // Only HLS is registered; DASH sources have no factory
    let mut registry = EngineRegistry::new();
    {
        let harness = harness.clone();
        registry.register(SourceKind::Hls, move |ctx| {
            Ok(Box::new(MockEngine::new(&harness, ctx)))
        });
    }
    let session = SessionManager::with_registry(surface, PlayerConfig::default(), registry);

    session.new_source(StreamSource::new("https://x/a.mpd")).await;

    assert_eq!(session.state(), SessionState::Error);
    assert_eq!(harness.constructed(), 0);
}

#[tokio::test]
async fn test_shutdown_while_loading_stops_all_mutations() {
    let harness = MockHarness::new(LoadBehavior::Pend);
    let surface = Arc::new(SimSurface::new());
    let session =
        SessionManager::with_registry(surface.clone(), PlayerConfig::default(), harness.registry());

    session.new_source(StreamSource::new("https://x/a.m3u8")).await;
    settle().await;
    assert_eq!(session.state(), SessionState::Loading);

    session.shutdown().await;
    assert_eq!(harness.alive(), 0);
    assert_eq!(session.state(), SessionState::Idle);

    // Anything arriving after teardown must not move observable state
    let state_rx = session.subscribe_state();
    let playback_rx = session.subscribe_playback();
    surface.advance_time(10.0);
    surface.begin_stall();
    if let Some(events) = harness.latest_events() {
        let _ = events.send(EngineEvent::Ready);
        let _ = events.send(EngineEvent::Error {
            fatal: true,
            category: polyplay_core::ErrorCategory::Unknown,
            detail: "late".into(),
        });
    }
    settle().await;

    assert!(!state_rx.has_changed().unwrap());
    assert!(!playback_rx.has_changed().unwrap());
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let harness = MockHarness::new(LoadBehavior::Succeed);
    let surface = Arc::new(SimSurface::new());
    let session =
        SessionManager::with_registry(surface, PlayerConfig::default(), harness.registry());

    session.new_source(StreamSource::new("https://x/a.m3u8")).await;
    wait_for_state(&session, SessionState::Playing).await;

    session.shutdown().await;
    session.shutdown().await;
    assert_eq!(harness.alive(), 0);
    assert_eq!(harness.destroyed(), 1);
}

#[tokio::test]
async fn test_engine_destroy_is_idempotent() {
    let harness = MockHarness::new(LoadBehavior::Succeed);
    let (tx, _rx) = mpsc::unbounded_channel();
    let ctx = EngineContext {
        config: PlayerConfig::default(),
        events: tx,
    };
    let mut engine = MockEngine::new(&harness, ctx);

    engine.destroy();
    engine.destroy();
    drop(engine);

    assert_eq!(harness.destroyed(), 1);
    assert_eq!(harness.alive(), 0);
}

#[tokio::test]
async fn test_intents_act_on_surface() {
    let harness = MockHarness::new(LoadBehavior::Succeed);
    let surface = Arc::new(SimSurface::new());
    let session =
        SessionManager::with_registry(surface.clone(), PlayerConfig::default(), harness.registry());

    session.new_source(StreamSource::new("https://x/a.m3u8")).await;
    wait_for_state(&session, SessionState::Playing).await;

    session.set_volume(250);
    assert_eq!(session.playback().volume, 100);
    session.set_volume(40);
    assert_eq!(surface.volume(), 40);

    session.toggle_mute();
    assert!(surface.is_muted());
    assert!(session.playback().is_muted);

    session.toggle_fullscreen();
    assert!(surface.is_fullscreen());

    // Seek clamps to the known duration
    surface.emit_metadata(100.0);
    settle().await;
    session.seek_to(500.0);
    assert!((surface.current_time() - 100.0).abs() < f64::EPSILON);
    session.seek_to(-3.0);
    assert!((surface.current_time() - 0.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_volume_and_mute_survive_source_change() {
    let harness = MockHarness::new(LoadBehavior::Succeed);
    let surface = Arc::new(SimSurface::new());
    let session =
        SessionManager::with_registry(surface.clone(), PlayerConfig::default(), harness.registry());

    session.new_source(StreamSource::new("https://x/a.m3u8")).await;
    wait_for_state(&session, SessionState::Playing).await;

    session.set_volume(40);
    session.toggle_mute();

    session.new_source(StreamSource::new("https://x/b.m3u8")).await;
    wait_for_state(&session, SessionState::Playing).await;

    // The surface must agree with what subscribers observe
    assert_eq!(surface.volume(), session.playback().volume);
    assert_eq!(surface.volume(), 40);
    assert_eq!(surface.is_muted(), session.playback().is_muted);
    assert!(surface.is_muted());
}

#[tokio::test]
async fn test_autoplay_rejection_lands_in_ready() {
    let harness = MockHarness::new(LoadBehavior::Succeed);
    let surface = Arc::new(SimSurface::new().with_autoplay_blocked());
    let session =
        SessionManager::with_registry(surface, PlayerConfig::default(), harness.registry());

    session.new_source(StreamSource::new("https://x/a.m3u8")).await;
    wait_for_state(&session, SessionState::Ready).await;

    // Rejection is swallowed, not surfaced
    assert!(session.playback().error.is_none());
    assert!(!session.playback().is_playing);
    assert!(session.has_live_engine().await);
}
