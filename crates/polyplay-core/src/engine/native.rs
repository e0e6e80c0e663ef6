//! Native progressive-playback adapter
//!
//! Assigns the clean URL straight to the playback surface. Readiness
//! is the surface's own metadata event; there is no manifest, no retry
//! policy, and failures only surface as generic surface errors.

use super::{EngineContext, EngineEvent, EngineKind, ErrorCategory, PlaybackEngine};
use crate::error::{Error, Result};
use crate::surface::{MediaSurface, TransportEvent};
use crate::types::ClearKeyPair;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

/// Direct-assignment engine for mp4/webm progressive sources
pub struct NativeEngine {
    events: mpsc::UnboundedSender<EngineEvent>,
    surface: Option<Arc<dyn MediaSurface>>,
    destroyed: bool,
}

impl NativeEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            events: ctx.events,
            surface: None,
            destroyed: false,
        }
    }
}

#[async_trait]
impl PlaybackEngine for NativeEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Native
    }

    fn attach(&mut self, surface: Arc<dyn MediaSurface>) -> Result<()> {
        self.surface = Some(surface);
        Ok(())
    }

    #[instrument(skip(self, _drm), fields(kind = %self.kind()))]
    async fn load(&mut self, clean_url: &str, _drm: Option<&ClearKeyPair>) -> Result<()> {
        let surface = self.surface.clone().ok_or(Error::NotAttached)?;

        let mut rx = surface.subscribe();
        surface.set_source(clean_url);
        loop {
            match rx.recv().await {
                Some(TransportEvent::LoadedMetadata) => {
                    let _ = self.events.send(EngineEvent::Ready);
                    return Ok(());
                }
                Some(TransportEvent::SurfaceError(detail)) => {
                    let err = Error::UnknownLoad(detail);
                    let _ = self.events.send(EngineEvent::Error {
                        fatal: true,
                        category: ErrorCategory::Unknown,
                        detail: err.to_string(),
                    });
                    return Err(err);
                }
                Some(_) => continue,
                None => return Err(Error::UnknownLoad("surface channel closed".into())),
            }
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        if let Some(surface) = self.surface.take() {
            surface.clear_source();
        }
        debug!("native engine destroyed");
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SimSurface;
    use crate::types::PlayerConfig;

    #[tokio::test]
    async fn test_direct_assignment_resolves_on_metadata() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = EngineContext {
            config: PlayerConfig::default(),
            events: tx,
        };
        let mut engine = NativeEngine::new(ctx);
        let surface = Arc::new(SimSurface::new());
        engine.attach(surface.clone()).unwrap();

        engine.load("https://x/a.mp4", None).await.unwrap();
        assert_eq!(surface.source().as_deref(), Some("https://x/a.mp4"));
        assert_eq!(rx.try_recv().unwrap(), EngineEvent::Ready);
    }
}
