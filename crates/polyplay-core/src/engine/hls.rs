//! HLS engine adapter
//!
//! Validates the playlist over HTTP before pointing the surface at it.
//! When the surface reports native HLS capability the adapter skips
//! the dedicated path entirely and assigns the URL directly; that path
//! has no manifest-level recovery.

use super::{backoff_delay, EngineContext, EngineEvent, EngineKind, ErrorCategory, PlaybackEngine};
use crate::error::{Error, Result};
use crate::surface::{MediaSurface, TransportEvent};
use crate::types::{ClearKeyPair, PlayerConfig};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

/// HLS playlist engine
pub struct HlsEngine {
    client: Client,
    config: PlayerConfig,
    events: mpsc::UnboundedSender<EngineEvent>,
    surface: Option<Arc<dyn MediaSurface>>,
    destroyed: bool,
}

impl HlsEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            client: Client::builder()
                .timeout(ctx.config.request_timeout)
                .build()
                .unwrap_or_default(),
            config: ctx.config,
            events: ctx.events,
            surface: None,
            destroyed: false,
        }
    }

    /// Fetch the playlist and check it parses as HLS (master or media)
    async fn fetch_playlist(&self, url: &str) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "playlist fetch returned {}",
                response.status()
            )));
        }

        let content = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        match m3u8_rs::parse_playlist_res(content.as_bytes()) {
            Ok(_) => Ok(()),
            Err(e) => Err(Error::ManifestParse(format!("not a valid playlist: {e:?}"))),
        }
    }

    fn report_fatal(&self, err: &Error) {
        let _ = self.events.send(EngineEvent::Error {
            fatal: true,
            category: ErrorCategory::from_error(err),
            detail: err.to_string(),
        });
    }
}

#[async_trait]
impl PlaybackEngine for HlsEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Hls
    }

    fn attach(&mut self, surface: Arc<dyn MediaSurface>) -> Result<()> {
        self.surface = Some(surface);
        Ok(())
    }

    #[instrument(skip(self, _drm), fields(kind = %self.kind()))]
    async fn load(&mut self, clean_url: &str, _drm: Option<&ClearKeyPair>) -> Result<()> {
        let surface = self.surface.clone().ok_or(Error::NotAttached)?;

        if surface.supports_native_hls() {
            debug!("surface supports HLS natively, delegating");
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
                        self.report_fatal(&err);
                        return Err(err);
                    }
                    Some(_) => continue,
                    None => return Err(Error::UnknownLoad("surface channel closed".into())),
                }
            }
        }

        // Dedicated path: validate the playlist before handing it to
        // the surface. Non-fatal network errors reload with backoff;
        // one in-place recovery for a media error, then escalate.
        let mut attempt = 0u32;
        let mut media_recovered = false;
        loop {
            match self.fetch_playlist(clean_url).await {
                Ok(()) => {
                    surface.set_source(clean_url);
                    let _ = self.events.send(EngineEvent::Ready);
                    return Ok(());
                }
                Err(err) if err.is_recoverable() && attempt < self.config.retry_attempts => {
                    attempt += 1;
                    let delay = backoff_delay(
                        attempt,
                        self.config.retry_base_delay,
                        self.config.retry_max_delay,
                    );
                    warn!(%err, attempt, ?delay, "network error loading playlist, retrying");
                    let _ = self.events.send(EngineEvent::Error {
                        fatal: false,
                        category: ErrorCategory::Network,
                        detail: err.to_string(),
                    });
                    tokio::time::sleep(delay).await;
                }
                Err(err @ Error::ManifestParse(_)) if !media_recovered => {
                    media_recovered = true;
                    warn!(%err, "media error loading playlist, attempting in-place recovery");
                    let _ = self.events.send(EngineEvent::Error {
                        fatal: false,
                        category: ErrorCategory::MediaFormatUnsupported,
                        detail: err.to_string(),
                    });
                }
                Err(err) => {
                    self.report_fatal(&err);
                    return Err(err);
                }
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
        debug!("hls engine destroyed");
    }
}

impl Drop for HlsEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}
