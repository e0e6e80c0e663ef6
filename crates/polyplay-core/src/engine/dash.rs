//! DASH/DRM-capable engine adapter
//!
//! Always runs the uniform attach -> configure -> load sequence.
//! Configuration bounds both the network retry policy and the
//! buffering targets so memory and network use stay bounded on
//! long-running sessions. Clearkey key material is installed strictly
//! before the manifest load.

use super::{backoff_delay, EngineContext, EngineEvent, EngineKind, ErrorCategory, PlaybackEngine};
use crate::error::{Error, Result};
use crate::surface::MediaSurface;
use crate::types::{ClearKeyPair, PlayerConfig};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

/// A clearkey entry re-encoded for the engine's in-memory key table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTableEntry {
    /// Base64url key id, no padding
    pub kid: String,
    /// Base64url key, no padding
    pub k: String,
}

/// DASH manifest engine with clearkey support
pub struct DashEngine {
    client: Client,
    config: PlayerConfig,
    events: mpsc::UnboundedSender<EngineEvent>,
    surface: Option<Arc<dyn MediaSurface>>,
    key_table: Vec<KeyTableEntry>,
    destroyed: bool,
}

impl DashEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            client: Client::builder()
                .timeout(ctx.config.request_timeout)
                .build()
                .unwrap_or_default(),
            config: ctx.config,
            events: ctx.events,
            surface: None,
            key_table: Vec::new(),
            destroyed: false,
        }
    }

    /// Install the clearkey pair into the in-memory key table.
    ///
    /// Must run before `load` kicks off any network activity; engines
    /// reject keys configured after the manifest request starts.
    fn configure_keys(&mut self, drm: &ClearKeyPair) -> Result<()> {
        let kid = hex_to_base64url(&drm.key_id)
            .ok_or_else(|| Error::Drm(format!("key id is not valid hex: {}", drm.key_id)))?;
        let k = hex_to_base64url(&drm.key)
            .ok_or_else(|| Error::Drm("key is not valid hex".into()))?;
        debug!(key_id = %drm.key_id, "clearkey key table configured");
        self.key_table = vec![KeyTableEntry { kid, k }];
        Ok(())
    }

    /// Fetch the MPD and run light structural validation
    async fn fetch_mpd(&self, url: &str) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "manifest fetch returned {}",
                response.status()
            )));
        }

        let content = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !content.contains("<MPD") {
            return Err(Error::MediaFormatUnsupported(
                "document is not a DASH MPD".into(),
            ));
        }

        // Protected content without key material cannot start
        if content.contains("ContentProtection") && self.key_table.is_empty() {
            return Err(Error::Drm(
                "stream carries content protection but no clearkey pair was supplied".into(),
            ));
        }

        Ok(())
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
impl PlaybackEngine for DashEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::DashCapable
    }

    fn attach(&mut self, surface: Arc<dyn MediaSurface>) -> Result<()> {
        self.surface = Some(surface);
        Ok(())
    }

    #[instrument(skip(self, drm), fields(kind = %self.kind()))]
    async fn load(&mut self, clean_url: &str, drm: Option<&ClearKeyPair>) -> Result<()> {
        let surface = self.surface.clone().ok_or(Error::NotAttached)?;

        // Configure before load, never after
        if let Some(pair) = drm {
            if let Err(err) = self.configure_keys(pair) {
                self.report_fatal(&err);
                return Err(err);
            }
        }
        debug!(
            buffer_goal = self.config.buffer_goal_secs,
            buffer_behind = self.config.buffer_behind_secs,
            "dash engine configured"
        );

        let mut attempt = 0u32;
        loop {
            match self.fetch_mpd(clean_url).await {
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
                    warn!(%err, attempt, ?delay, "network error loading MPD, retrying");
                    let _ = self.events.send(EngineEvent::Error {
                        fatal: false,
                        category: ErrorCategory::Network,
                        detail: err.to_string(),
                    });
                    tokio::time::sleep(delay).await;
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
        self.key_table.clear();
        if let Some(surface) = self.surface.take() {
            surface.clear_source();
        }
        debug!("dash engine destroyed");
    }
}

impl Drop for DashEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Re-encode a hex string as unpadded base64url, the format clearkey
/// key tables expect
fn hex_to_base64url(hex: &str) -> Option<String> {
    if hex.is_empty() || hex.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    let chars: Vec<char> = hex.chars().collect();
    for pair in chars.chunks(2) {
        let high = pair[0].to_digit(16)?;
        let low = pair[1].to_digit(16)?;
        bytes.push(((high << 4) | low) as u8);
    }
    Some(URL_SAFE_NO_PAD.encode(bytes))
}
