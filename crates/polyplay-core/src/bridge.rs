//! Media-surface bridge
//!
//! Subscribes once per surface instance and maps native transport
//! events 1:1 into the observable playback state. The subscription is
//! independent of which engine is attached; the surface persists
//! across engine swaps.

use crate::session::Shared;
use crate::surface::{MediaSurface, TransportEvent};
use crate::types::SessionState;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub(crate) fn spawn(surface: Arc<dyn MediaSurface>, shared: Arc<Shared>) -> JoinHandle<()> {
    let mut events = surface.subscribe();

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if shared.is_shut_down() {
                break;
            }
            match event {
                TransportEvent::TimeUpdate(seconds) => {
                    shared.update_playback(|p| p.current_time = seconds);
                }
                TransportEvent::DurationChange(seconds) => {
                    shared.update_playback(|p| p.duration = Some(seconds));
                }
                TransportEvent::LoadedMetadata => {
                    if let Some(duration) = surface.duration() {
                        shared.update_playback(|p| p.duration = Some(duration));
                    }
                }
                TransportEvent::Play => {
                    shared.update_playback(|p| p.is_playing = true);
                    shared.transition(SessionState::Playing);
                }
                TransportEvent::Pause => {
                    shared.update_playback(|p| p.is_playing = false);
                    shared.transition(SessionState::Paused);
                }
                TransportEvent::Waiting => {
                    let current = shared.state();
                    if matches!(current, SessionState::Playing | SessionState::Paused) {
                        *shared.resume_state.lock().unwrap() = current;
                        shared.transition(SessionState::Buffering);
                    }
                }
                TransportEvent::CanPlay => {
                    shared.update_playback(|p| p.is_loading = false);
                    if shared.state() == SessionState::Buffering {
                        let prior = *shared.resume_state.lock().unwrap();
                        shared.transition(prior);
                    }
                }
                TransportEvent::Ended => {
                    debug!("playback ended");
                    shared.update_playback(|p| p.is_playing = false);
                    shared.transition(SessionState::Paused);
                }
                TransportEvent::SurfaceError(detail) => {
                    // Engines own error escalation; the bridge only
                    // records what the surface saw
                    warn!(%detail, "surface reported an error");
                }
            }
        }
    })
}
