//! Stream-source resolution
//!
//! Turns an opaque source string into a clean playback URL, a detected
//! stream kind and optional inline clearkey credentials. Pure, no I/O,
//! never fails: anything unclassifiable falls back to HLS.

use crate::types::{ClearKeyPair, ResolvedSource, SourceHint, SourceKind, StreamSource};
use tracing::debug;

/// Delimiter separating the media URL from the inline DRM block.
/// Either the two-character `?|` form or a bare `|`.
const DRM_DELIMITER: &str = "?|";

/// Resolve a raw source string.
pub fn resolve(raw: &str) -> ResolvedSource {
    let (clean_url, param_block) = split_drm_block(raw);
    let drm = param_block.and_then(parse_clearkey);

    // Lower-cased copy for sniffing only; the clean URL keeps its case.
    let sniff = clean_url.to_lowercase();

    let kind = if sniff.contains(".mpd") || sniff.contains("/dash/") || drm.is_some() {
        SourceKind::Dash
    } else if sniff.contains(".m3u8") || sniff.contains("/hls/") {
        SourceKind::Hls
    } else if sniff.contains(".mp4") || sniff.contains(".webm") {
        SourceKind::Native
    } else {
        SourceKind::Hls
    };

    ResolvedSource {
        clean_url: clean_url.to_string(),
        kind,
        drm,
    }
}

/// Resolve a [`StreamSource`], logging when the caller's hint disagrees
/// with what URL sniffing decided. Sniffing wins.
pub fn resolve_source(source: &StreamSource) -> ResolvedSource {
    let resolved = resolve(&source.raw_url);
    if let Some(hint) = source.hinted_type {
        let hinted_kind = match hint {
            SourceHint::Hls => SourceKind::Hls,
            SourceHint::Dash => SourceKind::Dash,
            SourceHint::Mp4 => SourceKind::Native,
        };
        if hinted_kind != resolved.kind {
            debug!(
                hinted = %hinted_kind,
                resolved = %resolved.kind,
                "source hint overridden by URL detection"
            );
        }
    }
    resolved
}

/// Split off the trailing inline-DRM parameter block, if any.
fn split_drm_block(raw: &str) -> (&str, Option<&str>) {
    if let Some(idx) = raw.find(DRM_DELIMITER) {
        (&raw[..idx], Some(&raw[idx + DRM_DELIMITER.len()..]))
    } else if let Some(idx) = raw.find('|') {
        (&raw[..idx], Some(&raw[idx + 1..]))
    } else {
        (raw, None)
    }
}

/// Parse a URL-encoded parameter block into clearkey credentials.
///
/// Only `drmScheme=clearkey` with a `keyId:key` license is accepted;
/// any malformed block is treated as absent.
fn parse_clearkey(block: &str) -> Option<ClearKeyPair> {
    let mut scheme = None;
    let mut license = None;
    for (key, value) in url::form_urlencoded::parse(block.as_bytes()) {
        match key.as_ref() {
            "drmScheme" => scheme = Some(value.into_owned()),
            "drmLicense" => license = Some(value.into_owned()),
            _ => {}
        }
    }

    let scheme = scheme?;
    let license = license?;
    if scheme != "clearkey" {
        debug!(%scheme, "unsupported DRM scheme ignored");
        return None;
    }

    let mut parts = license.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(key_id), Some(key), None) if !key_id.is_empty() && !key.is_empty() => {
            Some(ClearKeyPair {
                scheme,
                key_id: key_id.to_string(),
                key: key.to_string(),
            })
        }
        _ => {
            debug!("malformed clearkey license ignored");
            None
        }
    }
}
