//! Manifest and subtitle proxying.
//!
//! Segment manifests are fetched from the provider origin, optionally
//! reordered to prefer a requested audio language, and every relative
//! reference is rewritten back to an absolute provider URL so players fetch
//! segments upstream directly. Subtitles are served from the in-memory
//! registry under their opaque ids.

use std::collections::HashMap;
use std::sync::LazyLock;

use anibridge_core::error::ApiError;
use anibridge_extractor::headers::random_user_agent;
use anibridge_extractor::players::ZEPHYRFLICK_ORIGIN;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use regex::Regex;
use tracing::debug;

use crate::error::AppError;
use crate::state::AppState;

/// Content-Type for HLS master/variant playlists.
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

// Quoted URI attribute holding an absolute-path reference, e.g. URI="/hls/key"
static RE_URI_ATTR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"URI="(/[^"]+)""#).unwrap());

static RE_DEFAULT_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"DEFAULT=(YES|NO)").unwrap());

/// Subtitle content type derived from the opaque id's extension.
pub fn subtitle_content_type(opaque_id: &str) -> &'static str {
    if opaque_id.ends_with(".srt") {
        "application/x-subrip"
    } else {
        "text/vtt"
    }
}

fn is_audio_rendition(line: &str) -> bool {
    line.starts_with("#EXT-X-MEDIA:") && line.contains("TYPE=AUDIO")
}

fn set_default_flag(line: &str, default: bool) -> String {
    let attr = if default { "DEFAULT=YES" } else { "DEFAULT=NO" };
    if RE_DEFAULT_ATTR.is_match(line) {
        RE_DEFAULT_ATTR.replace(line, attr).into_owned()
    } else {
        format!("{line},{attr}")
    }
}

/// Reorder audio renditions so the preferred language is the default.
///
/// The matching rendition is marked DEFAULT=YES and moved directly below the
/// version tag; every other audio rendition is forced DEFAULT=NO with its
/// relative order preserved. A manifest without a matching rendition passes
/// through untouched.
pub fn prioritize_audio(manifest: &str, lang: &str) -> String {
    let lang_attr = format!(r#"LANGUAGE="{lang}""#);
    if !manifest
        .lines()
        .any(|l| is_audio_rendition(l) && l.contains(&lang_attr))
    {
        return manifest.to_string();
    }

    let mut preferred: Option<String> = None;
    let mut lines: Vec<String> = Vec::new();
    for line in manifest.lines() {
        if is_audio_rendition(line) {
            if preferred.is_none() && line.contains(&lang_attr) {
                preferred = Some(set_default_flag(line, true));
                continue;
            }
            lines.push(set_default_flag(line, false));
        } else {
            lines.push(line.to_string());
        }
    }

    let insert_at = lines
        .iter()
        .position(|l| l.starts_with("#EXT-X-VERSION"))
        .or_else(|| lines.iter().position(|l| l.starts_with("#EXTM3U")))
        .map(|i| i + 1)
        .unwrap_or(0);
    if let Some(preferred) = preferred {
        lines.insert(insert_at, preferred);
    }

    let mut out = lines.join("\n");
    if manifest.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Rewrite relative references to absolute provider URLs: bare path lines
/// and quoted `URI="…"` attributes.
pub fn rebase_urls(manifest: &str, origin: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in manifest.lines() {
        if line.starts_with('/') {
            out.push(format!("{origin}{line}"));
        } else {
            out.push(
                RE_URI_ATTR
                    .replace_all(line, |caps: &regex::Captures| {
                        format!(r#"URI="{origin}{}""#, &caps[1])
                    })
                    .into_owned(),
            );
        }
    }

    let mut rebased = out.join("\n");
    if manifest.ends_with('\n') {
        rebased.push('\n');
    }
    rebased
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /cdn/hls/{*path}` — proxy a playlist from the provider, reorder audio
/// when a `lang` preference is given, and rebase every reference.
pub async fn hls_manifest(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(mut params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let lang = params.remove("lang");

    let upstream_url = format!("{ZEPHYRFLICK_ORIGIN}/cdn/hls/{path}");
    let upstream_params: Vec<(String, String)> = params.into_iter().collect();

    let resp = state
        .http
        .get(&upstream_url)
        .query(&upstream_params)
        .header(header::USER_AGENT, random_user_agent())
        .header(header::REFERER, format!("{ZEPHYRFLICK_ORIGIN}/"))
        .send()
        .await
        .map_err(|e| ApiError::BadGateway(format!("upstream fetch failed: {e}")))?;

    if !resp.status().is_success() {
        debug!(url = %upstream_url, status = %resp.status(), "upstream manifest error");
        return Err(ApiError::BadGateway(format!(
            "upstream returned {}",
            resp.status()
        ))
        .into());
    }

    let mut body = resp
        .text()
        .await
        .map_err(|e| ApiError::BadGateway(format!("upstream body read failed: {e}")))?;

    if let Some(lang) = lang {
        body = prioritize_audio(&body, &lang);
    }
    body = rebase_urls(&body, ZEPHYRFLICK_ORIGIN);

    Ok((
        [(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)],
        body,
    )
        .into_response())
}

/// `GET /subtitles/{opaque_id}` — serve a re-hosted subtitle.
pub async fn serve_subtitle(
    State(state): State<AppState>,
    Path(opaque_id): Path<String>,
) -> Result<Response, AppError> {
    let origin_url = state
        .subtitles
        .lookup(&opaque_id)
        .ok_or_else(|| ApiError::NotFound("unknown subtitle id".into()))?;

    let resp = state
        .http
        .get(&origin_url)
        .header(header::USER_AGENT, random_user_agent())
        .send()
        .await
        .map_err(|e| ApiError::BadGateway(format!("subtitle fetch failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(ApiError::BadGateway(format!(
            "subtitle origin returned {}",
            resp.status()
        ))
        .into());
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| ApiError::BadGateway(format!("subtitle body read failed: {e}")))?;

    Ok((
        [(header::CONTENT_TYPE, subtitle_content_type(&opaque_id))],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = "#EXTM3U\n\
#EXT-X-VERSION:4\n\
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"audio\",NAME=\"Japanese\",LANGUAGE=\"ja\",DEFAULT=YES,URI=\"/hls/audio-ja.m3u8\"\n\
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"audio\",NAME=\"English\",LANGUAGE=\"en\",DEFAULT=NO,URI=\"/hls/audio-en.m3u8\"\n\
#EXT-X-STREAM-INF:BANDWIDTH=2400000,AUDIO=\"audio\"\n\
/hls/video-1080.m3u8\n";

    #[test]
    fn preferred_audio_becomes_default_and_moves_up() {
        let out = prioritize_audio(MANIFEST, "en");
        let lines: Vec<&str> = out.lines().collect();

        // English rendition sits right below the version tag, marked default
        assert!(lines[1].starts_with("#EXT-X-VERSION"));
        assert!(lines[2].contains(r#"LANGUAGE="en""#));
        assert!(lines[2].contains("DEFAULT=YES"));

        // Japanese keeps its place but is no longer default
        let ja = lines.iter().find(|l| l.contains(r#"LANGUAGE="ja""#)).unwrap();
        assert!(ja.contains("DEFAULT=NO"));

        // Nothing lost or duplicated
        assert_eq!(
            out.lines().filter(|l| is_audio_rendition(l)).count(),
            2
        );
        assert_eq!(out.lines().count(), MANIFEST.lines().count());
    }

    #[test]
    fn unmatched_language_leaves_manifest_untouched() {
        assert_eq!(prioritize_audio(MANIFEST, "de"), MANIFEST);
    }

    #[test]
    fn rendition_without_default_attr_gains_one() {
        let manifest = "#EXTM3U\n\
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"audio\",LANGUAGE=\"en\",URI=\"/hls/a.m3u8\"\n";
        let out = prioritize_audio(manifest, "en");
        assert!(out.contains("DEFAULT=YES"));
    }

    #[test]
    fn rebase_rewrites_bare_paths_and_uri_attrs() {
        let out = rebase_urls(MANIFEST, "https://play.zephyrflick.top");

        assert!(out.contains("https://play.zephyrflick.top/hls/video-1080.m3u8"));
        assert!(out.contains(r#"URI="https://play.zephyrflick.top/hls/audio-ja.m3u8""#));
        assert!(out.contains(r#"URI="https://play.zephyrflick.top/hls/audio-en.m3u8""#));
        assert!(!out.contains("URI=\"/hls/"));
    }

    #[test]
    fn rebase_leaves_absolute_urls_alone() {
        let manifest = "#EXTM3U\nhttps://cdn.example.com/seg1.ts\n#EXT-X-ENDLIST\n";
        assert_eq!(rebase_urls(manifest, "https://origin"), manifest);
    }

    #[test]
    fn subtitle_content_type_from_id() {
        assert_eq!(subtitle_content_type("abc123.srt"), "application/x-subrip");
        assert_eq!(subtitle_content_type("abc123.vtt"), "text/vtt");
    }
}
