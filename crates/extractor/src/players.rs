//! Embedded-player recognition and per-player handshakes.
//!
//! Each supported player is one enum variant recognized by a URL-substring
//! signature; adding a player means adding a variant, a signature arm, and a
//! handshake function.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use crate::headers::random_user_agent;
use crate::subtitles::{self, SubtitleRegistry};
use crate::{ResolvedStream, SubtitleTrack};

pub const ZEPHYRFLICK_ORIGIN: &str = "https://play.zephyrflick.top";

static SEL_IFRAME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("iframe[src]").unwrap());

// Embedded id inside a player URL, e.g. /video/9f86d081884c7d65
static RE_ZEPHYRFLICK_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/video/([a-f0-9]+)").unwrap());

/// Supported embedded players.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Player {
    Zephyrflick,
}

impl Player {
    /// Recognize a player from its embed URL signature.
    pub fn from_embed_url(url: &str) -> Option<Self> {
        if url.contains("zephyrflick") {
            Some(Self::Zephyrflick)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zephyrflick => "zephyrflick",
        }
    }
}

/// A recognized player embed found on a watch page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCandidate {
    pub player: Player,
    pub raw_url: String,
}

/// Scan a watch page for recognized player embeds, in document order.
pub fn find_embeds(html: &str) -> Vec<StreamCandidate> {
    let document = Html::parse_document(html);
    let mut candidates = Vec::new();

    for iframe in document.select(&SEL_IFRAME) {
        let Some(src) = iframe.value().attr("src") else {
            continue;
        };
        if let Some(player) = Player::from_embed_url(src) {
            candidates.push(StreamCandidate {
                player,
                raw_url: src.to_string(),
            });
        }
    }

    candidates
}

/// Zephyrflick handshake: pull the video id out of the embed URL, ask the
/// player's internal API for the manifest, rewrite its origin onto our proxy,
/// and re-host any subtitles found on the embed page.
pub(crate) async fn resolve_zephyrflick(
    http: &reqwest::Client,
    registry: &SubtitleRegistry,
    public_base: &str,
    player_url: &str,
) -> Option<ResolvedStream> {
    let video_id = RE_ZEPHYRFLICK_ID
        .captures(player_url)
        .map(|c| c[1].to_string())?;

    let resp = http
        .post(format!("{ZEPHYRFLICK_ORIGIN}/player/index.php"))
        .query(&[("data", video_id.as_str()), ("do", "getVideo")])
        .header("User-Agent", random_user_agent())
        .header("X-Requested-With", "XMLHttpRequest")
        .header("Referer", player_url)
        .send()
        .await;

    let resp = match resp {
        Ok(r) => r,
        Err(e) => {
            debug!(video_id, error = %e, "zephyrflick API request failed");
            return None;
        }
    };

    let data: serde_json::Value = match resp.json().await {
        Ok(v) => v,
        Err(e) => {
            debug!(video_id, error = %e, "zephyrflick API returned malformed body");
            return None;
        }
    };

    let video_url = data["videoSource"].as_str()?;

    // Route all segment traffic through our proxy: same path, our origin
    let proxied_url = video_url.replace(ZEPHYRFLICK_ORIGIN, public_base);

    let subtitles = fetch_subtitles(http, registry, public_base, player_url, &video_id).await;

    Some(ResolvedStream {
        title_label: format!("[{}][auto]", Player::Zephyrflick.as_str()),
        url: proxied_url,
        subtitles,
        proxy_headers: None,
    })
}

/// Best effort: subtitles come from a second fetch of the embed page, and a
/// failure there must not sink the stream itself.
async fn fetch_subtitles(
    http: &reqwest::Client,
    registry: &SubtitleRegistry,
    public_base: &str,
    player_url: &str,
    video_id: &str,
) -> Vec<SubtitleTrack> {
    let page = match http
        .get(player_url)
        .header("User-Agent", random_user_agent())
        .send()
        .await
    {
        Ok(resp) => match resp.text().await {
            Ok(text) => text,
            Err(e) => {
                debug!(video_id, error = %e, "embed page body read failed");
                return Vec::new();
            }
        },
        Err(e) => {
            debug!(video_id, error = %e, "embed page fetch failed");
            return Vec::new();
        }
    };

    parse_and_register(registry, public_base, &page)
}

/// Register every subtitle from an embed page and return proxied tracks.
fn parse_and_register(
    registry: &SubtitleRegistry,
    public_base: &str,
    page: &str,
) -> Vec<SubtitleTrack> {
    subtitles::parse_subtitle_block(page)
        .into_iter()
        .map(|(lang_name, origin_url)| {
            let lang = subtitles::lang_code(&lang_name);
            let ext = subtitles::subtitle_ext(&origin_url);
            let opaque_id = registry.register(&origin_url, ext);
            SubtitleTrack {
                id: format!("{lang}-{opaque_id}"),
                url: format!("{public_base}/subtitles/{opaque_id}"),
                lang,
            }
        })
        .collect()
}
