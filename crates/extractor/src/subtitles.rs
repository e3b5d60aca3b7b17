//! Subtitle discovery and re-hosting.
//!
//! The player page inlines a subtitle manifest as a script variable of
//! bracket-tagged `[Language]url` lines. Each origin URL is registered under
//! a short-lived opaque id and served back through this server, so clients
//! never see the provider origin.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use regex::Regex;
use std::sync::LazyLock;

static RE_SUBTITLE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"var playerjsSubtitle = "([^"]+)""#).unwrap());

static RE_SUBTITLE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\](.+)").unwrap());

/// Parse the inline subtitle manifest out of a player page.
/// Returns `(language_name, origin_url)` pairs in page order.
pub fn parse_subtitle_block(page: &str) -> Vec<(String, String)> {
    let Some(captures) = RE_SUBTITLE_VAR.captures(page) else {
        return Vec::new();
    };

    // The script value carries either real newlines or escaped ones
    let block = captures[1].replace("\\n", "\n");

    let mut entries = Vec::new();
    for line in block.split(['\n', ',']) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(m) = RE_SUBTITLE_LINE.captures(line) {
            entries.push((m[1].to_string(), m[2].to_string()));
        }
    }
    entries
}

/// Normalize a language display name to a short code.
/// "English" in any spelling becomes `eng`; anything else keeps its first
/// three characters, lowercased.
pub fn lang_code(name: &str) -> String {
    let lower = name.to_lowercase();
    if lower.contains("english") {
        return "eng".to_string();
    }
    lower.chars().take(3).collect()
}

/// File extension carried into the opaque id, so the serving content type
/// can be derived from the id alone.
pub fn subtitle_ext(url: &str) -> &'static str {
    if url.ends_with(".srt") { "srt" } else { "vtt" }
}

struct Registration {
    origin_url: String,
    expires_at: Instant,
}

/// In-memory table of re-hosted subtitles keyed by opaque id.
///
/// Ids are fresh UUIDs suffixed with the subtitle extension; a live id is
/// never reused, and entries vanish after the TTL. Losing the table on
/// restart only invalidates in-flight playback sessions.
pub struct SubtitleRegistry {
    inner: Mutex<HashMap<String, Registration>>,
    ttl: Duration,
}

impl SubtitleRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Register an origin URL and return the opaque id it is now served under.
    pub fn register(&self, origin_url: &str, ext: &str) -> String {
        let mut inner = self.inner.lock().unwrap();

        let now = Instant::now();
        inner.retain(|_, r| r.expires_at > now);

        let id = format!("{}.{ext}", uuid::Uuid::new_v4().simple());
        inner.insert(
            id.clone(),
            Registration {
                origin_url: origin_url.to_string(),
                expires_at: now + self.ttl,
            },
        );
        id
    }

    /// Look up a registration. Expired or unknown ids answer `None`.
    pub fn lookup(&self, opaque_id: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .get(opaque_id)
            .filter(|r| r.expires_at > Instant::now())
            .map(|r| r.origin_url.clone())
    }
}

impl Default for SubtitleRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(4 * 3600))
    }
}
