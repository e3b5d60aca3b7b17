pub mod headers;
pub mod players;
pub mod subtitles;

use std::collections::HashMap;
use std::sync::Arc;

use anibridge_catalog::CatalogProvider;
use tracing::debug;

use crate::players::{Player, StreamCandidate};
use crate::subtitles::SubtitleRegistry;

/// One playable stream descriptor, ready to hand to a client.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResolvedStream {
    pub title_label: String,
    pub url: String,
    pub subtitles: Vec<SubtitleTrack>,
    /// Extra headers a client must send when fetching the stream directly.
    pub proxy_headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SubtitleTrack {
    pub id: String,
    pub url: String,
    pub lang: String,
}

/// Turns a watch page into playable streams: find embedded players, run each
/// recognized player's handshake, proxy what comes back.
pub struct StreamExtractor {
    http: reqwest::Client,
    catalog: Arc<dyn CatalogProvider>,
    subtitles: Arc<SubtitleRegistry>,
    /// This server's public origin; manifest and subtitle URLs are rewritten
    /// onto it so all segment traffic passes through the proxy routes.
    public_base: String,
}

impl StreamExtractor {
    pub fn new(
        http: reqwest::Client,
        catalog: Arc<dyn CatalogProvider>,
        subtitles: Arc<SubtitleRegistry>,
        public_base: String,
    ) -> Self {
        Self {
            http,
            catalog,
            subtitles,
            public_base,
        }
    }

    /// Extract streams for a title. Absence of streams is a normal outcome:
    /// any failure along the way yields an empty list, never an error.
    pub async fn extract(
        &self,
        slug: &str,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Vec<ResolvedStream> {
        let html = match self.catalog.watch_page(slug, season, episode).await {
            Ok(html) => html,
            Err(e) => {
                debug!(slug, error = %e, "watch page fetch failed");
                return Vec::new();
            }
        };

        let candidates = players::find_embeds(&html);
        if candidates.is_empty() {
            debug!(slug, "no recognized player embeds on watch page");
            return Vec::new();
        }

        let mut streams = Vec::new();
        for candidate in candidates {
            if let Some(stream) = self.resolve_candidate(&candidate).await {
                streams.push(stream);
            }
        }
        streams
    }

    async fn resolve_candidate(&self, candidate: &StreamCandidate) -> Option<ResolvedStream> {
        match candidate.player {
            Player::Zephyrflick => {
                players::resolve_zephyrflick(
                    &self.http,
                    &self.subtitles,
                    &self.public_base,
                    &candidate.raw_url,
                )
                .await
            }
        }
    }
}
