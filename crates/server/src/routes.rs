use anibridge_catalog::{CatalogItem, CatalogList};
use anibridge_core::error::ApiError;
use anibridge_core::types::MediaType;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

/// Id prefix for titles addressed by the site's own slug.
pub const SITE_ID_PREFIX: &str = "waw";

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/manifest.json", get(addon_manifest))
        .route("/catalog/{media_type}/{id}", get(addon_catalog))
        .route("/catalog/{media_type}/{id}/{extra}", get(addon_catalog_extra))
        .route("/meta/{media_type}/{id}", get(addon_meta))
        .route("/stream/{media_type}/{id}", get(addon_stream))
        .route("/cdn/hls/{*path}", get(crate::proxy::hls_manifest))
        .route("/subtitles/{opaque_id}", get(crate::proxy::serve_subtitle))
        // Addon clients and video players fetch everything cross-origin
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Addon route paths end in `.json`; params arrive with the suffix attached.
fn strip_json(segment: &str) -> &str {
    segment.strip_suffix(".json").unwrap_or(segment)
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    sqlx::query("SELECT 1")
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("database check failed: {e}")))?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Addon manifest
// ---------------------------------------------------------------------------

async fn addon_manifest() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "id": "org.anibridge.addon",
        "version": env!("CARGO_PKG_VERSION"),
        "name": "AniBridge",
        "description": "Streams from WatchAnimeWorld with external id bridging",
        "types": ["anime", "series", "movie"],
        "resources": ["catalog", "meta", "stream"],
        "idPrefixes": [SITE_ID_PREFIX, "tt"],
        "catalogs": [
            { "type": "anime", "id": "trending", "name": "Trending" },
            { "type": "anime", "id": "recent", "name": "Recently Added" },
            {
                "type": "anime",
                "id": "search",
                "name": "Search",
                "extra": [{ "name": "search", "isRequired": true }]
            }
        ],
        "behaviorHints": { "configurable": false }
    }))
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CatalogResponse {
    metas: Vec<MetaPreview>,
}

#[derive(Serialize)]
struct MetaPreview {
    id: String,
    #[serde(rename = "type")]
    media_type: MediaType,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    poster: Option<String>,
}

async fn addon_catalog(
    State(state): State<AppState>,
    Path((_media_type, id)): Path<(String, String)>,
) -> Result<Json<CatalogResponse>, AppError> {
    let Some(list) = CatalogList::from_id(strip_json(&id)) else {
        return Err(ApiError::NotFound(format!("unknown catalog: {id}")).into());
    };

    let items = match state.catalog.browse(list).await {
        Ok(items) => items,
        Err(e) => {
            warn!(catalog = strip_json(&id), error = %e, "catalog fetch failed");
            Vec::new()
        }
    };

    Ok(Json(CatalogResponse {
        metas: items_to_metas(&state, items).await?,
    }))
}

async fn addon_catalog_extra(
    State(state): State<AppState>,
    Path((_media_type, id, extra)): Path<(String, String, String)>,
) -> Result<Json<CatalogResponse>, AppError> {
    if strip_json(&id) != "search" {
        return Err(ApiError::NotFound(format!("unknown catalog: {id}")).into());
    }
    let Some(query) = strip_json(&extra).strip_prefix("search=") else {
        return Err(ApiError::BadRequest("missing search term".into()).into());
    };

    let items = match state.catalog.search(query).await {
        Ok(items) => items,
        Err(e) => {
            warn!(query, error = %e, "catalog search failed");
            Vec::new()
        }
    };

    Ok(Json(CatalogResponse {
        metas: items_to_metas(&state, items).await?,
    }))
}

/// Map site items to addon metas under their canonical external ids.
/// Items with no resolvable external id are dropped from the listing.
async fn items_to_metas(
    state: &AppState,
    items: Vec<CatalogItem>,
) -> Result<Vec<MetaPreview>, AppError> {
    let mut metas = Vec::with_capacity(items.len());
    for item in items {
        let external_id = state
            .resolver
            .resolve_external_id(
                &item.slug,
                &item.title,
                item.media_type,
                item.artwork_url.as_deref(),
                None,
            )
            .await
            .map_err(|e| ApiError::Internal(format!("resolver error: {e}")))?;

        if let Some(id) = external_id {
            metas.push(MetaPreview {
                id,
                media_type: item.media_type,
                name: item.title,
                poster: item.artwork_url,
            });
        }
    }
    Ok(metas)
}

// ---------------------------------------------------------------------------
// Meta
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct MetaResponse {
    meta: serde_json::Value,
}

async fn addon_meta(
    State(state): State<AppState>,
    Path((media_type, id)): Path<(String, String)>,
) -> Result<Json<MetaResponse>, AppError> {
    let id = strip_json(&id);
    let Some(slug) = id.strip_prefix(&format!("{SITE_ID_PREFIX}:")) else {
        return Err(ApiError::NotFound("only site-prefixed meta ids are served".into()).into());
    };

    let media_type = MediaType::from_request(&media_type);
    let detail = state
        .catalog
        .detail(slug, media_type)
        .await
        .map_err(|e| ApiError::BadGateway(format!("detail fetch failed: {e}")))?
        .ok_or_else(|| ApiError::NotFound(format!("no such title: {slug}")))?;

    let mut meta = serde_json::json!({
        "id": id,
        "type": detail.media_type,
        "name": detail.title,
        "description": detail.description,
        "poster": detail.artwork_url,
        "releaseInfo": detail.year,
    });

    if detail.media_type == MediaType::Series {
        let videos: Vec<serde_json::Value> = detail
            .episodes
            .iter()
            .map(|ep| {
                serde_json::json!({
                    "id": format!("{SITE_ID_PREFIX}:{slug}:{}:{}", ep.season, ep.episode),
                    "title": ep
                        .title
                        .clone()
                        .unwrap_or_else(|| format!("Episode {}", ep.episode)),
                    "season": ep.season,
                    "episode": ep.episode,
                })
            })
            .collect();
        meta["videos"] = serde_json::Value::Array(videos);
    }

    Ok(Json(MetaResponse { meta }))
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct StreamsResponse {
    streams: Vec<StreamEntry>,
}

#[derive(Serialize)]
struct StreamEntry {
    title: String,
    url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    subtitles: Vec<SubtitleEntry>,
    #[serde(rename = "behaviorHints", skip_serializing_if = "Option::is_none")]
    behavior_hints: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct SubtitleEntry {
    id: String,
    url: String,
    lang: String,
}

/// Either side of the id bridge, as addressed by a stream request.
enum ContentTarget {
    External(String),
    Slug(String),
}

struct ContentRef {
    target: ContentTarget,
    season: Option<u32>,
    episode: Option<u32>,
}

/// Parse a stream content id: `tt…[:season:episode]` for external ids,
/// `waw:slug[:season:episode]` for site-local ones.
fn parse_content_id(raw: &str) -> Option<ContentRef> {
    let parts: Vec<&str> = raw.split(':').collect();

    if parts[0] == SITE_ID_PREFIX {
        return match parts.as_slice() {
            [_, slug] => Some(ContentRef {
                target: ContentTarget::Slug((*slug).to_string()),
                season: None,
                episode: None,
            }),
            [_, slug, season, episode] => Some(ContentRef {
                target: ContentTarget::Slug((*slug).to_string()),
                season: season.parse().ok(),
                episode: episode.parse().ok(),
            }),
            _ => None,
        };
    }

    if parts[0].starts_with("tt") {
        return match parts.as_slice() {
            [external] => Some(ContentRef {
                target: ContentTarget::External((*external).to_string()),
                season: None,
                episode: None,
            }),
            [external, season, episode] => Some(ContentRef {
                target: ContentTarget::External((*external).to_string()),
                season: season.parse().ok(),
                episode: episode.parse().ok(),
            }),
            _ => None,
        };
    }

    None
}

async fn addon_stream(
    State(state): State<AppState>,
    Path((_media_type, id)): Path<(String, String)>,
) -> Result<Json<StreamsResponse>, AppError> {
    let Some(content) = parse_content_id(strip_json(&id)) else {
        return Ok(Json(StreamsResponse { streams: vec![] }));
    };

    let slug = match content.target {
        ContentTarget::Slug(slug) => slug,
        ContentTarget::External(external_id) => {
            match state
                .resolver
                .resolve_slug(&external_id)
                .await
                .map_err(|e| ApiError::Internal(format!("resolver error: {e}")))?
            {
                Some(slug) => slug,
                // Unresolvable is a normal empty outcome, not an error
                None => return Ok(Json(StreamsResponse { streams: vec![] })),
            }
        }
    };

    let streams = state
        .extractor
        .extract(&slug, content.season, content.episode)
        .await;

    let entries = streams
        .into_iter()
        .map(|s| StreamEntry {
            title: s.title_label,
            url: s.url,
            subtitles: s
                .subtitles
                .into_iter()
                .map(|t| SubtitleEntry {
                    id: t.id,
                    url: t.url,
                    lang: t.lang,
                })
                .collect(),
            behavior_hints: s
                .proxy_headers
                .map(|h| serde_json::json!({ "proxyHeaders": h })),
        })
        .collect();

    Ok(Json(StreamsResponse { streams: entries }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_external_movie_id() {
        let parsed = parse_content_id("tt0111161").unwrap();
        assert!(matches!(parsed.target, ContentTarget::External(ref id) if id == "tt0111161"));
        assert_eq!(parsed.season, None);
        assert_eq!(parsed.episode, None);
    }

    #[test]
    fn parse_external_episode_id() {
        let parsed = parse_content_id("tt22248376:2:11").unwrap();
        assert!(matches!(parsed.target, ContentTarget::External(ref id) if id == "tt22248376"));
        assert_eq!(parsed.season, Some(2));
        assert_eq!(parsed.episode, Some(11));
    }

    #[test]
    fn parse_site_ids() {
        let parsed = parse_content_id("waw:frieren:1:4").unwrap();
        assert!(matches!(parsed.target, ContentTarget::Slug(ref s) if s == "frieren"));
        assert_eq!(parsed.season, Some(1));
        assert_eq!(parsed.episode, Some(4));

        let movie = parse_content_id("waw:suzume").unwrap();
        assert!(matches!(movie.target, ContentTarget::Slug(ref s) if s == "suzume"));
    }

    #[test]
    fn parse_rejects_foreign_ids() {
        assert!(parse_content_id("kitsu:42").is_none());
        assert!(parse_content_id("tt1:2").is_none());
        assert!(parse_content_id("waw:slug:1").is_none());
    }

    #[test]
    fn strip_json_suffix() {
        assert_eq!(strip_json("trending.json"), "trending");
        assert_eq!(strip_json("trending"), "trending");
    }
}
