use std::sync::Arc;

use anibridge_catalog::CatalogProvider;
use anibridge_extractor::subtitles::SubtitleRegistry;
use anibridge_extractor::StreamExtractor;
use anibridge_resolver::Resolver;
use sqlx::SqlitePool;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub http: reqwest::Client,
    pub catalog: Arc<dyn CatalogProvider>,
    pub resolver: Arc<Resolver>,
    pub extractor: Arc<StreamExtractor>,
    pub subtitles: Arc<SubtitleRegistry>,
}
