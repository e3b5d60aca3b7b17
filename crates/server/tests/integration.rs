use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anibridge_catalog::{CatalogError, CatalogItem, CatalogList, CatalogProvider, EpisodeRef, TitleDetail};
use anibridge_core::types::MediaType;
use anibridge_metadata::provider::MetadataProvider;
use anibridge_metadata::{ExternalMatch, MetadataError, TitleSearchResult};
use anibridge_server::routes::build_router;
use anibridge_server::state::AppState;
use axum_test::TestServer;
use serde_json::Value;

/// Metadata double: canned answers, call counting.
#[derive(Default)]
struct StubMetadata {
    external_match: Option<ExternalMatch>,
    search_results: Vec<TitleSearchResult>,
    external_id: Option<String>,
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl MetadataProvider for StubMetadata {
    fn name(&self) -> &str {
        "stub"
    }

    async fn find_by_external_id(
        &self,
        _external_id: &str,
    ) -> Result<Option<ExternalMatch>, MetadataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.external_match.clone())
    }

    async fn search(
        &self,
        _title: &str,
        _media_type: MediaType,
        _year: Option<i32>,
    ) -> Result<Vec<TitleSearchResult>, MetadataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.search_results.clone())
    }

    async fn external_id(
        &self,
        _provider_id: &str,
        _media_type: MediaType,
    ) -> Result<Option<String>, MetadataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.external_id.clone())
    }

    async fn artwork_paths(
        &self,
        _provider_id: &str,
        _media_type: MediaType,
    ) -> Result<Vec<String>, MetadataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![])
    }
}

/// Catalog double: canned listings, detail pages and watch pages.
#[derive(Default)]
struct StubCatalog {
    items: Vec<CatalogItem>,
    detail: Option<TitleDetail>,
    watch_page_html: String,
}

#[async_trait::async_trait]
impl CatalogProvider for StubCatalog {
    async fn search(&self, _query: &str) -> Result<Vec<CatalogItem>, CatalogError> {
        Ok(self.items.clone())
    }

    async fn browse(&self, _list: CatalogList) -> Result<Vec<CatalogItem>, CatalogError> {
        Ok(self.items.clone())
    }

    async fn detail(
        &self,
        _slug: &str,
        _media_type: MediaType,
    ) -> Result<Option<TitleDetail>, CatalogError> {
        Ok(self.detail.clone())
    }

    async fn watch_page(
        &self,
        _slug: &str,
        _season: Option<u32>,
        _episode: Option<u32>,
    ) -> Result<String, CatalogError> {
        Ok(self.watch_page_html.clone())
    }
}

/// Create a test server over an in-memory SQLite database and stub collaborators.
async fn test_app(metadata: Arc<StubMetadata>, catalog: Arc<StubCatalog>) -> TestServer {
    let pool = anibridge_db::connect(":memory:").await.unwrap();
    anibridge_db::migrate::run(&pool).await.unwrap();

    let http = reqwest::Client::new();
    let resolver = Arc::new(anibridge_resolver::Resolver::new(
        pool.clone(),
        metadata.clone(),
        catalog.clone(),
        anibridge_resolver::ResolverConfig::default(),
    ));
    let subtitles = Arc::new(anibridge_extractor::subtitles::SubtitleRegistry::default());
    let extractor = Arc::new(anibridge_extractor::StreamExtractor::new(
        http.clone(),
        catalog.clone(),
        subtitles.clone(),
        "http://addon.test".to_string(),
    ));

    let state = AppState {
        db: pool,
        http,
        catalog,
        resolver,
        extractor,
        subtitles,
    };

    TestServer::new(build_router(state)).unwrap()
}

fn frieren_item() -> CatalogItem {
    CatalogItem {
        title: "Frieren".to_string(),
        slug: "frieren".to_string(),
        media_type: MediaType::Series,
        artwork_url: Some("https://cdn.site/frieren.jpg".to_string()),
    }
}

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let server = test_app(Arc::default(), Arc::default()).await;
    let resp = server.get("/health").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn manifest_lists_catalogs_and_prefixes() {
    let server = test_app(Arc::default(), Arc::default()).await;
    let resp = server.get("/manifest.json").await;
    resp.assert_status_ok();
    let body: Value = resp.json();

    assert_eq!(body["resources"], serde_json::json!(["catalog", "meta", "stream"]));
    assert_eq!(body["catalogs"].as_array().unwrap().len(), 3);
    assert!(body["idPrefixes"]
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p == "tt"));
}

#[tokio::test]
async fn stream_with_foreign_id_returns_empty_list() {
    let server = test_app(Arc::default(), Arc::default()).await;
    let resp = server.get("/stream/series/kitsu%3A42.json").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["streams"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn stream_for_unresolvable_external_id_is_negatively_cached() {
    let metadata = Arc::new(StubMetadata::default());
    let server = test_app(metadata.clone(), Arc::default()).await;

    let resp = server.get("/stream/series/tt9999999.json").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["streams"].as_array().unwrap().len(), 0);

    let calls_after_first = metadata.calls.load(Ordering::SeqCst);
    assert!(calls_after_first > 0);

    // Second request is answered from the negative cache
    let resp = server.get("/stream/series/tt9999999.json").await;
    resp.assert_status_ok();
    assert_eq!(metadata.calls.load(Ordering::SeqCst), calls_after_first);
}

#[tokio::test]
async fn stream_for_site_id_without_embeds_is_empty() {
    let catalog = Arc::new(StubCatalog {
        watch_page_html: "<html><body>maintenance</body></html>".to_string(),
        ..Default::default()
    });
    let server = test_app(Arc::default(), catalog).await;

    let resp = server.get("/stream/series/waw%3Afrieren%3A1%3A2.json").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["streams"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn catalog_resolves_items_to_external_ids() {
    let metadata = Arc::new(StubMetadata {
        search_results: vec![TitleSearchResult {
            provider_id: "4242".to_string(),
            title: "Frieren".to_string(),
            year: Some(2023),
            artwork_path: Some("/frieren.jpg".to_string()),
        }],
        external_id: Some("tt22248376".to_string()),
        ..Default::default()
    });
    let catalog = Arc::new(StubCatalog {
        items: vec![frieren_item()],
        ..Default::default()
    });
    let server = test_app(metadata, catalog).await;

    let resp = server.get("/catalog/anime/trending.json").await;
    resp.assert_status_ok();
    let body: Value = resp.json();

    let metas = body["metas"].as_array().unwrap();
    assert_eq!(metas.len(), 1);
    assert_eq!(metas[0]["id"], "tt22248376");
    assert_eq!(metas[0]["name"], "Frieren");
    assert_eq!(metas[0]["type"], "series");
}

#[tokio::test]
async fn catalog_drops_unresolvable_items() {
    // Metadata provider knows nothing, so the item cannot gain an external id
    let catalog = Arc::new(StubCatalog {
        items: vec![frieren_item()],
        ..Default::default()
    });
    let server = test_app(Arc::default(), catalog).await;

    let resp = server.get("/catalog/anime/trending.json").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["metas"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn unknown_catalog_is_a_404() {
    let server = test_app(Arc::default(), Arc::default()).await;
    let resp = server.get("/catalog/anime/most_watched.json").await;
    resp.assert_status(axum::http::StatusCode::NOT_FOUND);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn search_catalog_uses_the_query() {
    let metadata = Arc::new(StubMetadata {
        search_results: vec![TitleSearchResult {
            provider_id: "4242".to_string(),
            title: "Frieren".to_string(),
            year: None,
            artwork_path: None,
        }],
        external_id: Some("tt22248376".to_string()),
        ..Default::default()
    });
    let catalog = Arc::new(StubCatalog {
        items: vec![frieren_item()],
        ..Default::default()
    });
    let server = test_app(metadata, catalog).await;

    let resp = server
        .get("/catalog/anime/search/search%3Dfrieren.json")
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["metas"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn meta_for_site_series_lists_episode_videos() {
    let catalog = Arc::new(StubCatalog {
        detail: Some(TitleDetail {
            slug: "frieren".to_string(),
            title: "Frieren".to_string(),
            media_type: MediaType::Series,
            description: Some("After the party disbands...".to_string()),
            artwork_url: Some("https://cdn.site/frieren.jpg".to_string()),
            year: Some("2023".to_string()),
            episodes: vec![
                EpisodeRef {
                    season: 1,
                    episode: 1,
                    title: Some("The Journey's End".to_string()),
                },
                EpisodeRef {
                    season: 1,
                    episode: 2,
                    title: None,
                },
            ],
        }),
        ..Default::default()
    });
    let server = test_app(Arc::default(), catalog).await;

    let resp = server.get("/meta/series/waw%3Afrieren.json").await;
    resp.assert_status_ok();
    let body: Value = resp.json();

    assert_eq!(body["meta"]["id"], "waw:frieren");
    assert_eq!(body["meta"]["name"], "Frieren");
    let videos = body["meta"]["videos"].as_array().unwrap();
    assert_eq!(videos.len(), 2);
    assert_eq!(videos[0]["id"], "waw:frieren:1:1");
    assert_eq!(videos[0]["title"], "The Journey's End");
    assert_eq!(videos[1]["title"], "Episode 2");
}

#[tokio::test]
async fn meta_for_external_id_is_a_404() {
    let server = test_app(Arc::default(), Arc::default()).await;
    let resp = server.get("/meta/series/tt22248376.json").await;
    resp.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_subtitle_id_is_a_404() {
    let server = test_app(Arc::default(), Arc::default()).await;
    let resp = server.get("/subtitles/doesnotexist.vtt").await;
    resp.assert_status(axum::http::StatusCode::NOT_FOUND);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "not_found");
}
