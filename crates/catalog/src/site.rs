//! Scraper client for the catalog site.
//!
//! Selectors track the site's current markup and are best-effort by nature;
//! a layout change degrades results to empty listings rather than errors.

use std::sync::LazyLock;

use anibridge_core::types::MediaType;
use scraper::{Html, Selector};
use tracing::debug;

use crate::{CatalogError, CatalogItem, CatalogList, CatalogProvider, EpisodeRef, TitleDetail};

const DEFAULT_BASE_URL: &str = "https://watchanimeworld.in";

static SEL_ITEM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".anime-item").unwrap());
static SEL_ITEM_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".anime-title").unwrap());
static SEL_LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static SEL_IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static SEL_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".anime-description").unwrap());
static SEL_POSTER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".anime-poster img").unwrap());
static SEL_YEAR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".anime-year").unwrap());
static SEL_EPISODE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".episode-item").unwrap());
static SEL_EPISODE_NUMBER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".episode-number").unwrap());
static SEL_EPISODE_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".episode-title").unwrap());

pub struct SiteClient {
    client: reqwest::Client,
    base_url: String,
}

impl SiteClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn fetch_html(&self, path: &str) -> Result<String, CatalogError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "catalog request");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }

        resp.text()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))
    }
}

#[async_trait::async_trait]
impl CatalogProvider for SiteClient {
    async fn search(&self, query: &str) -> Result<Vec<CatalogItem>, CatalogError> {
        let encoded = urlencoding::encode(query);
        let html = self.fetch_html(&format!("/search?q={encoded}")).await?;
        Ok(parse_items(&html))
    }

    async fn browse(&self, list: CatalogList) -> Result<Vec<CatalogItem>, CatalogError> {
        let html = self.fetch_html(list.path()).await?;
        Ok(parse_items(&html))
    }

    async fn detail(
        &self,
        slug: &str,
        media_type: MediaType,
    ) -> Result<Option<TitleDetail>, CatalogError> {
        let path = match media_type {
            MediaType::Movie => format!("/movie/{slug}"),
            MediaType::Series => format!("/series/{slug}"),
        };
        let html = match self.fetch_html(&path).await {
            Ok(html) => html,
            Err(CatalogError::Status(404)) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(parse_detail(&html, slug, media_type))
    }

    async fn watch_page(
        &self,
        slug: &str,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<String, CatalogError> {
        let path = match (season, episode) {
            (Some(s), Some(e)) => format!("/watch/{slug}/{s}/{e}"),
            _ => format!("/watch/{slug}"),
        };
        self.fetch_html(&path).await
    }
}

/// Parse a listing page (search results, browse lists) into catalog items.
pub fn parse_items(html: &str) -> Vec<CatalogItem> {
    let document = Html::parse_document(html);
    let mut items = Vec::new();

    for element in document.select(&SEL_ITEM) {
        let Some(link) = element.select(&SEL_LINK).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(slug) = slug_from_href(href) else {
            continue;
        };

        let title = element
            .select(&SEL_ITEM_TITLE)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        if title.is_empty() {
            continue;
        }

        let artwork_url = element
            .select(&SEL_IMG)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(|s| s.to_string());

        items.push(CatalogItem {
            title,
            slug,
            media_type: media_type_from_href(href),
            artwork_url,
        });
    }

    items
}

fn parse_detail(html: &str, slug: &str, media_type: MediaType) -> Option<TitleDetail> {
    let document = Html::parse_document(html);

    let title = document
        .select(&SEL_ITEM_TITLE)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())?;

    let description = document
        .select(&SEL_DESCRIPTION)
        .next()
        .map(|d| d.text().collect::<String>().trim().to_string());

    let artwork_url = document
        .select(&SEL_POSTER)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(|s| s.to_string());

    let year = document
        .select(&SEL_YEAR)
        .next()
        .map(|y| y.text().collect::<String>().trim().to_string());

    let mut episodes = Vec::new();
    for (idx, element) in document.select(&SEL_EPISODE).enumerate() {
        let season = element
            .value()
            .attr("data-season")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        let episode = element
            .value()
            .attr("data-episode")
            .and_then(|e| e.parse().ok())
            .or_else(|| {
                element
                    .select(&SEL_EPISODE_NUMBER)
                    .next()
                    .and_then(|n| n.text().collect::<String>().trim().parse().ok())
            })
            .unwrap_or(idx as u32 + 1);
        let title = element
            .select(&SEL_EPISODE_TITLE)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty());

        episodes.push(EpisodeRef {
            season,
            episode,
            title,
        });
    }

    Some(TitleDetail {
        slug: slug.to_string(),
        title,
        media_type,
        description,
        artwork_url,
        year,
        episodes,
    })
}

/// Last non-empty path segment of a result link.
fn slug_from_href(href: &str) -> Option<String> {
    let path = href
        .strip_prefix("https://")
        .or_else(|| href.strip_prefix("http://"))
        .and_then(|rest| rest.split_once('/').map(|(_, p)| p))
        .unwrap_or(href);

    path.split('/')
        .filter(|s| !s.is_empty())
        .next_back()
        .map(|s| s.to_string())
}

fn media_type_from_href(href: &str) -> MediaType {
    if href.contains("/movie/") {
        MediaType::Movie
    } else {
        MediaType::Series
    }
}
