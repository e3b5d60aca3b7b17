pub mod site;

use anibridge_core::types::MediaType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("network error: {0}")]
    Network(String),
    #[error("site returned {0}")]
    Status(u16),
}

/// One entry from a catalog listing or search page.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    pub title: String,
    pub slug: String,
    pub media_type: MediaType,
    pub artwork_url: Option<String>,
}

/// An episode reference on a title's detail page.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeRef {
    pub season: u32,
    pub episode: u32,
    pub title: Option<String>,
}

/// Everything the detail page exposes about one title.
#[derive(Debug, Clone)]
pub struct TitleDetail {
    pub slug: String,
    pub title: String,
    pub media_type: MediaType,
    pub description: Option<String>,
    pub artwork_url: Option<String>,
    pub year: Option<String>,
    pub episodes: Vec<EpisodeRef>,
}

/// Browse listings the site exposes on dedicated pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogList {
    Trending,
    Recent,
}

impl CatalogList {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "trending" => Some(Self::Trending),
            "recent" => Some(Self::Recent),
            _ => None,
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Self::Trending => "/trending",
            Self::Recent => "/recent",
        }
    }
}

/// The scraped catalog site, seen through a stable interface.
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Search the site by title.
    async fn search(&self, query: &str) -> Result<Vec<CatalogItem>, CatalogError>;

    /// Fetch one of the site's browse listings.
    async fn browse(&self, list: CatalogList) -> Result<Vec<CatalogItem>, CatalogError>;

    /// Fetch a title's detail page.
    async fn detail(
        &self,
        slug: &str,
        media_type: MediaType,
    ) -> Result<Option<TitleDetail>, CatalogError>;

    /// Fetch the raw watch page for a title (episode form when season and
    /// episode are given, movie form otherwise).
    async fn watch_page(
        &self,
        slug: &str,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<String, CatalogError>;
}
