pub mod provider;
pub mod tmdb;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("provider error: {0}")]
    Provider(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("not found")]
    NotFound,
}

/// What the metadata provider knows about a title looked up by external id.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExternalMatch {
    pub provider_id: String,
    pub title: String,
    pub media_type: anibridge_core::types::MediaType,
    /// Primary poster path, e.g. `/wXsQvli6xkYZ1.jpg`. Absent for titles the
    /// provider carries without artwork.
    pub artwork_path: Option<String>,
}

/// One title-search hit from the metadata provider.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TitleSearchResult {
    pub provider_id: String,
    pub title: String,
    pub year: Option<i32>,
    pub artwork_path: Option<String>,
}
