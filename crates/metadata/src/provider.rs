use anibridge_core::types::MediaType;

use crate::{ExternalMatch, MetadataError, TitleSearchResult};

/// A metadata provider that can cross-reference external catalog ids.
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Look up a title by its external catalog id (e.g. an IMDB id).
    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<ExternalMatch>, MetadataError>;

    /// Search for a title by name and optional release year.
    async fn search(
        &self,
        title: &str,
        media_type: MediaType,
        year: Option<i32>,
    ) -> Result<Vec<TitleSearchResult>, MetadataError>;

    /// Resolve the external catalog id for one of the provider's own ids.
    async fn external_id(
        &self,
        provider_id: &str,
        media_type: MediaType,
    ) -> Result<Option<String>, MetadataError>;

    /// All known poster path variants for a title, used for artwork matching.
    async fn artwork_paths(
        &self,
        provider_id: &str,
        media_type: MediaType,
    ) -> Result<Vec<String>, MetadataError>;
}
