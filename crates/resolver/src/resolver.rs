use std::sync::Arc;
use std::time::Duration;

use anibridge_catalog::CatalogProvider;
use anibridge_core::types::MediaType;
use anibridge_db::repo::{mappings, negatives};
use anibridge_metadata::provider::MetadataProvider;
use anibridge_metadata::TitleSearchResult;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::TtlCache;
use crate::matcher;

/// Only storage unavailability is a hard failure; every collaborator problem
/// fails closed to "not found".
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// How long a persisted failure record suppresses rediscovery.
    pub negative_ttl: Duration,
    /// TTL for the in-process acceleration caches.
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub negative_cache_capacity: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            negative_ttl: Duration::from_secs(30 * 24 * 3600),
            cache_ttl: Duration::from_secs(3600),
            cache_capacity: 1000,
            negative_cache_capacity: 500,
        }
    }
}

/// Bridges the external catalog id namespace and the site's slug namespace.
///
/// Lookup order is always acceleration cache → persistent store → discovery
/// against the collaborators; the caches are process-local and advisory.
pub struct Resolver {
    db: SqlitePool,
    metadata: Arc<dyn MetadataProvider>,
    catalog: Arc<dyn CatalogProvider>,
    /// external id → slug
    slug_cache: TtlCache<String, String>,
    /// slug → external id
    external_cache: TtlCache<String, String>,
    /// external ids known to be unresolvable
    failed_cache: TtlCache<String, ()>,
    negative_ttl_secs: i64,
}

impl Resolver {
    pub fn new(
        db: SqlitePool,
        metadata: Arc<dyn MetadataProvider>,
        catalog: Arc<dyn CatalogProvider>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            db,
            metadata,
            catalog,
            slug_cache: TtlCache::new(config.cache_ttl, config.cache_capacity),
            external_cache: TtlCache::new(config.cache_ttl, config.cache_capacity),
            failed_cache: TtlCache::new(config.cache_ttl, config.negative_cache_capacity),
            negative_ttl_secs: config.negative_ttl.as_secs() as i64,
        }
    }

    /// Resolve an external catalog id to the site's slug, discovering and
    /// persisting a new mapping on first sight.
    pub async fn resolve_slug(&self, external_id: &str) -> Result<Option<String>, ResolveError> {
        // Known-failed, no I/O
        if self.failed_cache.get(&external_id.to_string()).is_some() {
            return Ok(None);
        }

        // Known-failed, persisted (expired records self-heal on this read)
        if negatives::is_failed(&self.db, external_id, self.negative_ttl_secs).await? {
            self.failed_cache.insert(external_id.to_string(), ());
            return Ok(None);
        }

        if let Some(slug) = self.slug_cache.get(&external_id.to_string()) {
            return Ok(Some(slug));
        }

        if let Some(row) = mappings::get_by_external_id(&self.db, external_id).await? {
            self.slug_cache.insert(external_id.to_string(), row.slug.clone());
            return Ok(Some(row.slug));
        }

        self.discover_slug(external_id).await
    }

    /// Full discovery: metadata lookup → site search → artwork match → persist.
    async fn discover_slug(&self, external_id: &str) -> Result<Option<String>, ResolveError> {
        let found = match self.metadata.find_by_external_id(external_id).await {
            Ok(Some(m)) => m,
            Ok(None) => {
                debug!(external_id, "metadata provider does not know this id");
                return self.mark_failed(external_id).await;
            }
            Err(e) => {
                debug!(external_id, error = %e, "metadata lookup failed");
                return self.mark_failed(external_id).await;
            }
        };

        let candidates = match self.catalog.search(&found.title).await {
            Ok(c) => c,
            Err(e) => {
                debug!(external_id, title = %found.title, error = %e, "catalog search failed");
                return self.mark_failed(external_id).await;
            }
        };
        if candidates.is_empty() {
            debug!(external_id, title = %found.title, "no catalog search results");
            return self.mark_failed(external_id).await;
        }

        let matched = matcher::match_candidate(
            self.metadata.as_ref(),
            found.artwork_path.as_deref(),
            &candidates,
            Some(&found.provider_id),
            Some(found.media_type),
        )
        .await;

        let Some(hit) = matched else {
            debug!(external_id, title = %found.title, "no artwork match among candidates");
            return self.mark_failed(external_id).await;
        };

        mappings::upsert(&self.db, &hit.slug, &found.provider_id, external_id).await?;
        self.slug_cache
            .insert(external_id.to_string(), hit.slug.clone());
        self.external_cache
            .insert(hit.slug.clone(), external_id.to_string());

        info!(external_id, slug = %hit.slug, "discovered new mapping");
        Ok(Some(hit.slug.clone()))
    }

    async fn mark_failed(&self, external_id: &str) -> Result<Option<String>, ResolveError> {
        negatives::record_failure(&self.db, external_id).await?;
        self.failed_cache.insert(external_id.to_string(), ());
        Ok(None)
    }

    /// Mirror direction: the caller already holds catalog data for a slug and
    /// needs the canonical external id (e.g. while building a listing).
    ///
    /// Costs at most one provider search, so no negative caching here.
    pub async fn resolve_external_id(
        &self,
        slug: &str,
        title: &str,
        media_type: MediaType,
        artwork_url: Option<&str>,
        year: Option<i32>,
    ) -> Result<Option<String>, ResolveError> {
        if let Some(external_id) = self.external_cache.get(&slug.to_string()) {
            return Ok(Some(external_id));
        }

        if let Some(row) = mappings::get_by_slug(&self.db, slug).await? {
            self.external_cache
                .insert(slug.to_string(), row.external_id.clone());
            return Ok(Some(row.external_id));
        }

        let results = match self.metadata.search(title, media_type, year).await {
            Ok(r) => r,
            Err(e) => {
                debug!(slug, title, error = %e, "metadata search failed");
                return Ok(None);
            }
        };
        if results.is_empty() {
            return Ok(None);
        }

        let picked = self.pick_result(&results, artwork_url, media_type).await;

        let external_id = match self
            .metadata
            .external_id(&picked.provider_id, media_type)
            .await
        {
            Ok(Some(id)) => id,
            Ok(None) => {
                debug!(slug, provider_id = %picked.provider_id, "provider has no external id");
                return Ok(None);
            }
            Err(e) => {
                debug!(slug, error = %e, "external id lookup failed");
                return Ok(None);
            }
        };

        mappings::upsert(&self.db, slug, &picked.provider_id, &external_id).await?;
        self.external_cache
            .insert(slug.to_string(), external_id.clone());
        self.slug_cache
            .insert(external_id.clone(), slug.to_string());

        info!(slug, external_id = %external_id, "discovered new mapping");
        Ok(Some(external_id))
    }

    /// Pick a search result: single hit wins outright, otherwise artwork
    /// containment (primary path, then full variant sets), otherwise the
    /// first result.
    async fn pick_result<'a>(
        &self,
        results: &'a [TitleSearchResult],
        artwork_url: Option<&str>,
        media_type: MediaType,
    ) -> &'a TitleSearchResult {
        if results.len() == 1 {
            return &results[0];
        }

        let Some(artwork_url) = artwork_url else {
            return &results[0];
        };

        if let Some(hit) = results.iter().find(|r| {
            r.artwork_path
                .as_deref()
                .is_some_and(|p| artwork_url.contains(p))
        }) {
            return hit;
        }

        for result in results {
            match self
                .metadata
                .artwork_paths(&result.provider_id, media_type)
                .await
            {
                Ok(variants) => {
                    if variants
                        .iter()
                        .any(|v| !v.is_empty() && artwork_url.contains(v.as_str()))
                    {
                        return result;
                    }
                }
                Err(e) => {
                    debug!(provider_id = %result.provider_id, error = %e, "artwork variant fetch failed");
                }
            }
        }

        &results[0]
    }
}
