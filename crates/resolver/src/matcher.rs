//! Artwork-based disambiguation of catalog search results.
//!
//! Sites serve different crops and CDNs of the same poster, so containment
//! of the provider's poster path in the candidate's artwork URL is the
//! matching primitive, not equality.

use anibridge_catalog::CatalogItem;
use anibridge_core::types::MediaType;
use anibridge_metadata::provider::MetadataProvider;
use tracing::debug;

/// Cheap phase: the reference poster path contained in a candidate's primary
/// artwork URL. First hit in candidate list order wins.
pub fn match_primary<'a>(
    reference_artwork: &str,
    candidates: &'a [CatalogItem],
) -> Option<&'a CatalogItem> {
    if reference_artwork.is_empty() {
        return None;
    }
    candidates.iter().find(|c| {
        c.artwork_url
            .as_deref()
            .is_some_and(|url| url.contains(reference_artwork))
    })
}

/// Two-phase match: primary poster containment first, then the provider's
/// full poster-variant set (fetched only when the cheap check fails).
/// Candidate list order is the priority axis in both phases.
pub async fn match_candidate<'a>(
    metadata: &dyn MetadataProvider,
    reference_artwork: Option<&str>,
    candidates: &'a [CatalogItem],
    provider_id: Option<&str>,
    media_type: Option<MediaType>,
) -> Option<&'a CatalogItem> {
    let reference = reference_artwork?;

    if let Some(hit) = match_primary(reference, candidates) {
        return Some(hit);
    }

    let (provider_id, media_type) = (provider_id?, media_type?);
    let variants = match metadata.artwork_paths(provider_id, media_type).await {
        Ok(v) => v,
        Err(e) => {
            debug!(provider_id, error = %e, "artwork variant fetch failed");
            return None;
        }
    };

    candidates.iter().find(|c| {
        c.artwork_url.as_deref().is_some_and(|url| {
            variants
                .iter()
                .any(|v| !v.is_empty() && url.contains(v.as_str()))
        })
    })
}
