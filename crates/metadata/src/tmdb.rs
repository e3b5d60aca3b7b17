//! TMDB (The Movie Database) provider client.
//!
//! Uses TMDB API v3: https://developer.themoviedb.org/docs

use anibridge_core::types::MediaType;
use tracing::debug;

use crate::provider::MetadataProvider;
use crate::{ExternalMatch, MetadataError, TitleSearchResult};

const BASE_URL: &str = "https://api.themoviedb.org/3";

pub struct TmdbClient {
    api_key: String,
    client: reqwest::Client,
}

impl TmdbClient {
    pub fn new(api_key: String, client: reqwest::Client) -> Self {
        Self { api_key, client }
    }

    async fn get_json(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, MetadataError> {
        let mut all_params = vec![("api_key", self.api_key.as_str())];
        all_params.extend_from_slice(params);

        let url = format!("{BASE_URL}{path}");
        debug!(url = %url, "TMDB request");

        let resp = self
            .client
            .get(&url)
            .query(&all_params)
            .send()
            .await
            .map_err(|e| MetadataError::Network(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MetadataError::NotFound);
        }

        if !resp.status().is_success() {
            return Err(MetadataError::Provider(format!(
                "TMDB returned {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| MetadataError::Provider(format!("parse JSON: {e}")))
    }
}

/// TMDB path segment for a media type ("movie" or "tv").
fn type_segment(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Movie => "movie",
        MediaType::Series => "tv",
    }
}

#[async_trait::async_trait]
impl MetadataProvider for TmdbClient {
    fn name(&self) -> &str {
        "tmdb"
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<ExternalMatch>, MetadataError> {
        let data = self
            .get_json(
                &format!("/find/{external_id}"),
                &[("external_source", "imdb_id")],
            )
            .await?;

        Ok(parse_find_response(&data))
    }

    async fn search(
        &self,
        title: &str,
        media_type: MediaType,
        year: Option<i32>,
    ) -> Result<Vec<TitleSearchResult>, MetadataError> {
        let year_param = match media_type {
            MediaType::Movie => "year",
            MediaType::Series => "first_air_date_year",
        };
        let mut params = vec![("query", title)];
        let year_str = year.map(|y| y.to_string());
        if let Some(ref y) = year_str {
            params.push((year_param, y));
        }

        let data = self
            .get_json(&format!("/search/{}", type_segment(media_type)), &params)
            .await?;

        Ok(parse_search_results(&data, media_type))
    }

    async fn external_id(
        &self,
        provider_id: &str,
        media_type: MediaType,
    ) -> Result<Option<String>, MetadataError> {
        let data = self
            .get_json(
                &format!("/{}/{provider_id}/external_ids", type_segment(media_type)),
                &[],
            )
            .await?;

        Ok(data["imdb_id"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string()))
    }

    async fn artwork_paths(
        &self,
        provider_id: &str,
        media_type: MediaType,
    ) -> Result<Vec<String>, MetadataError> {
        let data = self
            .get_json(
                &format!("/{}/{provider_id}/images", type_segment(media_type)),
                &[],
            )
            .await?;

        let posters = data["posters"].as_array().cloned().unwrap_or_default();
        Ok(posters
            .iter()
            .filter_map(|p| p["file_path"].as_str().map(|s| s.to_string()))
            .collect())
    }
}

fn parse_find_response(data: &serde_json::Value) -> Option<ExternalMatch> {
    // Movie results win when a title exists as both
    let (result, media_type) = if let Some(m) = data["movie_results"]
        .as_array()
        .and_then(|a| a.first())
    {
        (m, MediaType::Movie)
    } else if let Some(t) = data["tv_results"].as_array().and_then(|a| a.first()) {
        (t, MediaType::Series)
    } else {
        return None;
    };

    let provider_id = result["id"].as_u64()?.to_string();
    let title_field = match media_type {
        MediaType::Movie => "title",
        MediaType::Series => "name",
    };
    let title = result[title_field].as_str()?.to_string();

    Some(ExternalMatch {
        provider_id,
        title,
        media_type,
        artwork_path: result["poster_path"].as_str().map(|s| s.to_string()),
    })
}

fn parse_search_results(data: &serde_json::Value, media_type: MediaType) -> Vec<TitleSearchResult> {
    let (title_field, date_field) = match media_type {
        MediaType::Movie => ("title", "release_date"),
        MediaType::Series => ("name", "first_air_date"),
    };

    let results = data["results"].as_array().cloned().unwrap_or_default();
    results
        .iter()
        .take(10)
        .map(|r| TitleSearchResult {
            provider_id: r["id"].as_u64().unwrap_or(0).to_string(),
            title: r[title_field].as_str().unwrap_or("Unknown").to_string(),
            year: r[date_field]
                .as_str()
                .and_then(|d| d.get(..4))
                .and_then(|y| y.parse().ok()),
            artwork_path: r["poster_path"].as_str().map(|s| s.to_string()),
        })
        .collect()
}
