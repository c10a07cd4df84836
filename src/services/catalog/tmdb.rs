use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{DiscoverMovie, DiscoverPage, GenreList, WatchProvidersResponse},
    services::catalog::CatalogSource,
};

/// Discovery never looks past this release date; keeps page contents stable
/// across a population pass
const RELEASE_DATE_CEILING: &str = "2025-01-01";

/// TMDB-backed catalog source
///
/// Thin client over the discover, genre-list, and watch-provider endpoints.
/// Every transport or non-2xx failure surfaces as `SourceUnavailable`; retry
/// budgets live with the callers.
#[derive(Clone)]
pub struct TmdbCatalog {
    http_client: HttpClient,
    bearer_token: String,
    api_url: String,
}

impl TmdbCatalog {
    pub fn new(config: &Config) -> AppResult<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            bearer_token: config.tmdb_bearer_token.clone(),
            api_url: config.tmdb_api_url.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> AppResult<T> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.bearer_token)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::SourceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(url = %url, status = %status, body = %body, "Catalog API request failed");
            return Err(AppError::SourceUnavailable(format!(
                "API returned status {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::SourceUnavailable(format!("Malformed API response: {}", e)))
    }
}

#[async_trait]
impl CatalogSource for TmdbCatalog {
    async fn popular(&self, page: u32) -> AppResult<Vec<DiscoverMovie>> {
        let url = format!("{}/discover/movie", self.api_url);

        tracing::debug!(page, "Fetching discover page");

        let response: DiscoverPage = self
            .get_json(
                &url,
                &[
                    ("sort_by", "popularity.desc".to_string()),
                    ("primary_release_date.lte", RELEASE_DATE_CEILING.to_string()),
                    ("page", page.to_string()),
                ],
            )
            .await?;

        tracing::debug!(page, results = response.results.len(), "Discover page fetched");

        Ok(response.results)
    }

    async fn genres(&self) -> AppResult<HashMap<String, String>> {
        let url = format!("{}/genre/movie/list", self.api_url);

        let response: GenreList = self.get_json(&url, &[]).await?;
        let map = response.into_map();

        tracing::info!(genres = map.len(), "Fetched genre taxonomy");

        Ok(map)
    }

    async fn availability(&self, movie_id: i64, region: &str) -> AppResult<Vec<String>> {
        let url = format!("{}/movie/{}/watch/providers", self.api_url, movie_id);

        let response: WatchProvidersResponse = self.get_json(&url, &[]).await?;
        let providers = response.flatrate_names(region);

        if providers.is_empty() {
            tracing::debug!(movie_id, region, "No flatrate providers");
        } else {
            tracing::debug!(movie_id, region, providers = ?providers, "Providers fetched");
        }

        Ok(providers)
    }
}
