use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// An enriched catalog entry as stored in the cache
///
/// Built once per fetch from the raw discover listing plus the genre and
/// watch-provider lookups. Re-fetching the same id fully overwrites the
/// record; enrichment is a pure function of the id at a point in time, so
/// last-writer-wins is safe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<i64>,
    /// Genre names resolved at enrichment time
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub poster_path: Option<String>,
    /// Flatrate provider names for the configured region
    #[serde(default)]
    pub providers: Vec<String>,
    pub cached_at: DateTime<Utc>,
}

impl Movie {
    /// Assembles an enriched record from the raw listing entry
    pub fn enriched(raw: DiscoverMovie, genres: Vec<String>, providers: Vec<String>) -> Self {
        Self {
            id: raw.id,
            title: raw.title,
            release_date: raw.release_date,
            genre_ids: raw.genre_ids,
            genres,
            popularity: raw.popularity,
            poster_path: raw.poster_path,
            providers,
            cached_at: Utc::now(),
        }
    }

    /// Full poster URL, if the record carries a poster path
    pub fn poster_url(&self, image_base_url: &str) -> Option<String> {
        self.poster_path.as_ref().map(|path| {
            let path = path.trim_start_matches('/');
            format!("{}{}", image_base_url, path)
        })
    }
}

/// One caller's selection constraint: ids already shown to that user plus the
/// providers a selected movie must be available on. A batch carries one per
/// distinct user for bulk pre-warming.
#[derive(Debug, Clone)]
pub struct Requirement {
    pub user_id: i64,
    pub exclude: HashSet<i64>,
    pub providers: Vec<String>,
}

// ============================================================================
// TMDB API Types
// ============================================================================

/// Raw entry from the paginated discover endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverMovie {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<i64>,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub poster_path: Option<String>,
}

/// Response envelope for GET /discover/movie
#[derive(Debug, Deserialize)]
pub struct DiscoverPage {
    #[serde(default)]
    pub results: Vec<DiscoverMovie>,
}

/// Response envelope for GET /genre/movie/list
#[derive(Debug, Deserialize)]
pub struct GenreList {
    #[serde(default)]
    pub genres: Vec<ApiGenre>,
}

#[derive(Debug, Deserialize)]
pub struct ApiGenre {
    pub id: i64,
    pub name: String,
}

impl GenreList {
    /// Flattens the listing into an id→name map keyed by the id's string
    /// rendering, matching the cached JSON encoding
    pub fn into_map(self) -> HashMap<String, String> {
        self.genres
            .into_iter()
            .map(|g| (g.id.to_string(), g.name))
            .collect()
    }
}

/// Response envelope for GET /movie/{id}/watch/providers
#[derive(Debug, Deserialize)]
pub struct WatchProvidersResponse {
    #[serde(default)]
    pub results: HashMap<String, RegionProviders>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegionProviders {
    #[serde(default)]
    pub flatrate: Vec<WatchProvider>,
}

#[derive(Debug, Deserialize)]
pub struct WatchProvider {
    pub provider_name: String,
}

impl WatchProvidersResponse {
    /// Flatrate provider names for one region; empty when the region is absent
    pub fn flatrate_names(mut self, region: &str) -> Vec<String> {
        self.results
            .remove(region)
            .map(|r| r.flatrate.into_iter().map(|p| p.provider_name).collect())
            .unwrap_or_default()
    }
}
