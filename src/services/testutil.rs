//! In-memory doubles shared by the engine unit tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::db::{CacheKey, CacheStore, PreferenceSource};
use crate::error::{AppError, AppResult};
use crate::models::DiscoverMovie;
use crate::services::catalog::CatalogSource;

/// HashMap-backed cache store
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Seeds a raw value, bypassing the typed encoding (used to plant
    /// corrupt or foreign entries)
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> AppResult<Option<String>> {
        Ok(self.values.lock().unwrap().get(&key.to_string()).cloned())
    }

    async fn set(&self, key: &CacheKey, value: String) -> AppResult<()> {
        self.values.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn exists(&self, key: &CacheKey) -> AppResult<bool> {
        Ok(self.values.lock().unwrap().contains_key(&key.to_string()))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>> {
        Ok(self
            .values
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Preference source backed by a mutable in-memory map
#[derive(Default)]
pub struct PreferenceFake {
    by_user: Mutex<HashMap<i64, HashSet<i64>>>,
}

impl PreferenceFake {
    /// Replaces one user's exclusion set
    pub fn set_exclusions(&self, user_id: i64, ids: &[i64]) {
        self.by_user
            .lock()
            .unwrap()
            .insert(user_id, ids.iter().copied().collect());
    }
}

#[async_trait]
impl PreferenceSource for PreferenceFake {
    async fn exclusion_set(&self, user_id: i64) -> AppResult<HashSet<i64>> {
        Ok(self
            .by_user
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn exclusions_by_user(&self) -> AppResult<HashMap<i64, HashSet<i64>>> {
        Ok(self.by_user.lock().unwrap().clone())
    }
}

/// Catalog source scripted with fixed pages, genres, and availability
#[derive(Default)]
pub struct ScriptedCatalog {
    pages: Vec<Vec<DiscoverMovie>>,
    genres: HashMap<String, String>,
    availability: HashMap<i64, Vec<String>>,
    fail_availability: HashSet<i64>,
    fail_listing_from: Option<u32>,
    pub popular_calls: AtomicUsize,
    pub genre_calls: AtomicUsize,
    pub availability_calls: AtomicUsize,
}

impl ScriptedCatalog {
    pub fn with_page(mut self, page: Vec<DiscoverMovie>) -> Self {
        self.pages.push(page);
        self
    }

    pub fn with_genre(mut self, id: i64, name: &str) -> Self {
        self.genres.insert(id.to_string(), name.to_string());
        self
    }

    pub fn with_availability(mut self, id: i64, providers: &[&str]) -> Self {
        self.availability
            .insert(id, providers.iter().map(|p| p.to_string()).collect());
        self
    }

    /// Availability lookups for this id return `SourceUnavailable`
    pub fn failing_availability_for(mut self, id: i64) -> Self {
        self.fail_availability.insert(id);
        self
    }

    /// Listing calls for this page and beyond return `SourceUnavailable`
    pub fn failing_listing_from(mut self, page: u32) -> Self {
        self.fail_listing_from = Some(page);
        self
    }
}

#[async_trait]
impl CatalogSource for ScriptedCatalog {
    async fn popular(&self, page: u32) -> AppResult<Vec<DiscoverMovie>> {
        self.popular_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failing) = self.fail_listing_from {
            if page >= failing {
                return Err(AppError::SourceUnavailable("scripted outage".to_string()));
            }
        }
        Ok(self
            .pages
            .get((page - 1) as usize)
            .cloned()
            .unwrap_or_default())
    }

    async fn genres(&self) -> AppResult<HashMap<String, String>> {
        self.genre_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.genres.clone())
    }

    async fn availability(&self, movie_id: i64, _region: &str) -> AppResult<Vec<String>> {
        self.availability_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_availability.contains(&movie_id) {
            return Err(AppError::SourceUnavailable("scripted outage".to_string()));
        }
        Ok(self.availability.get(&movie_id).cloned().unwrap_or_default())
    }
}

/// Raw listing entry with one action genre, for scripted pages
pub fn raw_movie(id: i64) -> DiscoverMovie {
    DiscoverMovie {
        id,
        title: format!("Movie {}", id),
        release_date: Some("2020-01-01".to_string()),
        genre_ids: vec![28],
        popularity: 1000.0 - id as f64,
        poster_path: None,
    }
}
