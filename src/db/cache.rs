use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::redis::cache::ITEM_PREFIX;
use crate::db::CacheKey;
use crate::error::{AppError, AppResult};
use crate::models::Movie;

/// Key/value persistence behind the movie cache
///
/// Raw string values; `set` is last-writer-wins, values are durable until
/// external eviction. Implemented by [`crate::db::RedisStore`] in production
/// and by in-memory fakes in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> AppResult<Option<String>>;

    async fn set(&self, key: &CacheKey, value: String) -> AppResult<()>;

    async fn exists(&self, key: &CacheKey) -> AppResult<bool>;

    /// Enumerates keys matching a prefix, used to discover what is cached
    async fn keys_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>>;
}

/// Typed view over the cache store
///
/// Encodes and decodes movie records and the genre map, distinguishing
/// "absent" (`Ok(None)`) from "corrupt" (`AppError::CorruptRecord`) from
/// transport failure, which raw key/value access cannot.
#[derive(Clone)]
pub struct MovieStore {
    store: Arc<dyn CacheStore>,
}

impl MovieStore {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Loads one cached record; absent keys are a `None`, not an error
    pub async fn movie(&self, id: i64) -> AppResult<Option<Movie>> {
        let key = CacheKey::Item(id);
        match self.store.get(&key).await? {
            Some(json) => {
                let movie = serde_json::from_str(&json).map_err(|e| {
                    tracing::error!(key = %key, error = %e, "Cached record failed to decode");
                    AppError::CorruptRecord(key.to_string())
                })?;
                Ok(Some(movie))
            }
            None => Ok(None),
        }
    }

    /// Fully overwrites the record for this movie's id
    pub async fn put_movie(&self, movie: &Movie) -> AppResult<()> {
        let json = serde_json::to_string(movie)
            .map_err(|e| AppError::Internal(format!("Record serialization error: {}", e)))?;
        self.store.set(&CacheKey::Item(movie.id), json).await
    }

    pub async fn contains(&self, id: i64) -> AppResult<bool> {
        self.store.exists(&CacheKey::Item(id)).await
    }

    /// Loads several records, skipping and logging ids that are missing or
    /// fail to decode
    pub async fn movies(&self, ids: &[i64]) -> AppResult<Vec<Movie>> {
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();

        for &id in ids {
            match self.movie(id).await {
                Ok(Some(movie)) => found.push(movie),
                Ok(None) => missing.push(id),
                Err(AppError::CorruptRecord(key)) => {
                    tracing::warn!(key = %key, "Skipping corrupt record");
                }
                Err(e) => return Err(e),
            }
        }

        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "Requested movies not in cache");
        }

        tracing::debug!(
            requested = ids.len(),
            found = found.len(),
            "Loaded cached movies"
        );

        Ok(found)
    }

    /// Every movie id currently present in the cache
    ///
    /// Keys with an unparsable suffix are skipped and logged rather than
    /// aborting the enumeration.
    pub async fn cached_ids(&self) -> AppResult<Vec<i64>> {
        let keys = self.store.keys_with_prefix(ITEM_PREFIX).await?;

        let mut ids = Vec::with_capacity(keys.len());
        for key in keys {
            match CacheKey::parse_item(&key) {
                Some(id) => ids.push(id),
                None => tracing::warn!(key = %key, "Ignoring malformed item key"),
            }
        }

        Ok(ids)
    }

    /// The cached genre map, if present and decodable
    ///
    /// A corrupt map is treated as a miss so the caller refetches and
    /// overwrites it.
    pub async fn genre_map(&self) -> AppResult<Option<HashMap<String, String>>> {
        match self.store.get(&CacheKey::Genres).await? {
            Some(json) => match serde_json::from_str(&json) {
                Ok(map) => Ok(Some(map)),
                Err(e) => {
                    tracing::warn!(error = %e, "Cached genre map failed to decode, refetching");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub async fn put_genre_map(&self, map: &HashMap<String, String>) -> AppResult<()> {
        let json = serde_json::to_string(map)
            .map_err(|e| AppError::Internal(format!("Genre map serialization error: {}", e)))?;
        self.store.set(&CacheKey::Genres, json).await
    }
}
