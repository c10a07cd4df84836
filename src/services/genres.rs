use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::db::MovieStore;
use crate::error::AppResult;
use crate::services::catalog::CatalogSource;

/// Lazily loaded genre id→name mapping
///
/// Loaded at most once per process (cache first, then the catalog API with a
/// write-back), then treated as immutable. A stale taxonomy is an accepted
/// trade-off; genre sets rarely change.
///
/// The map is keyed by the id's string rendering. The original data has an
/// inconsistent key encoding between freshly fetched and cache-round-tripped
/// maps (integer vs string keys); JSON object keys are always strings, so
/// both encodings collapse onto the string-key lookup here and an id present
/// only as `"28"` still resolves.
pub struct GenreCatalog {
    source: Arc<dyn CatalogSource>,
    store: MovieStore,
    map: RwLock<Option<Arc<HashMap<String, String>>>>,
}

impl GenreCatalog {
    pub fn new(source: Arc<dyn CatalogSource>, store: MovieStore) -> Self {
        Self {
            source,
            store,
            map: RwLock::new(None),
        }
    }

    /// Resolves genre ids to names, omitting (and logging) unknown ids
    pub async fn resolve(&self, genre_ids: &[i64]) -> AppResult<Vec<String>> {
        let map = self.map().await?;

        let names = genre_ids
            .iter()
            .filter_map(|id| match map.get(&id.to_string()) {
                Some(name) => Some(name.clone()),
                None => {
                    tracing::debug!(genre_id = id, "Unknown genre id, omitting name");
                    None
                }
            })
            .collect();

        Ok(names)
    }

    async fn map(&self) -> AppResult<Arc<HashMap<String, String>>> {
        if let Some(map) = self.map.read().await.as_ref() {
            return Ok(map.clone());
        }

        let mut guard = self.map.write().await;
        // Another task may have loaded while we waited for the write lock
        if let Some(map) = guard.as_ref() {
            return Ok(map.clone());
        }

        let loaded = Arc::new(self.load().await?);
        *guard = Some(loaded.clone());
        Ok(loaded)
    }

    /// Cache first; on miss or an empty map, fetch from the catalog API and
    /// write back. A source outage degrades to an empty map for this process
    /// lifetime rather than failing the enclosing population pass.
    async fn load(&self) -> AppResult<HashMap<String, String>> {
        if let Some(cached) = self.store.genre_map().await? {
            if !cached.is_empty() {
                tracing::info!(genres = cached.len(), "Loaded genre map from cache");
                return Ok(cached);
            }
        }

        tracing::info!("No cached genre map, fetching from catalog API");

        match self.source.genres().await {
            Ok(fetched) => {
                self.store.put_genre_map(&fetched).await?;
                tracing::info!(genres = fetched.len(), "Fetched and cached genre map");
                Ok(fetched)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch genre map, resolving no names");
                Ok(HashMap::new())
            }
        }
    }
}
