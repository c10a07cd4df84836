use std::collections::HashMap;

use crate::db::MovieStore;
use crate::error::{AppError, AppResult};

/// Derived provider → cached movie ids index
///
/// Disposable view over the cache, never a source of truth: a single record
/// overwrite can change any provider list, so the index is rebuilt from a
/// full scan after every population pass instead of being patched
/// incrementally. That full rebuild is what keeps the lock-free cache design
/// safe.
#[derive(Debug, Default)]
pub struct AvailabilityIndex {
    by_provider: HashMap<String, Vec<i64>>,
}

impl AvailabilityIndex {
    /// Scans the given cached ids and groups them by provider name
    ///
    /// Missing or corrupt records are skipped and logged; only cache
    /// transport failures abort the scan.
    pub async fn build(store: &MovieStore, ids: &[i64]) -> AppResult<Self> {
        let mut by_provider: HashMap<String, Vec<i64>> = HashMap::new();
        let mut indexed = 0;

        for &id in ids {
            match store.movie(id).await {
                Ok(Some(movie)) => {
                    for provider in movie.providers {
                        by_provider.entry(provider).or_default().push(id);
                    }
                    indexed += 1;
                }
                Ok(None) => {
                    tracing::warn!(movie_id = id, "Cached id vanished during index build");
                }
                Err(AppError::CorruptRecord(key)) => {
                    tracing::warn!(key = %key, "Skipping corrupt record during index build");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(
            scanned = ids.len(),
            indexed,
            providers = by_provider.len(),
            "Availability index rebuilt"
        );

        Ok(Self { by_provider })
    }

    /// Number of cached movies listing this provider
    pub fn provider_count(&self, provider: &str) -> usize {
        self.by_provider.get(provider).map_or(0, Vec::len)
    }

    /// Ids listing this provider, in scan order
    pub fn ids_for(&self, provider: &str) -> &[i64] {
        self.by_provider.get(provider).map_or(&[], Vec::as_slice)
    }

    /// Sorted, deduplicated union of the given providers' id sets
    ///
    /// Sorted for determinism before sampling; a movie listing several of the
    /// requested providers appears once.
    pub fn union(&self, providers: &[String]) -> Vec<i64> {
        let mut ids: Vec<i64> = providers
            .iter()
            .flat_map(|p| self.ids_for(p).iter().copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.by_provider.keys().map(String::as_str)
    }
}
