use std::collections::HashSet;
use std::sync::Arc;

use crate::config::Config;
use crate::db::MovieStore;
use crate::error::AppResult;
use crate::models::{DiscoverMovie, Movie};
use crate::services::catalog::CatalogSource;
use crate::services::genres::GenreCatalog;

/// Fetch-size tuning for population passes
///
/// `batch` is the default target per pass; `max_batch` caps the exponential
/// widening the selector applies when consecutive attempts make no progress.
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    pub batch: usize,
    pub max_batch: usize,
}

impl FetchPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch: config.fetch_batch_size,
            max_batch: config.max_fetch_batch_size,
        }
    }

    /// Capped exponential widening: `batch * 2^(attempt / 2)`
    ///
    /// Halved growth rate keeps external call volume from running away; the
    /// cap is the intentional tunable bounding the worst case.
    pub fn widened(&self, attempt: usize) -> usize {
        let doublings = (attempt / 2).min(usize::BITS as usize - 1) as u32;
        self.batch
            .saturating_mul(1usize.checked_shl(doublings).unwrap_or(usize::MAX))
            .min(self.max_batch)
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            batch: 100,
            max_batch: 1600,
        }
    }
}

/// Fetches, deduplicates, enriches, and caches catalog items
///
/// One availability call per retained item is the dominant cost of a pass,
/// which is why targets stay modest by default.
pub struct PopulationEngine {
    source: Arc<dyn CatalogSource>,
    store: MovieStore,
    genres: Arc<GenreCatalog>,
    region: String,
}

impl PopulationEngine {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        store: MovieStore,
        genres: Arc<GenreCatalog>,
        region: String,
    ) -> Self {
        Self {
            source,
            store,
            genres,
            region,
        }
    }

    /// Adds up to `target` new movies to the cache, skipping `exclude`
    ///
    /// Walks the popularity-ordered listing page by page until the target is
    /// reached or the source is exhausted. A listing failure aborts the pass
    /// with the partial count; a per-item enrichment failure skips only that
    /// item. Returns the number of records actually written.
    pub async fn populate(&self, exclude: &HashSet<i64>, target: usize) -> AppResult<usize> {
        tracing::info!(
            target,
            excluded = exclude.len(),
            "Starting population pass"
        );

        let mut seen = exclude.clone();
        let mut collected = 0;
        let mut page = 1u32;
        let mut api_calls = 0u32;

        while collected < target {
            api_calls += 1;
            let results = match self.source.popular(page).await {
                Ok(results) => results,
                Err(e) => {
                    tracing::error!(page, error = %e, "Listing failed, keeping partial count");
                    break;
                }
            };

            if results.is_empty() {
                tracing::info!(page, "Source exhausted");
                break;
            }

            let page_size = results.len();
            let fresh: Vec<DiscoverMovie> =
                results.into_iter().filter(|m| seen.insert(m.id)).collect();

            tracing::debug!(
                page,
                retained = fresh.len(),
                dropped = page_size - fresh.len(),
                "Filtered discover page"
            );

            for raw in fresh {
                if collected >= target {
                    break;
                }

                let id = raw.id;
                api_calls += 1;
                match self.enrich(raw).await {
                    Ok(movie) => {
                        self.store.put_movie(&movie).await?;
                        tracing::debug!(
                            movie_id = id,
                            providers = movie.providers.len(),
                            "Cached enriched movie"
                        );
                        collected += 1;
                    }
                    Err(e) if e.is_source_unavailable() => {
                        tracing::warn!(movie_id = id, error = %e, "Enrichment failed, skipping item");
                    }
                    Err(e) => return Err(e),
                }
            }

            page += 1;
        }

        tracing::info!(added = collected, api_calls, "Population pass complete");

        Ok(collected)
    }

    /// Enrichment is a pure function of the id at a point in time, so a
    /// re-fetch overwriting an existing record is idempotent
    async fn enrich(&self, raw: DiscoverMovie) -> AppResult<Movie> {
        let genres = self.genres.resolve(&raw.genre_ids).await?;
        let providers = self.source.availability(raw.id, &self.region).await?;
        Ok(Movie::enriched(raw, genres, providers))
    }
}
