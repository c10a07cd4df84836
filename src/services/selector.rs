use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;

use crate::config::Config;
use crate::db::{MovieStore, PreferenceSource};
use crate::error::AppResult;
use crate::models::Movie;
use crate::services::index::AvailabilityIndex;
use crate::services::population::{FetchPolicy, PopulationEngine};

/// Per-call knobs for [`RandomSelector::select`]
#[derive(Debug, Clone, Copy)]
pub struct SelectOptions {
    /// Population cycles allowed before settling for a partial result
    pub max_attempts: usize,
    /// Absolute deadline checked between attempts, never mid-enrichment
    pub deadline: Option<Instant>,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            deadline: None,
        }
    }
}

/// Uniform random selection under provider and exclusion constraints
///
/// Backfills the cache when the candidate set is too small, widening the
/// fetch target whenever consecutive attempts fail to grow the cache (a rare
/// provider combination may stay invisible across many default-sized fetches
/// of a popularity-ordered source). Exhausting the budget returns a partial,
/// possibly empty, list; degradation is soft and never an error.
pub struct RandomSelector {
    engine: Arc<PopulationEngine>,
    store: MovieStore,
    policy: FetchPolicy,
}

impl RandomSelector {
    pub fn new(engine: Arc<PopulationEngine>, store: MovieStore, policy: FetchPolicy) -> Self {
        Self {
            engine,
            store,
            policy,
        }
    }

    /// Draws up to `desired` distinct movies available on at least one of the
    /// required providers and outside the exclusion set
    pub async fn select(
        &self,
        exclude: &HashSet<i64>,
        providers: &[String],
        desired: usize,
        opts: SelectOptions,
    ) -> AppResult<Vec<Movie>> {
        tracing::info!(
            desired,
            providers = ?providers,
            excluded = exclude.len(),
            "Selecting random movies"
        );

        if desired == 0 || providers.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0;
        let mut last_cached_count = 0;
        let mut movies: Vec<Movie> = Vec::new();

        loop {
            if let Some(deadline) = opts.deadline {
                if Instant::now() >= deadline {
                    tracing::warn!(attempt, "Selection deadline passed, returning partial result");
                    break;
                }
            }

            let cached = self.store.cached_ids().await?;
            let current_cached_count = cached.len();

            let index = AvailabilityIndex::build(&self.store, &cached).await?;
            let valid: Vec<i64> = index
                .union(providers)
                .into_iter()
                .filter(|id| !exclude.contains(id))
                .collect();

            tracing::debug!(
                candidates = valid.len(),
                cached = current_cached_count,
                "Computed candidate set"
            );

            if valid.len() >= desired {
                let sample = Self::sample(&valid, desired);
                movies = self.store.movies(&sample).await?;

                if movies.len() >= desired || attempt >= opts.max_attempts {
                    tracing::info!(returned = movies.len(), "Selection complete");
                    return Ok(movies);
                }

                // A sampled key vanished or failed to decode; try again
                // rather than returning short with budget remaining
                tracing::warn!(
                    loaded = movies.len(),
                    desired,
                    "Short record load, retrying selection"
                );
            }

            if attempt >= opts.max_attempts {
                tracing::error!(
                    max_attempts = opts.max_attempts,
                    "Attempt budget exhausted, returning partial result"
                );
                break;
            }

            // No growth since the last attempt means default-sized fetches
            // are not surfacing matching items; widen the target
            let fetch_target = if current_cached_count <= last_cached_count {
                let widened = self.policy.widened(attempt);
                tracing::warn!(
                    cached = current_cached_count,
                    fetch_target = widened,
                    "No cache growth since last attempt, widening fetch"
                );
                widened
            } else {
                self.policy.batch
            };

            let mut populate_exclude: HashSet<i64> = cached.into_iter().collect();
            populate_exclude.extend(exclude.iter().copied());

            self.engine.populate(&populate_exclude, fetch_target).await?;

            last_cached_count = current_cached_count;
            attempt += 1;
        }

        tracing::info!(returned = movies.len(), desired, "Returning partial selection");
        Ok(movies)
    }

    /// Uniform sample without replacement over the sorted candidate set
    fn sample(valid: &[i64], desired: usize) -> Vec<i64> {
        let mut rng = rand::thread_rng();
        valid
            .choose_multiple(&mut rng, desired.min(valid.len()))
            .copied()
            .collect()
    }
}

/// A selected record plus its render-ready poster URL
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedMovie {
    pub movie: Movie,
    pub poster_url: Option<String>,
}

/// Selection entry point for a known user
///
/// Pulls the exclusion set from the preference source and the provider
/// constraint from configuration, defers to [`RandomSelector`], and joins
/// each record's poster path onto the configured image base.
pub struct UserSelector {
    selector: Arc<RandomSelector>,
    preferences: Arc<dyn PreferenceSource>,
    required_providers: Vec<String>,
    image_base_url: String,
}

impl UserSelector {
    pub fn new(
        selector: Arc<RandomSelector>,
        preferences: Arc<dyn PreferenceSource>,
        required_providers: Vec<String>,
        image_base_url: String,
    ) -> Self {
        Self {
            selector,
            preferences,
            required_providers,
            image_base_url,
        }
    }

    /// Wires the provider constraint and image base straight from config
    pub fn from_config(
        selector: Arc<RandomSelector>,
        preferences: Arc<dyn PreferenceSource>,
        config: &Config,
    ) -> Self {
        Self::new(
            selector,
            preferences,
            config.required_providers.clone(),
            config.image_base_url.clone(),
        )
    }

    pub async fn select_for_user(
        &self,
        user_id: i64,
        extra_exclude: &[i64],
        desired: usize,
    ) -> AppResult<Vec<SelectedMovie>> {
        let mut exclude = self.preferences.exclusion_set(user_id).await?;
        exclude.extend(extra_exclude.iter().copied());

        let movies = self
            .selector
            .select(
                &exclude,
                &self.required_providers,
                desired,
                SelectOptions::default(),
            )
            .await?;

        Ok(movies
            .into_iter()
            .map(|movie| {
                let poster_url = movie.poster_url(&self.image_base_url);
                SelectedMovie { movie, poster_url }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::genres::GenreCatalog;
    use crate::services::testutil::{raw_movie, MemoryStore, PreferenceFake, ScriptedCatalog};
    use std::sync::atomic::Ordering;

    fn selector(source: Arc<ScriptedCatalog>, store: MovieStore) -> RandomSelector {
        let genres = Arc::new(GenreCatalog::new(source.clone(), store.clone()));
        let engine = Arc::new(PopulationEngine::new(
            source,
            store.clone(),
            genres,
            "DE".to_string(),
        ));
        RandomSelector::new(engine, store, FetchPolicy::default())
    }

    async fn seed_movie(store: &MovieStore, id: i64, providers: &[&str]) {
        let movie = Movie::enriched(
            raw_movie(id),
            vec![],
            providers.iter().map(|p| p.to_string()).collect(),
        );
        store.put_movie(&movie).await.unwrap();
    }

    fn netflix() -> Vec<String> {
        vec!["Netflix".to_string()]
    }

    #[tokio::test]
    async fn test_select_returns_the_only_valid_candidate() {
        let store = MovieStore::new(Arc::new(MemoryStore::default()));
        seed_movie(&store, 1, &["Netflix"]).await;
        seed_movie(&store, 2, &["Netflix"]).await;
        let selector = selector(Arc::new(ScriptedCatalog::default()), store);

        let exclude: HashSet<i64> = [1].into_iter().collect();
        let movies = selector
            .select(&exclude, &netflix(), 1, SelectOptions::default())
            .await
            .unwrap();

        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].id, 2);
    }

    #[tokio::test]
    async fn test_select_excludes_and_never_duplicates() {
        let store = MovieStore::new(Arc::new(MemoryStore::default()));
        for id in 1..=20 {
            seed_movie(&store, id, &["Netflix"]).await;
        }
        let selector = selector(Arc::new(ScriptedCatalog::default()), store);

        let exclude: HashSet<i64> = (1..=5).collect();
        let movies = selector
            .select(&exclude, &netflix(), 10, SelectOptions::default())
            .await
            .unwrap();

        assert_eq!(movies.len(), 10);
        let ids: HashSet<i64> = movies.iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), 10, "no duplicate ids");
        assert!(ids.is_disjoint(&exclude), "exclusions respected");
        assert!(movies
            .iter()
            .all(|m| m.providers.iter().any(|p| p == "Netflix")));
    }

    #[tokio::test]
    async fn test_select_empty_when_no_provider_match_within_budget() {
        // Cache empty; the source returns one page of 20 movies, none of
        // which list Netflix
        let mut source = ScriptedCatalog::default();
        source = source.with_page((1..=20).map(raw_movie).collect());
        let source = Arc::new(source);
        let store = MovieStore::new(Arc::new(MemoryStore::default()));
        let selector = selector(source, store.clone());

        let movies = selector
            .select(
                &HashSet::new(),
                &netflix(),
                1,
                SelectOptions {
                    max_attempts: 1,
                    deadline: None,
                },
            )
            .await
            .unwrap();

        assert!(movies.is_empty());
        // The backfill still cached the page
        assert_eq!(store.cached_ids().await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_select_backfills_then_succeeds() {
        let source = Arc::new(
            ScriptedCatalog::default()
                .with_page(vec![raw_movie(1), raw_movie(2)])
                .with_availability(1, &["Netflix"]),
        );
        let store = MovieStore::new(Arc::new(MemoryStore::default()));
        let selector = selector(source, store);

        let movies = selector
            .select(&HashSet::new(), &netflix(), 1, SelectOptions::default())
            .await
            .unwrap();

        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].id, 1);
    }

    #[tokio::test]
    async fn test_select_bounded_population_cycles() {
        // A provider the source will never supply
        let source = Arc::new(ScriptedCatalog::default().with_page(vec![raw_movie(1)]));
        let store = MovieStore::new(Arc::new(MemoryStore::default()));
        let selector = selector(source.clone(), store);

        let movies = selector
            .select(
                &HashSet::new(),
                &netflix(),
                1,
                SelectOptions {
                    max_attempts: 3,
                    deadline: None,
                },
            )
            .await
            .unwrap();

        assert!(movies.is_empty());
        // At most two listing calls per population cycle here (page 1 plus
        // the exhaustion page), so the budget bounds the total
        assert!(source.popular_calls.load(Ordering::SeqCst) <= 2 * 3);
    }

    #[tokio::test]
    async fn test_select_desired_zero_is_empty_without_fetching() {
        let source = Arc::new(ScriptedCatalog::default());
        let store = MovieStore::new(Arc::new(MemoryStore::default()));
        let selector = selector(source.clone(), store);

        let movies = selector
            .select(&HashSet::new(), &netflix(), 0, SelectOptions::default())
            .await
            .unwrap();

        assert!(movies.is_empty());
        assert_eq!(source.popular_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_select_expired_deadline_returns_immediately() {
        let source = Arc::new(ScriptedCatalog::default().with_page(vec![raw_movie(1)]));
        let store = MovieStore::new(Arc::new(MemoryStore::default()));
        let selector = selector(source.clone(), store);

        let movies = selector
            .select(
                &HashSet::new(),
                &netflix(),
                1,
                SelectOptions {
                    max_attempts: 10,
                    deadline: Some(Instant::now()),
                },
            )
            .await
            .unwrap();

        assert!(movies.is_empty());
        assert_eq!(source.popular_calls.load(Ordering::SeqCst), 0);
    }

    fn user_selector(
        source: Arc<ScriptedCatalog>,
        store: MovieStore,
        preferences: Arc<PreferenceFake>,
    ) -> UserSelector {
        let config = Config {
            database_url: String::new(),
            redis_url: String::new(),
            tmdb_bearer_token: String::new(),
            tmdb_api_url: String::new(),
            watch_region: "DE".to_string(),
            required_providers: vec!["Netflix".to_string()],
            image_base_url: "https://image.test/".to_string(),
            fetch_batch_size: 100,
            max_fetch_batch_size: 1600,
            http_timeout_secs: 10,
            prewarm_interval_secs: 60,
            prewarm_max_attempts: 3,
            prewarm_failure_threshold: 0,
        };
        UserSelector::from_config(Arc::new(selector(source, store)), preferences, &config)
    }

    #[tokio::test]
    async fn test_select_for_user_applies_stored_exclusions() {
        let store = MovieStore::new(Arc::new(MemoryStore::default()));
        seed_movie(&store, 1, &["Netflix"]).await;
        let mut raw = raw_movie(2);
        raw.poster_path = Some("/two.jpg".to_string());
        store
            .put_movie(&Movie::enriched(raw, vec![], vec!["Netflix".to_string()]))
            .await
            .unwrap();

        let preferences = Arc::new(PreferenceFake::default());
        preferences.set_exclusions(7, &[1]);
        let user_selector = user_selector(
            Arc::new(ScriptedCatalog::default()),
            store,
            preferences,
        );

        let selected = user_selector.select_for_user(7, &[], 1).await.unwrap();

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].movie.id, 2);
        assert_eq!(
            selected[0].poster_url,
            Some("https://image.test/two.jpg".to_string())
        );
    }

    #[tokio::test]
    async fn test_select_for_user_merges_extra_exclusions() {
        let store = MovieStore::new(Arc::new(MemoryStore::default()));
        for id in 1..=3 {
            seed_movie(&store, id, &["Netflix"]).await;
        }

        let preferences = Arc::new(PreferenceFake::default());
        preferences.set_exclusions(7, &[1]);
        let user_selector = user_selector(
            Arc::new(ScriptedCatalog::default()),
            store,
            preferences,
        );

        let selected = user_selector.select_for_user(7, &[2], 1).await.unwrap();

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].movie.id, 3);
        // Seeded without a poster path
        assert_eq!(selected[0].poster_url, None);
    }

    #[test]
    fn test_sample_is_without_replacement() {
        let valid: Vec<i64> = (1..=5).collect();
        for _ in 0..50 {
            let sample = RandomSelector::sample(&valid, 3);
            assert_eq!(sample.len(), 3);
            let unique: HashSet<i64> = sample.iter().copied().collect();
            assert_eq!(unique.len(), 3);
            assert!(sample.iter().all(|id| valid.contains(id)));
        }
    }

    #[test]
    fn test_sample_caps_at_population_size() {
        let valid: Vec<i64> = vec![1, 2];
        assert_eq!(RandomSelector::sample(&valid, 10).len(), 2);
    }
}
