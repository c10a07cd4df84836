use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use reelpick::config::Config;
use reelpick::db::{
    create_pool, create_redis_client, CacheStore, MovieStore, PreferenceSource, PreferenceStore,
    RedisStore,
};
use reelpick::services::{
    CatalogSource, FetchPolicy, GenreCatalog, PopulationEngine, PrewarmJob, RequirementSatisfier,
    TmdbCatalog,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    let preferences: Arc<dyn PreferenceSource> = Arc::new(PreferenceStore::new(pool));

    let redis_client = create_redis_client(&config.redis_url)?;
    let cache: Arc<dyn CacheStore> = Arc::new(RedisStore::new(redis_client));
    let store = MovieStore::new(cache);

    let source: Arc<dyn CatalogSource> = Arc::new(TmdbCatalog::new(&config)?);
    let genres = Arc::new(GenreCatalog::new(source.clone(), store.clone()));
    let engine = Arc::new(PopulationEngine::new(
        source,
        store.clone(),
        genres,
        config.watch_region.clone(),
    ));
    let satisfier = RequirementSatisfier::new(engine, store, FetchPolicy::from_config(&config));

    let interval = Duration::from_secs(config.prewarm_interval_secs);
    tracing::info!(
        interval_secs = config.prewarm_interval_secs,
        providers = ?config.required_providers,
        "Starting cache pre-warm job"
    );

    let job = PrewarmJob::new(satisfier, preferences, &config);
    job.run(interval).await;

    Ok(())
}
