use async_trait::async_trait;
use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;

use crate::db::cache::CacheStore;
use crate::error::AppResult;

/// Prefix under which enriched movie records are stored
pub const ITEM_PREFIX: &str = "item_";

/// Key under which the genre id→name map is stored
pub const GENRES_KEY: &str = "genres";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Item(i64),
    Genres,
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Item(id) => write!(f, "{}{}", ITEM_PREFIX, id),
            CacheKey::Genres => write!(f, "{}", GENRES_KEY),
        }
    }
}

impl CacheKey {
    /// Recovers the movie id from an `item_<id>` key, `None` for anything else
    pub fn parse_item(key: &str) -> Option<i64> {
        key.strip_prefix(ITEM_PREFIX)?.parse().ok()
    }
}

/// Creates a Redis client for the movie cache
///
/// Connections are multiplexed; one client serves every store handle.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Redis-backed cache store
///
/// Raw string values only; typed encoding and the absent/corrupt distinction
/// live in [`crate::db::MovieStore`]. Writes are last-writer-wins with no
/// transactional guarantees, which is safe because enrichment of a given id
/// always produces the same record shape.
#[derive(Clone)]
pub struct RedisStore {
    redis_client: Client,
}

impl RedisStore {
    pub fn new(redis_client: Client) -> Self {
        Self { redis_client }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &CacheKey) -> AppResult<Option<String>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key.to_string()).await?;
        Ok(value)
    }

    async fn set(&self, key: &CacheKey, value: String) -> AppResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.set(key.to_string(), value).await?;
        Ok(())
    }

    async fn exists(&self, key: &CacheKey) -> AppResult<bool> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let found: bool = conn.exists(key.to_string()).await?;
        Ok(found)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let keys: Vec<String> = conn.keys(format!("{}*", prefix)).await?;
        Ok(keys)
    }
}
