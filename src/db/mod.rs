pub mod cache;
pub mod postgres;
pub mod redis;

pub use self::cache::{CacheStore, MovieStore};
pub use self::postgres::{create_pool, PreferenceSource, PreferenceStore};
pub use self::redis::{create_redis_client, CacheKey, RedisStore};
