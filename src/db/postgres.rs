use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::collections::{HashMap, HashSet};

use crate::error::AppResult;

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Read access to users' rated movies
///
/// The engine consumes ratings purely as exclusion lists: a movie a user has
/// already rated must never be selected for them again. Implemented by
/// [`PreferenceStore`] in production and by in-memory fakes in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreferenceSource: Send + Sync {
    /// Movie ids one user has already been shown
    async fn exclusion_set(&self, user_id: i64) -> AppResult<HashSet<i64>>;

    /// Exclusion sets for every user with at least one rating, used by the
    /// batch pre-warm job
    async fn exclusions_by_user(&self) -> AppResult<HashMap<i64, HashSet<i64>>>;
}

/// Postgres-backed preference source
#[derive(Clone)]
pub struct PreferenceStore {
    pool: PgPool,
}

impl PreferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferenceSource for PreferenceStore {
    async fn exclusion_set(&self, user_id: i64) -> AppResult<HashSet<i64>> {
        let rows = sqlx::query("SELECT movie_id FROM preferences WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        let ids: HashSet<i64> = rows.iter().map(|row| row.get("movie_id")).collect();

        tracing::debug!(user_id, excluded = ids.len(), "Loaded exclusion set");

        Ok(ids)
    }

    async fn exclusions_by_user(&self) -> AppResult<HashMap<i64, HashSet<i64>>> {
        let rows = sqlx::query("SELECT user_id, movie_id FROM preferences")
            .fetch_all(&self.pool)
            .await?;

        let mut by_user: HashMap<i64, HashSet<i64>> = HashMap::new();
        for row in rows {
            let user_id: i64 = row.get("user_id");
            let movie_id: i64 = row.get("movie_id");
            by_user.entry(user_id).or_default().insert(movie_id);
        }

        tracing::info!(users = by_user.len(), "Loaded exclusion sets for all users");

        Ok(by_user)
    }
}
