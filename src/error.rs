/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Catalog source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Corrupt cache record at {0}")]
    CorruptRecord(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for errors originating at the external catalog boundary
    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, AppError::SourceUnavailable(_))
    }
}

pub type AppResult<T> = Result<T, AppError>;
