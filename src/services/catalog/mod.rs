//! Catalog metadata source abstraction
//!
//! The engine only ever consumes three operations from the external catalog:
//! the paginated popularity-ordered listing, the genre taxonomy, and per-item
//! watch providers. Keeping them behind a trait lets the population and
//! selection loops run against scripted sources in tests.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::{error::AppResult, models::DiscoverMovie};

pub mod tmdb;

pub use tmdb::TmdbCatalog;

/// Trait for the external movie metadata API
///
/// No retries at this layer: callers distinguish "exhausted" (an empty page)
/// from "transient failure" (`SourceUnavailable`) and stop paginating on
/// either, keeping whatever they collected so far.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// One page of the popularity-ordered listing; pages are 1-indexed and an
    /// empty result means the source is exhausted, not that it failed
    async fn popular(&self, page: u32) -> AppResult<Vec<DiscoverMovie>>;

    /// The genre taxonomy, keyed by the genre id's string rendering
    async fn genres(&self) -> AppResult<HashMap<String, String>>;

    /// Flatrate provider names for one movie in one region (possibly empty)
    async fn availability(&self, movie_id: i64, region: &str) -> AppResult<Vec<String>>;
}
