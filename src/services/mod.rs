pub mod catalog;
pub mod genres;
pub mod index;
pub mod population;
pub mod prewarm;
pub mod satisfier;
pub mod selector;

#[cfg(test)]
pub(crate) mod testutil;

pub use catalog::{CatalogSource, TmdbCatalog};
pub use genres::GenreCatalog;
pub use index::AvailabilityIndex;
pub use population::{FetchPolicy, PopulationEngine};
pub use prewarm::{PrewarmJob, UnmetPolicy};
pub use satisfier::RequirementSatisfier;
pub use selector::{RandomSelector, SelectOptions, SelectedMovie, UserSelector};
