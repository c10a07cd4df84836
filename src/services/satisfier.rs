use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::db::MovieStore;
use crate::error::AppResult;
use crate::models::Requirement;
use crate::services::index::AvailabilityIndex;
use crate::services::population::{FetchPolicy, PopulationEngine};

/// Drives the population engine until per-provider minimum counts are met
///
/// Failure is soft throughout: an unmet requirement after the attempt budget
/// is a `false`, never an error, and callers proceed with degraded
/// availability.
pub struct RequirementSatisfier {
    engine: Arc<PopulationEngine>,
    store: MovieStore,
    policy: FetchPolicy,
}

impl RequirementSatisfier {
    pub fn new(engine: Arc<PopulationEngine>, store: MovieStore, policy: FetchPolicy) -> Self {
        Self {
            engine,
            store,
            policy,
        }
    }

    /// Ensures each provider has at least its minimum number of cached movies
    ///
    /// Per attempt the index is rebuilt from scratch over everything cached;
    /// if any pair falls short, one population pass runs with all cached ids
    /// excluded. At most `max_attempts` population cycles.
    pub async fn ensure_providers(
        &self,
        requirements: &HashMap<String, usize>,
        max_attempts: usize,
    ) -> AppResult<bool> {
        tracing::info!(
            providers = requirements.len(),
            max_attempts,
            "Checking provider movie requirements"
        );

        let mut met = false;
        let mut attempt = 0;

        while !met && attempt < max_attempts {
            let cached = self.store.cached_ids().await?;
            let index = AvailabilityIndex::build(&self.store, &cached).await?;

            met = true;
            for (provider, min_count) in requirements {
                let count = index.provider_count(provider);
                if count < *min_count {
                    tracing::warn!(
                        provider = %provider,
                        count,
                        min_count,
                        "Provider short of required movies"
                    );
                    met = false;
                } else {
                    tracing::debug!(provider = %provider, count, min_count, "Provider satisfied");
                }
            }

            if !met {
                tracing::info!(
                    attempt = attempt + 1,
                    max_attempts,
                    "Requirements unmet, fetching additional movies"
                );
                let exclude: HashSet<i64> = cached.into_iter().collect();
                self.engine.populate(&exclude, self.policy.batch).await?;
            }

            attempt += 1;
        }

        if met {
            tracing::info!("All provider requirements met");
        } else {
            tracing::warn!(max_attempts, "Provider requirements unmet after budget");
        }

        Ok(met)
    }

    /// Ensures one caller's requirement is satisfiable: each required
    /// provider present at all, and at least one candidate surviving the
    /// caller's exclusion set
    pub async fn ensure_requirement(
        &self,
        requirement: &Requirement,
        max_attempts: usize,
    ) -> AppResult<bool> {
        let provider_requirements: HashMap<String, usize> = requirement
            .providers
            .iter()
            .map(|p| (p.clone(), 1))
            .collect();

        if !self
            .ensure_providers(&provider_requirements, max_attempts)
            .await?
        {
            tracing::warn!(
                user_id = requirement.user_id,
                "Provider requirements unmet for user"
            );
            return Ok(false);
        }

        let mut retry = 0;
        loop {
            let cached = self.store.cached_ids().await?;
            let index = AvailabilityIndex::build(&self.store, &cached).await?;
            let candidates = index
                .union(&requirement.providers)
                .into_iter()
                .filter(|id| !requirement.exclude.contains(id))
                .count();

            if candidates > 0 {
                tracing::debug!(
                    user_id = requirement.user_id,
                    candidates,
                    "Requirement satisfiable"
                );
                return Ok(true);
            }

            if retry >= max_attempts {
                tracing::error!(
                    user_id = requirement.user_id,
                    max_attempts,
                    "No candidates after exclusions, giving up"
                );
                return Ok(false);
            }

            tracing::warn!(
                user_id = requirement.user_id,
                attempt = retry + 1,
                max_attempts,
                "No candidates after exclusions, fetching more"
            );
            let exclude: HashSet<i64> = cached.into_iter().collect();
            self.engine.populate(&exclude, self.policy.batch).await?;
            retry += 1;
        }
    }

    /// Batch variant used by the pre-warm job
    ///
    /// `true` only if every member requirement succeeded; partial failures
    /// are logged, not escalated.
    pub async fn ensure_batch(
        &self,
        batch: &[Requirement],
        max_attempts: usize,
    ) -> AppResult<bool> {
        tracing::info!(requirements = batch.len(), "Ensuring requirement batch");

        let mut all_met = true;
        for requirement in batch {
            if !self.ensure_requirement(requirement, max_attempts).await? {
                all_met = false;
            }
        }

        if all_met {
            tracing::info!("All requirement sets met");
        } else {
            tracing::warn!("One or more requirement sets unmet");
        }

        Ok(all_met)
    }
}
