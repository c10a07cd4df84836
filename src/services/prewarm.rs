use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::PreferenceSource;
use crate::error::AppResult;
use crate::models::Requirement;
use crate::services::satisfier::RequirementSatisfier;

/// What to do with a requirement that keeps failing run after run
///
/// A provider absent from the source entirely makes a requirement
/// unsatisfiable forever; left alone it recurs as a partial failure on every
/// schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmetPolicy {
    /// Retry the requirement on every run
    AlwaysRetry,
    /// Stop attempting a requirement after this many consecutive failed runs
    SuppressAfter(u32),
}

impl UnmetPolicy {
    pub fn from_threshold(threshold: u32) -> Self {
        if threshold == 0 {
            UnmetPolicy::AlwaysRetry
        } else {
            UnmetPolicy::SuppressAfter(threshold)
        }
    }
}

/// Consecutive-failure bookkeeping per user, reset on success
#[derive(Default)]
struct FailureTracker {
    counts: HashMap<i64, u32>,
}

impl FailureTracker {
    fn suppressed(&self, policy: UnmetPolicy, user_id: i64) -> bool {
        match policy {
            UnmetPolicy::AlwaysRetry => false,
            UnmetPolicy::SuppressAfter(threshold) => {
                self.counts.get(&user_id).copied().unwrap_or(0) >= threshold
            }
        }
    }

    fn record(&mut self, policy: UnmetPolicy, user_id: i64, met: bool) {
        if met {
            self.counts.remove(&user_id);
            return;
        }

        let count = self.counts.entry(user_id).or_insert(0);
        *count += 1;

        if let UnmetPolicy::SuppressAfter(threshold) = policy {
            if *count == threshold {
                tracing::warn!(
                    user_id,
                    consecutive_failures = *count,
                    "Suppressing requirement for the rest of this process lifetime"
                );
            }
        }
    }
}

/// Periodic batch job that pre-warms the cache for all known users
///
/// Each run rebuilds the requirement batch from the preference store (one
/// member per user with ratings) against the configured provider list, then
/// drives the satisfier. Partial success is tolerated indefinitely; the next
/// scheduled run simply tries again.
pub struct PrewarmJob {
    satisfier: RequirementSatisfier,
    preferences: Arc<dyn PreferenceSource>,
    required_providers: Vec<String>,
    max_attempts: usize,
    policy: UnmetPolicy,
    failures: FailureTracker,
}

impl PrewarmJob {
    pub fn new(
        satisfier: RequirementSatisfier,
        preferences: Arc<dyn PreferenceSource>,
        config: &Config,
    ) -> Self {
        Self {
            satisfier,
            preferences,
            required_providers: config.required_providers.clone(),
            max_attempts: config.prewarm_max_attempts,
            policy: UnmetPolicy::from_threshold(config.prewarm_failure_threshold),
            failures: FailureTracker::default(),
        }
    }

    /// One pre-warm pass over every user's requirement
    ///
    /// Returns `true` only if every attempted requirement was satisfied.
    pub async fn run_once(&mut self) -> AppResult<bool> {
        let by_user = self.preferences.exclusions_by_user().await?;

        tracing::info!(users = by_user.len(), "Starting pre-warm run");

        let mut all_met = true;
        for (user_id, exclude) in by_user {
            if self.failures.suppressed(self.policy, user_id) {
                tracing::debug!(user_id, "Requirement suppressed, skipping");
                continue;
            }

            let requirement = Requirement {
                user_id,
                exclude,
                providers: self.required_providers.clone(),
            };

            let met = self
                .satisfier
                .ensure_requirement(&requirement, self.max_attempts)
                .await?;

            self.failures.record(self.policy, user_id, met);
            if !met {
                all_met = false;
            }
        }

        if all_met {
            tracing::info!("Pre-warm run satisfied every requirement");
        } else {
            tracing::warn!("Pre-warm run left requirements unmet");
        }

        Ok(all_met)
    }

    /// Runs forever on a fixed schedule; errors are logged, never fatal
    pub async fn run(mut self, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!("Pre-warm run partially failed, will retry on next schedule");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Pre-warm run failed, will retry on next schedule");
                }
            }
        }
    }
}
