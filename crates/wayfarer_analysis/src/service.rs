//! Process-level facade wiring the subsystem together.
//!
//! Constructed once at startup from config, stores and a provider; every
//! component hangs off this instance, so there are no ambient globals and
//! concurrent multi-user testing stays straightforward. Presentation code
//! talks to this type only.
//!
//! Every operation is scoped by the identity provider; with no signed-in
//! user each one is a no-op, never an error.

use std::sync::Arc;
use std::time::Duration;
use wayfarer_core::{
    AnalysisError, AnalysisRecord, IdentityProvider, ProgressSnapshot, VisitSource, WayfarerConfig,
};
use wayfarer_store::{LocalStore, RemoteStore, SettingsStore};

use crate::cache::TieredCache;
use crate::orchestrator::{GenerationOptions, GenerationOrchestrator};
use crate::progress::ProgressTracker;
use crate::provider::{GenerationParams, GenerativeProvider};
use crate::quota::{LimitCheck, QuotaLimiter};
use crate::scheduler::{RefreshOutcome, RefreshScheduler};

pub struct TravelAnalysisService {
    identity: Arc<dyn IdentityProvider>,
    visits: Arc<dyn VisitSource>,
    cache: Arc<TieredCache>,
    orchestrator: Arc<GenerationOrchestrator>,
    scheduler: Arc<RefreshScheduler>,
    progress: Arc<ProgressTracker>,
    quota: Arc<QuotaLimiter>,
}

impl TravelAnalysisService {
    pub fn new(
        config: &WayfarerConfig,
        identity: Arc<dyn IdentityProvider>,
        visits: Arc<dyn VisitSource>,
        provider: Arc<dyn GenerativeProvider>,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        let settings = Arc::new(SettingsStore::new(Arc::clone(&remote), Arc::clone(&local)));
        let progress = Arc::new(ProgressTracker::new(Arc::clone(&local), Arc::clone(&remote)));
        let cache = Arc::new(TieredCache::with_default_tiers(
            Duration::from_secs(config.cache.memory_ttl_secs),
            Arc::clone(&local),
            Arc::clone(&remote),
            Arc::clone(&settings),
            Arc::clone(&progress),
        ));
        let quota = Arc::new(QuotaLimiter::new(
            Arc::clone(&settings),
            config.quota.daily_limit,
        ));
        let orchestrator = Arc::new(GenerationOrchestrator::new(
            provider,
            Arc::clone(&cache),
            Arc::clone(&quota),
            Arc::clone(&progress),
            Arc::clone(&settings),
            GenerationOptions {
                params: GenerationParams {
                    max_tokens: config.provider.max_tokens,
                    temperature: config.provider.temperature,
                },
                section_timeout: Duration::from_secs(config.generation.section_timeout_secs),
                concurrent_sections: config.generation.concurrent_sections,
            },
        ));
        let scheduler = Arc::new(RefreshScheduler::new(
            Arc::clone(&local),
            Arc::clone(&settings),
            Arc::clone(&quota),
            Arc::clone(&cache),
            Arc::clone(&orchestrator),
            Arc::clone(&visits),
            chrono::Duration::seconds(config.refresh.check_interval_secs as i64),
        ));

        Self {
            identity,
            visits,
            cache,
            orchestrator,
            scheduler,
            progress,
            quota,
        }
    }

    /// The current analysis, if any. `force_refresh` drops the local cache
    /// tiers first.
    pub async fn current_analysis(
        &self,
        force_refresh: bool,
    ) -> Result<Option<AnalysisRecord>, AnalysisError> {
        let Some(user_id) = self.identity.current_user() else {
            return Ok(None);
        };
        self.cache
            .get(&user_id, force_refresh)
            .await
            .map_err(AnalysisError::Storage)
    }

    /// Regenerate now, consuming one quota slot on success.
    pub async fn regenerate(&self) -> Result<Option<AnalysisRecord>, AnalysisError> {
        let Some(user_id) = self.identity.current_user() else {
            return Ok(None);
        };
        let visits = self
            .visits
            .visits_for(&user_id)
            .await
            .map_err(AnalysisError::Storage)?;
        self.orchestrator.generate(&user_id, &visits).await.map(Some)
    }

    /// Live progress of this process's in-flight job, if one exists.
    pub async fn progress(&self) -> Option<ProgressSnapshot> {
        let user_id = self.identity.current_user()?;
        self.progress.snapshot(&user_id).await
    }

    /// Durable progress mirror; lets this device poll a job another device
    /// started.
    pub async fn observe_progress(&self) -> Result<Option<ProgressSnapshot>, AnalysisError> {
        let Some(user_id) = self.identity.current_user() else {
            return Ok(None);
        };
        self.progress
            .observe(&user_id)
            .await
            .map_err(AnalysisError::Storage)
    }

    /// How much of the daily budget is left.
    pub async fn limit_status(&self) -> Option<LimitCheck> {
        let user_id = self.identity.current_user()?;
        Some(self.quota.check_limit(&user_id).await)
    }

    /// Opportunistic freshness check; cheap to call from any screen load.
    pub async fn poll_refresh(&self) -> RefreshOutcome {
        let Some(user_id) = self.identity.current_user() else {
            return RefreshOutcome::Skipped("no signed-in user");
        };
        self.scheduler.maybe_refresh(&user_id).await
    }

    /// Fire the freshness check without blocking the caller.
    pub fn poll_refresh_detached(&self) {
        if let Some(user_id) = self.identity.current_user() {
            self.scheduler.maybe_refresh_detached(&user_id);
        }
    }
}
