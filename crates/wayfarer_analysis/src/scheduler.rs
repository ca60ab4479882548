//! Opportunistic refresh of the cached analysis.
//!
//! The scheduler owns no timer. Callers poke it alongside unrelated work
//! (a screen load, a sync pass); a persisted last-check timestamp debounces
//! the poke, so the check's own cost stays bounded no matter how often it
//! is invoked. Errors are logged and swallowed; an automatic refresh must
//! never surface an error to a caller who did not ask for one.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use wayfarer_core::{VisitSource, DEFAULT_REFRESH_INTERVAL_SECS};
use wayfarer_store::{LocalStore, SettingsStore};

use crate::cache::TieredCache;
use crate::orchestrator::GenerationOrchestrator;
use crate::quota::QuotaLimiter;

/// What a refresh check did. Failures are reported here, never raised.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Skipped(&'static str),
    Refreshed,
    Failed(String),
}

pub struct RefreshScheduler {
    local: Arc<dyn LocalStore>,
    settings: Arc<SettingsStore>,
    quota: Arc<QuotaLimiter>,
    cache: Arc<TieredCache>,
    orchestrator: Arc<GenerationOrchestrator>,
    visits: Arc<dyn VisitSource>,
    check_interval: Duration,
}

fn debounce_key(user_id: &str) -> String {
    format!("refresh_check:{user_id}")
}

impl RefreshScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local: Arc<dyn LocalStore>,
        settings: Arc<SettingsStore>,
        quota: Arc<QuotaLimiter>,
        cache: Arc<TieredCache>,
        orchestrator: Arc<GenerationOrchestrator>,
        visits: Arc<dyn VisitSource>,
        check_interval: Duration,
    ) -> Self {
        Self {
            local,
            settings,
            quota,
            cache,
            orchestrator,
            visits,
            check_interval,
        }
    }

    /// Run one refresh check for the user.
    pub async fn maybe_refresh(&self, user_id: &str) -> RefreshOutcome {
        if let Some(last) = self.last_check(user_id).await {
            if Utc::now() - last < self.check_interval {
                return RefreshOutcome::Skipped("checked recently");
            }
        }
        self.stamp_check(user_id).await;

        let current = match self.cache.get(user_id, false).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Background refresh could not read the cache for {user_id}: {e:#}");
                return RefreshOutcome::Failed(format!("{e:#}"));
            }
        };

        if let Some(record) = &current {
            if record.is_generating {
                return RefreshOutcome::Skipped("generation already in flight");
            }
            let interval = match self.settings.load(user_id).await {
                Ok(settings) => settings.refresh_interval(),
                Err(_) => Duration::seconds(DEFAULT_REFRESH_INTERVAL_SECS as i64),
            };
            if Utc::now() - record.updated_at <= interval {
                return RefreshOutcome::Skipped("analysis still fresh");
            }
        }

        let visits = match self.visits.visits_for(user_id).await {
            Ok(visits) => visits,
            Err(e) => {
                tracing::warn!("Background refresh could not load visits for {user_id}: {e:#}");
                return RefreshOutcome::Failed(format!("{e:#}"));
            }
        };
        if visits.is_empty() {
            tracing::info!("Skipping automatic refresh for {user_id}: visit history is empty");
            return RefreshOutcome::Skipped("no visit history");
        }

        let check = self.quota.check_limit(user_id).await;
        if !check.can_request {
            return RefreshOutcome::Skipped("daily limit reached");
        }

        match self.orchestrator.generate(user_id, &visits).await {
            Ok(_) => {
                tracing::info!("Automatic refresh committed a new analysis for {user_id}");
                RefreshOutcome::Refreshed
            }
            Err(e) => {
                tracing::warn!("Automatic refresh failed for {user_id}: {e}");
                RefreshOutcome::Failed(e.to_string())
            }
        }
    }

    /// Fire the check without blocking the caller.
    pub fn maybe_refresh_detached(self: &Arc<Self>, user_id: &str) {
        let scheduler = Arc::clone(self);
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            let _ = scheduler.maybe_refresh(&user_id).await;
        });
    }

    async fn last_check(&self, user_id: &str) -> Option<DateTime<Utc>> {
        let raw = self.local.get(&debounce_key(user_id)).await.ok().flatten()?;
        DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    async fn stamp_check(&self, user_id: &str) {
        if let Err(e) = self
            .local
            .set(&debounce_key(user_id), &Utc::now().to_rfc3339())
            .await
        {
            tracing::warn!("Failed to persist refresh check time for {user_id}: {e:#}");
        }
    }
}
