//! Turns a visit history into one committed analysis record.
//!
//! The generation fans six independent sub-tasks out against the
//! generative provider and joins on all of them. One failed sub-task fails
//! the whole generation: nothing partial is ever committed and failed
//! attempts never consume quota.

use anyhow::{anyhow, Context, Result};
use chrono::{Local, Utc};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wayfarer_core::{
    confidence_score, quality_score, AnalysisError, AnalysisRecord, BehavioralAnalysis,
    PeerComparison, PlaceVisit, PredictiveAnalysis, SectionDocument, SpatialAnalysis,
    TemporalAnalysis, TravelInsights, VisitSummary, DEFAULT_REFRESH_INTERVAL_SECS,
};
use wayfarer_store::SettingsStore;

use crate::cache::TieredCache;
use crate::progress::ProgressTracker;
use crate::prompts::{self, SectionPrompt};
use crate::provider::{GenerationParams, GenerativeProvider};
use crate::quota::{self, QuotaLimiter};

#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub params: GenerationParams,
    /// Per sub-task call timeout; a timed-out sub-task fails the whole
    /// generation like any other sub-task error.
    pub section_timeout: Duration,
    /// Run the six sub-tasks concurrently. Turn off for providers that
    /// enforce their own concurrency limits.
    pub concurrent_sections: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            params: GenerationParams::default(),
            section_timeout: Duration::from_secs(90),
            concurrent_sections: true,
        }
    }
}

struct SectionSet {
    temporal: TemporalAnalysis,
    spatial: SpatialAnalysis,
    behavioral: BehavioralAnalysis,
    predictive: PredictiveAnalysis,
    insights: TravelInsights,
    comparative: PeerComparison,
}

pub struct GenerationOrchestrator {
    provider: Arc<dyn GenerativeProvider>,
    cache: Arc<TieredCache>,
    quota: Arc<QuotaLimiter>,
    progress: Arc<ProgressTracker>,
    settings: Arc<SettingsStore>,
    options: GenerationOptions,
}

impl GenerationOrchestrator {
    pub fn new(
        provider: Arc<dyn GenerativeProvider>,
        cache: Arc<TieredCache>,
        quota: Arc<QuotaLimiter>,
        progress: Arc<ProgressTracker>,
        settings: Arc<SettingsStore>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            provider,
            cache,
            quota,
            progress,
            settings,
            options,
        }
    }

    /// Generate and commit a new analysis record for the user.
    pub async fn generate(
        &self,
        user_id: &str,
        visits: &[PlaceVisit],
    ) -> Result<AnalysisRecord, AnalysisError> {
        // Both rejections happen before any side effect.
        let check = self.quota.check_limit(user_id).await;
        if !check.can_request {
            let next_available = check
                .next_available_time
                .unwrap_or_else(|| quota::start_of_next_local_day(Local::now()));
            return Err(AnalysisError::QuotaExceeded { next_available });
        }
        if visits.is_empty() {
            return Err(AnalysisError::EmptyHistory);
        }

        self.progress.begin(user_id, "preparing input", 5).await;
        let summaries = normalize_visits(visits);

        let sections = match self.run_sections(user_id, &summaries).await {
            Ok(sections) => sections,
            Err(e) => {
                self.progress.fail(user_id, "generation failed").await;
                return Err(AnalysisError::Provider(e));
            }
        };

        let record = self.assemble(user_id, &summaries, sections).await;

        self.progress.advance(user_id, "saving analysis", 95).await;
        if let Err(e) = self.cache.commit(&record).await {
            self.progress.fail(user_id, "generation failed").await;
            return Err(AnalysisError::Storage(e));
        }

        if let Err(e) = self.quota.record_request(user_id).await {
            // The record is already committed; losing one quota tick is the
            // permissive side of the limiter's failure contract.
            tracing::warn!("Failed to record quota consumption for {user_id}: {e:#}");
        }

        self.progress.complete(user_id).await;
        tracing::info!(
            "Committed analysis for {user_id} from {} visits (quality {})",
            record.based_on_places,
            record.analysis_quality
        );
        Ok(record)
    }

    async fn run_sections(&self, user_id: &str, visits: &[VisitSummary]) -> Result<SectionSet> {
        let input = prompts::render_input(visits)?;

        if self.options.concurrent_sections {
            self.progress
                .advance(user_id, "generating sections", 15)
                .await;
            let (temporal, spatial, behavioral, predictive, insights, comparative) = tokio::try_join!(
                self.section::<TemporalAnalysis>(&prompts::TEMPORAL, &input),
                self.section::<SpatialAnalysis>(&prompts::SPATIAL, &input),
                self.section::<BehavioralAnalysis>(&prompts::BEHAVIORAL, &input),
                self.section::<PredictiveAnalysis>(&prompts::PREDICTIVE, &input),
                self.section::<TravelInsights>(&prompts::INSIGHTS, &input),
                self.section::<PeerComparison>(&prompts::COMPARATIVE, &input),
            )?;
            self.progress
                .advance(user_id, "aggregating results", 90)
                .await;
            Ok(SectionSet {
                temporal,
                spatial,
                behavioral,
                predictive,
                insights,
                comparative,
            })
        } else {
            // Serial fallback; progress marks each sub-task boundary.
            let temporal = self
                .section::<TemporalAnalysis>(&prompts::TEMPORAL, &input)
                .await?;
            self.progress
                .advance(user_id, "charting your travel timeline", 15)
                .await;
            let spatial = self
                .section::<SpatialAnalysis>(&prompts::SPATIAL, &input)
                .await?;
            self.progress
                .advance(user_id, "mapping your geographic reach", 30)
                .await;
            let behavioral = self
                .section::<BehavioralAnalysis>(&prompts::BEHAVIORAL, &input)
                .await?;
            self.progress
                .advance(user_id, "reading your travel habits", 45)
                .await;
            let predictive = self
                .section::<PredictiveAnalysis>(&prompts::PREDICTIVE, &input)
                .await?;
            self.progress
                .advance(user_id, "projecting future trips", 60)
                .await;
            let insights = self
                .section::<TravelInsights>(&prompts::INSIGHTS, &input)
                .await?;
            self.progress
                .advance(user_id, "distilling what stands out", 75)
                .await;
            let comparative = self
                .section::<PeerComparison>(&prompts::COMPARATIVE, &input)
                .await?;
            self.progress
                .advance(user_id, "comparing against traveler archetypes", 90)
                .await;
            Ok(SectionSet {
                temporal,
                spatial,
                behavioral,
                predictive,
                insights,
                comparative,
            })
        }
    }

    /// One sub-task call: prompt, bounded wait, parse, validate.
    async fn section<T>(&self, prompt: &SectionPrompt, input: &str) -> Result<T>
    where
        T: DeserializeOwned + SectionDocument,
    {
        let reply = tokio::time::timeout(
            self.options.section_timeout,
            self.provider
                .generate(prompt.system, input, self.options.params.clone()),
        )
        .await
        .map_err(|_| {
            anyhow!(
                "{} sub-task timed out after {:?}",
                prompt.label,
                self.options.section_timeout
            )
        })?
        .with_context(|| format!("{} sub-task failed", prompt.label))?;

        let doc: T = prompts::parse_document(&reply)
            .with_context(|| format!("{} sub-task returned a malformed document", prompt.label))?;
        doc.ensure_complete()
            .with_context(|| format!("{} sub-task document is incomplete", prompt.label))?;
        Ok(doc)
    }

    async fn assemble(
        &self,
        user_id: &str,
        summaries: &[VisitSummary],
        sections: SectionSet,
    ) -> AnalysisRecord {
        let refresh_interval = match self.settings.load(user_id).await {
            Ok(settings) => settings.refresh_interval(),
            Err(e) => {
                tracing::warn!("Falling back to default refresh interval for {user_id}: {e:#}");
                chrono::Duration::seconds(DEFAULT_REFRESH_INTERVAL_SECS as i64)
            }
        };

        let now = Utc::now();
        let quality = quality_score(summaries);
        AnalysisRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
            last_refreshed_at: now,
            next_refresh_due: now + refresh_interval,
            temporal: sections.temporal,
            spatial: sections.spatial,
            behavioral: sections.behavioral,
            predictive: sections.predictive,
            insights: sections.insights,
            comparative: sections.comparative,
            based_on_places: summaries.len() as u32,
            analysis_quality: quality,
            confidence_score: confidence_score(quality),
            is_generating: false,
        }
    }
}

/// Project visits into the compact prompt shape, sorted chronologically.
/// The chronological ordering is a precondition for the sub-task that
/// reasons about progression over time.
pub fn normalize_visits(visits: &[PlaceVisit]) -> Vec<VisitSummary> {
    let mut summaries: Vec<VisitSummary> = visits.iter().map(VisitSummary::from_visit).collect();
    summaries.sort_by_key(|v| v.visited_at);
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn visit_at(year: i32, month: u32) -> PlaceVisit {
        PlaceVisit {
            id: Uuid::new_v4(),
            name: format!("place-{year}-{month}"),
            location: "somewhere".to_string(),
            category: "cafe".to_string(),
            visited_at: Utc.with_ymd_and_hms(year, month, 1, 9, 0, 0).unwrap(),
            latitude: None,
            longitude: None,
            rating: None,
        }
    }

    #[test]
    fn test_normalize_sorts_chronologically() {
        let visits = vec![visit_at(2025, 6), visit_at(2023, 1), visit_at(2024, 3)];
        let summaries = normalize_visits(&visits);
        assert_eq!(summaries[0].name, "place-2023-1");
        assert_eq!(summaries[1].name, "place-2024-3");
        assert_eq!(summaries[2].name, "place-2025-6");
    }

    #[test]
    fn test_normalize_preserves_every_visit() {
        let visits = vec![visit_at(2025, 6), visit_at(2025, 6)];
        assert_eq!(normalize_visits(&visits).len(), 2);
    }
}
