//! The travel analysis record and its six typed sections.
//!
//! Sections arrive from the generative provider as JSON documents. They are
//! deserialized into the types below and checked with `ensure_complete()`
//! right at the provider boundary, so a missing or malformed field becomes
//! a provider failure instead of an optional value leaking deeper in.

use anyhow::{bail, Result};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::VisitSummary;

/// One committed travel analysis. Immutable once committed: a regeneration
/// produces a new record, the remote history is append-only, and reads serve
/// the most recent record by creation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_refreshed_at: DateTime<Utc>,
    pub next_refresh_due: DateTime<Utc>,

    pub temporal: TemporalAnalysis,
    pub spatial: SpatialAnalysis,
    pub behavioral: BehavioralAnalysis,
    pub predictive: PredictiveAnalysis,
    pub insights: TravelInsights,
    pub comparative: PeerComparison,

    /// How many visit records the generation consumed.
    pub based_on_places: u32,
    /// 0-100 heuristic, see `quality_score`.
    pub analysis_quality: u8,
    /// 0-100, floor-bounded at 50 for committed records.
    pub confidence_score: u8,

    /// Set only on the transient record returned while a generation is in
    /// flight; never true on a committed record.
    #[serde(default)]
    pub is_generating: bool,
}

impl AnalysisRecord {
    /// Transient stand-in returned to readers while a generation is in
    /// flight: flagged, zeroed sections, zero scores. Never persisted.
    pub fn placeholder(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
            last_refreshed_at: now,
            next_refresh_due: now,
            temporal: TemporalAnalysis::default(),
            spatial: SpatialAnalysis::default(),
            behavioral: BehavioralAnalysis::default(),
            predictive: PredictiveAnalysis::default(),
            insights: TravelInsights::default(),
            comparative: PeerComparison::default(),
            based_on_places: 0,
            analysis_quality: 0,
            confidence_score: 0,
            is_generating: true,
        }
    }
}

/// A section document produced by one generation sub-task.
pub trait SectionDocument {
    /// Short label used in prompts, stage names and error messages.
    const LABEL: &'static str;

    /// Reject documents the provider returned with required fields missing.
    fn ensure_complete(&self) -> Result<()>;
}

/// How the traveler's habits evolved over time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemporalAnalysis {
    pub evolution: String,
    pub milestones: Vec<String>,
    pub cadence: String,
}

impl SectionDocument for TemporalAnalysis {
    const LABEL: &'static str = "temporal";

    fn ensure_complete(&self) -> Result<()> {
        if self.evolution.trim().is_empty() {
            bail!("temporal document is missing `evolution`");
        }
        if self.milestones.is_empty() {
            bail!("temporal document has no milestones");
        }
        Ok(())
    }
}

/// Geographic footprint and where it is heading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpatialAnalysis {
    pub reach: String,
    pub clusters: Vec<String>,
    pub next_frontier: String,
}

impl SectionDocument for SpatialAnalysis {
    const LABEL: &'static str = "spatial";

    fn ensure_complete(&self) -> Result<()> {
        if self.reach.trim().is_empty() {
            bail!("spatial document is missing `reach`");
        }
        Ok(())
    }
}

/// Recurring habits and stated-or-revealed preferences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehavioralAnalysis {
    pub habits: Vec<String>,
    pub preferences: String,
    pub travel_style: String,
}

impl SectionDocument for BehavioralAnalysis {
    const LABEL: &'static str = "behavioral";

    fn ensure_complete(&self) -> Result<()> {
        if self.habits.is_empty() {
            bail!("behavioral document has no habits");
        }
        if self.travel_style.trim().is_empty() {
            bail!("behavioral document is missing `travel_style`");
        }
        Ok(())
    }
}

/// Where the traveler is likely to go next, and why.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictiveAnalysis {
    pub likely_destinations: Vec<String>,
    pub horizon: String,
    pub rationale: String,
}

impl SectionDocument for PredictiveAnalysis {
    const LABEL: &'static str = "predictive";

    fn ensure_complete(&self) -> Result<()> {
        if self.likely_destinations.is_empty() {
            bail!("predictive document has no destinations");
        }
        Ok(())
    }
}

/// Cross-sectional observations that cut across the other sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TravelInsights {
    pub highlights: Vec<String>,
    pub summary: String,
}

impl SectionDocument for TravelInsights {
    const LABEL: &'static str = "insights";

    fn ensure_complete(&self) -> Result<()> {
        if self.highlights.is_empty() {
            bail!("insights document has no highlights");
        }
        if self.summary.trim().is_empty() {
            bail!("insights document is missing `summary`");
        }
        Ok(())
    }
}

/// Comparison against peer traveler archetypes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerComparison {
    pub archetype: String,
    pub shared_traits: Vec<String>,
    pub distinctions: Vec<String>,
}

impl SectionDocument for PeerComparison {
    const LABEL: &'static str = "comparative";

    fn ensure_complete(&self) -> Result<()> {
        if self.archetype.trim().is_empty() {
            bail!("comparative document is missing `archetype`");
        }
        Ok(())
    }
}

/// Heuristic quality of an analysis given its input. Rewards volume,
/// temporal spread and categorical diversity, each capped so no single
/// dimension dominates.
pub fn quality_score(visits: &[VisitSummary]) -> u8 {
    let count = visits.len() as u32;
    let years: HashSet<i32> = visits.iter().map(|v| v.visited_at.year()).collect();
    let categories: HashSet<String> = visits
        .iter()
        .map(|v| v.category.trim().to_lowercase())
        .collect();

    let score = 20
        + (2 * count).min(40)
        + (5 * years.len() as u32).min(20)
        + (2 * categories.len() as u32).min(20);
    score.clamp(0, 100) as u8
}

/// Confidence is floor-bounded at 50: a fixed product floor, not a value
/// derived from the inputs.
pub fn confidence_score(quality: u8) -> u8 {
    quality.max(50)
}
