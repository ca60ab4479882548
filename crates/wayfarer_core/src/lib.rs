pub mod config;
pub mod error;
pub mod record;

pub use config::WayfarerConfig;
pub use error::AnalysisError;
pub use record::{
    confidence_score, quality_score, AnalysisRecord, BehavioralAnalysis, PeerComparison,
    PredictiveAnalysis, SectionDocument, SpatialAnalysis, TemporalAnalysis, TravelInsights,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default cadence for automatic regeneration: once a day.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// A visit to a place, as supplied by the host application's history layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceVisit {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub category: String,
    pub visited_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub rating: Option<f32>,
}

/// Compact projection of a visit fed to the generation sub-tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitSummary {
    pub name: String,
    pub location: String,
    pub category: String,
    pub visited_at: DateTime<Utc>,
    /// `[latitude, longitude]` when both are known.
    pub coordinates: Option<[f64; 2]>,
    pub rating: Option<f32>,
}

impl VisitSummary {
    pub fn from_visit(visit: &PlaceVisit) -> Self {
        let coordinates = match (visit.latitude, visit.longitude) {
            (Some(lat), Some(lon)) => Some([lat, lon]),
            _ => None,
        };
        Self {
            name: visit.name.clone(),
            location: visit.location.clone(),
            category: visit.category.clone(),
            visited_at: visit.visited_at,
            coordinates,
            rating: visit.rating,
        }
    }
}

/// Quota sub-state stored inside the settings record.
///
/// `request_count` only counts requests made on `last_request_date`'s local
/// calendar day; a check on a later day implicitly sees a fresh budget
/// without anything being rewritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestLimits {
    pub request_count: u32,
    pub last_request_date: Option<DateTime<Utc>>,
    pub next_available_time: Option<DateTime<Utc>>,
}

/// Per-user persisted configuration row. Created with defaults on first
/// access; mutated in place by the quota limiter and on every commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsRecord {
    pub user_id: String,
    /// When the last analysis commit succeeded.
    pub last_updated_at: Option<DateTime<Utc>>,
    pub refresh_interval_secs: u64,
    pub request_limits: RequestLimits,
}

impl SettingsRecord {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            last_updated_at: None,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            request_limits: RequestLimits::default(),
        }
    }

    pub fn refresh_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_interval_secs as i64)
    }
}

/// Live state of an in-flight generation job, mirrored into durable storage
/// so a second device can poll it mid-flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub is_generating: bool,
    /// 0-100; monotonically non-decreasing while a job is live.
    pub progress: u8,
    /// Free-text stage label, not an enum; stage count may change.
    pub stage: String,
    pub estimated_secs_remaining: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Supplies the visit history consumed as generation input.
#[async_trait]
pub trait VisitSource: Send + Sync {
    async fn visits_for(&self, user_id: &str) -> anyhow::Result<Vec<PlaceVisit>>;
}

/// Supplies the current user identifier scoping every partition.
///
/// "No current user" makes every operation a no-op, never an error.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<String>;
}

/// Fixed identity, for embedding hosts that manage sessions themselves and
/// for tests.
pub struct StaticIdentity {
    user: Option<String>,
}

impl StaticIdentity {
    pub fn new(user_id: &str) -> Self {
        Self {
            user: Some(user_id.to_string()),
        }
    }

    pub fn signed_out() -> Self {
        Self { user: None }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<String> {
        self.user.clone()
    }
}
