//! Daily regeneration budget with a lazy local-day reset.
//!
//! The reset is a pure function of "now" compared against the stored day;
//! nothing rolls the counter over in the background. A check on a new
//! calendar day simply sees a fresh budget; the stored counter is only
//! rewritten when the next request is recorded.

use chrono::{DateTime, Datelike, Duration, Local, LocalResult, TimeZone, Utc};
use std::sync::Arc;
use wayfarer_core::RequestLimits;
use wayfarer_store::SettingsStore;

/// Result of a limit check.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitCheck {
    pub can_request: bool,
    pub requests_remaining: u32,
    pub next_available_time: Option<DateTime<Utc>>,
}

pub struct QuotaLimiter {
    settings: Arc<SettingsStore>,
    daily_budget: u32,
}

impl QuotaLimiter {
    pub fn new(settings: Arc<SettingsStore>, daily_budget: u32) -> Self {
        Self {
            settings,
            daily_budget,
        }
    }

    /// Whether the user may trigger a regeneration right now.
    ///
    /// A storage failure degrades to permissive: a transient outage gates
    /// nothing, so the operator-visible choice is to over-permit rather
    /// than brick the feature. Limiter failures never block cached reads.
    pub async fn check_limit(&self, user_id: &str) -> LimitCheck {
        match self.settings.load(user_id).await {
            Ok(record) => evaluate(&record.request_limits, self.daily_budget, Local::now()),
            Err(e) => {
                tracing::warn!("Quota check failed for {user_id}, allowing request: {e:#}");
                LimitCheck {
                    can_request: true,
                    requests_remaining: self.daily_budget,
                    next_available_time: None,
                }
            }
        }
    }

    /// Record one accepted regeneration. Called only after a successful
    /// generation; failed attempts never consume budget.
    pub async fn record_request(&self, user_id: &str) -> anyhow::Result<()> {
        let record = self.settings.load(user_id).await?;
        let mut limits = record.request_limits.clone();
        apply_request(&mut limits, self.daily_budget, Local::now());
        self.settings.update_limits(user_id, limits).await
    }
}

/// Evaluate the limits against the budget without mutating anything.
pub fn evaluate(limits: &RequestLimits, budget: u32, now: DateTime<Local>) -> LimitCheck {
    let used = match limits.last_request_date {
        // A different calendar day means a fresh budget (lazy reset).
        Some(last) if same_local_day(last.with_timezone(&Local), now) => limits.request_count,
        _ => 0,
    };
    let remaining = budget.saturating_sub(used);

    if remaining > 0 {
        LimitCheck {
            can_request: true,
            requests_remaining: remaining,
            next_available_time: None,
        }
    } else {
        let next = limits
            .next_available_time
            .unwrap_or_else(|| start_of_next_local_day(now));
        LimitCheck {
            can_request: false,
            requests_remaining: 0,
            next_available_time: Some(next),
        }
    }
}

/// Apply one accepted request to the limits in place.
pub fn apply_request(limits: &mut RequestLimits, budget: u32, now: DateTime<Local>) {
    let same_day = limits
        .last_request_date
        .map(|last| same_local_day(last.with_timezone(&Local), now))
        .unwrap_or(false);

    if same_day {
        limits.request_count += 1;
    } else {
        limits.request_count = 1;
        limits.next_available_time = None;
    }
    limits.last_request_date = Some(now.with_timezone(&Utc));

    if limits.request_count >= budget {
        limits.next_available_time = Some(start_of_next_local_day(now));
    }
}

fn same_local_day(a: DateTime<Local>, b: DateTime<Local>) -> bool {
    a.year() == b.year() && a.month() == b.month() && a.day() == b.day()
}

/// Midnight at the start of the following local day, in UTC.
pub fn start_of_next_local_day(now: DateTime<Local>) -> DateTime<Utc> {
    let fallback = || (now + Duration::hours(24)).with_timezone(&Utc);
    let Some(next) = now.date_naive().succ_opt() else {
        return fallback();
    };
    let Some(midnight) = next.and_hms_opt(0, 0, 0) else {
        return fallback();
    };
    match Local.from_local_datetime(&midnight) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        LocalResult::None => fallback(),
    }
}
