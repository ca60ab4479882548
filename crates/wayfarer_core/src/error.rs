//! Error taxonomy for the analysis subsystem.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by the orchestrator's interactive operations.
///
/// The background scheduler never raises these to its poller; it logs and
/// reports an outcome instead. A failed attempt never clobbers a previously
/// committed record.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The daily regeneration budget is spent. Carries when the next window
    /// opens so the caller can render a retry affordance. Never retried
    /// automatically.
    #[error("daily generation limit reached, next attempt available at {next_available}")]
    QuotaExceeded { next_available: DateTime<Utc> },

    /// Rejected before any side effect.
    #[error("visit history is empty, there is nothing to analyze")]
    EmptyHistory,

    /// A sub-task call failed, timed out, or returned a malformed document.
    /// The whole generation aborts; nothing partial is committed and no
    /// quota is consumed.
    #[error("generation provider failed: {0:#}")]
    Provider(anyhow::Error),

    /// The system of record rejected a read or the commit.
    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_error_messages_are_descriptive() {
        let err = AnalysisError::EmptyHistory;
        assert!(err.to_string().contains("empty"));

        let err = AnalysisError::Provider(anyhow!("spatial sub-task timed out"));
        assert!(err.to_string().contains("spatial"));
    }

    #[test]
    fn test_quota_error_carries_next_window() {
        let next_available = Utc::now() + chrono::Duration::hours(3);
        let err = AnalysisError::QuotaExceeded { next_available };
        match err {
            AnalysisError::QuotaExceeded { next_available: at } => {
                assert!(at > Utc::now());
            }
            _ => panic!("expected QuotaExceeded"),
        }
    }
}
