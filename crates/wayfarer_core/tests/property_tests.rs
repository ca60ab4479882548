//! Property-based tests for wayfarer_core.
//!
//! Uses proptest to verify invariants that must hold for ALL possible
//! inputs, not just hand-picked examples.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use wayfarer_core::{confidence_score, quality_score, VisitSummary};

// ============================================================================
// Strategies: generate arbitrary but valid visit histories
// ============================================================================

fn arb_visit() -> impl Strategy<Value = VisitSummary> {
    (
        2015i32..=2026,
        1u32..=12,
        1u32..=28,
        prop::sample::select(vec![
            "cafe",
            "museum",
            "park",
            "restaurant",
            "beach",
            "market",
            "gallery",
            "trail",
        ]),
        proptest::option::of(1.0f32..=5.0),
    )
        .prop_map(|(year, month, day, category, rating)| VisitSummary {
            name: format!("place-{year}-{month}-{day}"),
            location: "somewhere".to_string(),
            category: category.to_string(),
            visited_at: Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap(),
            coordinates: None,
            rating,
        })
}

fn arb_history() -> impl Strategy<Value = Vec<VisitSummary>> {
    prop::collection::vec(arb_visit(), 0..60)
}

// ============================================================================
// Invariants
// ============================================================================

proptest! {
    /// Quality is always within [0, 100].
    #[test]
    fn quality_in_range(visits in arb_history()) {
        let q = quality_score(&visits);
        prop_assert!(q <= 100);
    }

    /// Confidence never drops below the 50 floor and never below quality.
    #[test]
    fn confidence_floor_holds(visits in arb_history()) {
        let q = quality_score(&visits);
        let c = confidence_score(q);
        prop_assert!(c >= 50);
        prop_assert!(c >= q);
        prop_assert!(c <= 100);
    }

    /// Adding a visit never lowers the quality score: every factor
    /// (volume, years, categories) is non-decreasing under insertion.
    #[test]
    fn quality_monotone_under_insertion(visits in arb_history(), extra in arb_visit()) {
        let before = quality_score(&visits);
        let mut grown = visits.clone();
        grown.push(extra);
        prop_assert!(quality_score(&grown) >= before);
    }

    /// An empty history always scores the base 20.
    #[test]
    fn empty_history_scores_base(_n in 0..10u8) {
        prop_assert_eq!(quality_score(&[]), 20);
    }
}
