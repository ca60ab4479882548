//! Mock provider: deterministic responses for testing without API keys.
//!
//! Keys off the sub-task label embedded in the system prompt and returns a
//! canned, schema-valid document for that section.

use crate::provider::{GenerationParams, GenerativeProvider};
use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub struct MockProvider {
    delay: Duration,
    /// Label of a sub-task that should fail while the rest succeed.
    failing: Option<String>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(10),
            failing: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider whose named sub-task always errors.
    pub fn failing_section(label: &str) -> Self {
        Self {
            failing: Some(label.to_string()),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GenerativeProvider for MockProvider {
    async fn generate(
        &self,
        system: &str,
        _input: &str,
        _params: GenerationParams,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let label = section_label(system).context("Mock provider received an unknown prompt")?;
        if self.failing.as_deref() == Some(label) {
            bail!("mock {label} sub-task failure");
        }
        Ok(canned_document(label).to_string())
    }
}

fn section_label(system: &str) -> Option<&'static str> {
    [
        "temporal",
        "spatial",
        "behavioral",
        "predictive",
        "insights",
        "comparative",
    ]
    .into_iter()
    .find(|label| system.contains(label))
}

fn canned_document(label: &str) -> Value {
    match label {
        "temporal" => json!({
            "evolution": "from weekend day trips toward longer stays abroad",
            "milestones": ["first trip abroad", "first repeat visit to the same city"],
            "cadence": "a trip most quarters, heavier in summer"
        }),
        "spatial" => json!({
            "reach": "regional with occasional continental hops",
            "clusters": ["coastal towns", "the home-city cafe belt"],
            "next_frontier": "the far north"
        }),
        "behavioral" => json!({
            "habits": ["weekend city breaks", "returning to the same cafe in every city"],
            "preferences": "quiet places over crowds",
            "travel_style": "slow and local"
        }),
        "predictive" => json!({
            "likely_destinations": ["Lisbon", "another coastal town within reach"],
            "horizon": "the next six months",
            "rationale": "follows the established coastal pattern"
        }),
        "insights" => json!({
            "highlights": ["rarely visits the same museum twice", "ratings climb with each return visit"],
            "summary": "a creature of happy habits who widens the circle slowly"
        }),
        "comparative" => json!({
            "archetype": "the unhurried explorer",
            "shared_traits": ["repeat visits", "preference for shoulder season"],
            "distinctions": ["rarely plans more than a month ahead"]
        }),
        other => json!({ "error": format!("no canned document for {other}") }),
    }
}
