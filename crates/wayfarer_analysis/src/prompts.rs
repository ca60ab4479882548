//! Prompt templates and document parsing for the six analysis sub-tasks.
//!
//! Each sub-task sends one system prompt plus the normalized visit payload
//! and expects a single JSON document back. Responses are parsed leniently
//! (models love fencing their JSON), but a document that still fails to
//! parse or validate aborts the whole generation. A record with missing
//! sections must never be committed.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use wayfarer_core::VisitSummary;

/// A sub-task prompt: its short label plus the full system prompt text.
pub struct SectionPrompt {
    pub label: &'static str,
    pub system: &'static str,
}

pub const TEMPORAL: SectionPrompt = SectionPrompt {
    label: "temporal",
    system: r#"You are the temporal analysis sub-task of a travel app. You receive a traveler's visit history as JSON, sorted chronologically, and you describe how their travel life has developed over time.

Reply with a single JSON object and nothing else:
{"evolution": "how their travel has changed from the earliest visits to the latest", "milestones": ["notable firsts and turning points, in order"], "cadence": "how often they travel and any seasonal rhythm"}"#,
};

pub const SPATIAL: SectionPrompt = SectionPrompt {
    label: "spatial",
    system: r#"You are the spatial analysis sub-task of a travel app. You receive a traveler's visit history as JSON and you describe their geographic footprint.

Reply with a single JSON object and nothing else:
{"reach": "how far their travel extends (neighborhood, regional, continental, global)", "clusters": ["areas they return to repeatedly"], "next_frontier": "the nearest unexplored area implied by their pattern"}"#,
};

pub const BEHAVIORAL: SectionPrompt = SectionPrompt {
    label: "behavioral",
    system: r#"You are the behavioral analysis sub-task of a travel app. You receive a traveler's visit history as JSON and you describe their recurring habits and revealed preferences.

Reply with a single JSON object and nothing else:
{"habits": ["concrete recurring behaviors seen in the visits"], "preferences": "what kinds of places they favor and avoid", "travel_style": "a short characterization of how they travel"}"#,
};

pub const PREDICTIVE: SectionPrompt = SectionPrompt {
    label: "predictive",
    system: r#"You are the predictive sub-task of a travel app. You receive a traveler's visit history as JSON and you project where they are likely to go next.

Reply with a single JSON object and nothing else:
{"likely_destinations": ["specific places or kinds of places they are likely to visit"], "horizon": "the period the projection covers", "rationale": "which observed patterns the projection follows"}"#,
};

pub const INSIGHTS: SectionPrompt = SectionPrompt {
    label: "insights",
    system: r#"You are the insights sub-task of a travel app. You receive a traveler's visit history as JSON and you surface cross-cutting observations the traveler may not have noticed themselves.

Reply with a single JSON object and nothing else:
{"highlights": ["surprising or distinctive observations"], "summary": "one paragraph tying the observations together"}"#,
};

pub const COMPARATIVE: SectionPrompt = SectionPrompt {
    label: "comparative",
    system: r#"You are the comparative sub-task of a travel app. You receive a traveler's visit history as JSON and you place them against common traveler archetypes.

Reply with a single JSON object and nothing else:
{"archetype": "the archetype they most resemble", "shared_traits": ["what they have in common with that archetype"], "distinctions": ["where they diverge from it"]}"#,
};

/// Serialize the normalized visit history as the user payload.
pub fn render_input(visits: &[VisitSummary]) -> Result<String> {
    serde_json::to_string_pretty(&serde_json::json!({ "visits": visits }))
        .context("Failed to serialize visit history")
}

/// Parse a provider reply into a typed section document.
///
/// Tries the raw text first, then the outermost braced span (which also
/// strips markdown fences). Failure is an error, not an empty fallback.
pub fn parse_document<T: DeserializeOwned>(text: &str) -> Result<T> {
    let trimmed = text.trim();

    if let Ok(doc) = serde_json::from_str::<T>(trimmed) {
        return Ok(doc);
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(doc) = serde_json::from_str::<T>(&trimmed[start..=end]) {
                return Ok(doc);
            }
        }
    }

    bail!(
        "reply did not contain a parseable JSON document: {}",
        trimmed.chars().take(120).collect::<String>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wayfarer_core::TemporalAnalysis;

    #[test]
    fn test_parse_clean_json() {
        let json = r#"{"evolution": "day trips to long hauls", "milestones": ["first flight"], "cadence": "quarterly"}"#;
        let doc: TemporalAnalysis = parse_document(json).unwrap();
        assert_eq!(doc.cadence, "quarterly");
    }

    #[test]
    fn test_parse_code_block_wrapped() {
        let text = "```json\n{\"evolution\": \"steady\", \"milestones\": [\"first solo trip\"], \"cadence\": \"monthly\"}\n```";
        let doc: TemporalAnalysis = parse_document(text).unwrap();
        assert_eq!(doc.milestones.len(), 1);
    }

    #[test]
    fn test_parse_with_surrounding_prose() {
        let text = "Here is the document you asked for:\n{\"evolution\": \"steady\", \"milestones\": [\"x\"], \"cadence\": \"weekly\"} Hope that helps!";
        let doc: TemporalAnalysis = parse_document(text).unwrap();
        assert_eq!(doc.evolution, "steady");
    }

    #[test]
    fn test_parse_garbage_is_an_error() {
        let result: Result<TemporalAnalysis> = parse_document("I cannot answer that.");
        assert!(result.is_err());
    }

    #[test]
    fn test_each_prompt_carries_its_own_label() {
        let prompts = [
            &TEMPORAL,
            &SPATIAL,
            &BEHAVIORAL,
            &PREDICTIVE,
            &INSIGHTS,
            &COMPARATIVE,
        ];
        for prompt in prompts {
            assert!(prompt.system.contains(prompt.label), "{}", prompt.label);
            // No prompt mentions another sub-task's label
            for other in prompts {
                if other.label != prompt.label {
                    assert!(
                        !prompt.system.contains(other.label),
                        "{} leaked into {}",
                        other.label,
                        prompt.label
                    );
                }
            }
        }
    }

    #[test]
    fn test_render_input_includes_visits() {
        let visits = vec![VisitSummary {
            name: "Blue Lagoon".to_string(),
            location: "Iceland".to_string(),
            category: "spa".to_string(),
            visited_at: Utc::now(),
            coordinates: Some([64.0, -21.9]),
            rating: Some(5.0),
        }];
        let payload = render_input(&visits).unwrap();
        assert!(payload.contains("Blue Lagoon"));
        assert!(payload.contains("\"visits\""));
    }
}
