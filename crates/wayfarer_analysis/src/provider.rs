//! Generative content provider seam.

use anyhow::Result;
use async_trait::async_trait;

/// Sampling parameters for a single sub-task call.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_tokens: u32,
    /// Low by default; the sub-tasks produce structured documents, not prose.
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.4,
        }
    }
}

/// A black-box generative backend. Called once per sub-task per generation;
/// the returned text is expected to carry a single JSON document.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    async fn generate(&self, system: &str, input: &str, params: GenerationParams)
        -> Result<String>;
}
