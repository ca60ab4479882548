pub mod mock;
pub mod openai;

pub use mock::MockProvider;
pub use openai::OpenAiProvider;

use crate::provider::GenerativeProvider;
use anyhow::{bail, Result};
use std::sync::Arc;
use wayfarer_core::config::ProviderConfig;

/// Build the configured provider.
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn GenerativeProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(
            &config.model,
            config.base_url.as_deref(),
        )?)),
        "mock" => Ok(Arc::new(MockProvider::new())),
        other => bail!("Unknown provider: {other}"),
    }
}
