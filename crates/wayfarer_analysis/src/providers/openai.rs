//! OpenAI-compatible chat completions provider.

use crate::provider::{GenerationParams, GenerativeProvider};
use crate::retry::{with_retry, RetryConfig};
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryConfig,
}

impl OpenAiProvider {
    pub fn new(model: &str, base_url: Option<&str>) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").unwrap_or_default();
        let base_url = base_url
            .map(str::to_string)
            .or_else(|| env::var("OPENAI_BASE_URL").ok())
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()?,
            api_key,
            base_url,
            model: model.to_string(),
            retry: RetryConfig::default(),
        })
    }
}

#[async_trait::async_trait]
impl GenerativeProvider for OpenAiProvider {
    async fn generate(
        &self,
        system: &str,
        input: &str,
        params: GenerationParams,
    ) -> Result<String> {
        if self.api_key.is_empty() {
            anyhow::bail!("OPENAI_API_KEY is not set");
        }

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": input }
            ],
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "response_format": { "type": "json_object" }
        });

        let url = format!("{}/chat/completions", self.base_url);
        let response = with_retry(&self.retry, "openai", || async {
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await
                .map_err(Into::into)
        })
        .await?;

        let value: Value = response
            .json()
            .await
            .context("Failed to decode completion response")?;
        let text = value["choices"][0]["message"]["content"]
            .as_str()
            .context("Completion response had no message content")?
            .to_string();
        Ok(text)
    }
}
