use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WayfarerConfig {
    pub provider: ProviderConfig,
    pub cache: CacheConfig,
    pub quota: QuotaConfig,
    pub refresh: RefreshConfig,
    pub generation: GenerationConfig,
}

impl WayfarerConfig {
    /// Load config from a TOML file, falling back to defaults for missing
    /// fields. After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: WayfarerConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if the file doesn't exist, return defaults
    /// with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("WAYFARER_PROVIDER") {
            self.provider.provider = v;
        }
        if let Ok(v) = std::env::var("WAYFARER_MODEL") {
            self.provider.model = v;
        }
        if let Ok(v) = std::env::var("WAYFARER_BASE_URL") {
            self.provider.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("WAYFARER_DAILY_LIMIT") {
            if let Ok(n) = v.parse() {
                self.quota.daily_limit = n;
            }
        }
        if let Ok(v) = std::env::var("WAYFARER_MEMORY_TTL_SECS") {
            if let Ok(n) = v.parse() {
                self.cache.memory_ttl_secs = n;
            }
        }
        if let Ok(v) = std::env::var("WAYFARER_CONCURRENT_SECTIONS") {
            if let Ok(b) = v.parse() {
                self.generation.concurrent_sections = b;
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            max_tokens: 1024,
            temperature: 0.4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of the in-process cache tier.
    pub memory_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_ttl_secs: 5 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Regenerations allowed per rolling local day.
    pub daily_limit: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self { daily_limit: 5 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Minimum spacing between two background freshness checks. The
    /// per-user refresh interval itself lives in the settings record.
    pub check_interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Run the six sub-tasks concurrently. Turn off for providers that
    /// enforce their own concurrency limits.
    pub concurrent_sections: bool,
    /// Per sub-task call timeout.
    pub section_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            concurrent_sections: true,
            section_timeout_secs: 90,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
