//! Per-user settings access.
//!
//! The remote copy is authoritative; every save is mirrored into the local
//! key/value store so a remote outage degrades to slightly-stale settings
//! instead of no settings. Mirror failures are logged, never raised.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use wayfarer_core::{RequestLimits, SettingsRecord};

use crate::kv::LocalStore;
use crate::remote::RemoteStore;

pub struct SettingsStore {
    remote: Arc<dyn RemoteStore>,
    local: Arc<dyn LocalStore>,
}

fn mirror_key(user_id: &str) -> String {
    format!("settings:{user_id}")
}

impl SettingsStore {
    pub fn new(remote: Arc<dyn RemoteStore>, local: Arc<dyn LocalStore>) -> Self {
        Self { remote, local }
    }

    /// Load the user's settings, creating defaults on first access. Falls
    /// back to the local mirror when the remote store is unreachable.
    pub async fn load(&self, user_id: &str) -> Result<SettingsRecord> {
        match self.remote.load_settings(user_id).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => {
                let record = SettingsRecord::new(user_id);
                self.save(&record).await?;
                Ok(record)
            }
            Err(e) => {
                tracing::warn!("Remote settings read failed for {user_id}, trying mirror: {e:#}");
                if let Some(raw) = self.local.get(&mirror_key(user_id)).await? {
                    return serde_json::from_str(&raw).context("Failed to parse mirrored settings");
                }
                Err(e)
            }
        }
    }

    pub async fn save(&self, record: &SettingsRecord) -> Result<()> {
        self.remote.save_settings(record).await?;
        match serde_json::to_string(record) {
            Ok(raw) => {
                if let Err(e) = self.local.set(&mirror_key(&record.user_id), &raw).await {
                    tracing::warn!("Failed to mirror settings for {}: {e:#}", record.user_id);
                }
            }
            Err(e) => tracing::warn!("Failed to serialize settings mirror: {e:#}"),
        }
        Ok(())
    }

    /// Stamp the time of a successful analysis commit.
    pub async fn mark_updated(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut record = self.load(user_id).await?;
        record.last_updated_at = Some(at);
        self.save(&record).await
    }

    /// Replace the quota sub-state.
    pub async fn update_limits(&self, user_id: &str, limits: RequestLimits) -> Result<()> {
        let mut record = self.load(user_id).await?;
        record.request_limits = limits;
        self.save(&record).await
    }
}
