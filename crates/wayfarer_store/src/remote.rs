//! System-of-record persistence.
//!
//! One append-only analysis collection per user (records are superseded,
//! never rewritten), plus the per-user settings and mirrored progress
//! documents. The remote store is authoritative: local tiers are never
//! populated with data that is not already here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use wayfarer_core::{AnalysisRecord, ProgressSnapshot, SettingsRecord};

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Append a newly committed record to the user's history.
    async fn append_analysis(&self, record: &AnalysisRecord) -> Result<()>;

    /// The single most recent record by creation time, if any.
    async fn latest_analysis(&self, user_id: &str) -> Result<Option<AnalysisRecord>>;

    async fn load_settings(&self, user_id: &str) -> Result<Option<SettingsRecord>>;
    async fn save_settings(&self, settings: &SettingsRecord) -> Result<()>;

    async fn save_progress(&self, user_id: &str, snapshot: &ProgressSnapshot) -> Result<()>;
    async fn load_progress(&self, user_id: &str) -> Result<Option<ProgressSnapshot>>;
}

/// SQLite-backed remote store. Records are stored as JSON documents with
/// the identity and ordering columns indexed.
#[derive(Clone)]
pub struct SqliteRemoteStore {
    pool: Pool<Sqlite>,
}

impl SqliteRemoteStore {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePoolOptions::new()
            .connect(&db_url)
            .await
            .context("Failed to open analysis database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analyses (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                record TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create analyses table")?;

        // Recall is always "newest for this user"
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_analyses_user_created ON analyses(user_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create analyses index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                user_id TEXT PRIMARY KEY,
                record TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create settings table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS progress (
                user_id TEXT PRIMARY KEY,
                snapshot TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create progress table")?;

        Ok(())
    }
}

#[async_trait]
impl RemoteStore for SqliteRemoteStore {
    async fn append_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        let payload =
            serde_json::to_string(record).context("Failed to serialize analysis record")?;
        sqlx::query("INSERT INTO analyses (id, user_id, created_at, record) VALUES (?, ?, ?, ?)")
            .bind(record.id.to_string())
            .bind(&record.user_id)
            .bind(record.created_at.timestamp_millis())
            .bind(payload)
            .execute(&self.pool)
            .await
            .context("Failed to append analysis record")?;
        Ok(())
    }

    async fn latest_analysis(&self, user_id: &str) -> Result<Option<AnalysisRecord>> {
        let row = sqlx::query(
            "SELECT record FROM analyses WHERE user_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query latest analysis")?;

        match row {
            Some(row) => {
                let raw: String = row.get("record");
                let record =
                    serde_json::from_str(&raw).context("Failed to parse stored analysis record")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn load_settings(&self, user_id: &str) -> Result<Option<SettingsRecord>> {
        let row = sqlx::query("SELECT record FROM settings WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query settings")?;

        match row {
            Some(row) => {
                let raw: String = row.get("record");
                let record =
                    serde_json::from_str(&raw).context("Failed to parse stored settings")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn save_settings(&self, settings: &SettingsRecord) -> Result<()> {
        let payload = serde_json::to_string(settings).context("Failed to serialize settings")?;
        sqlx::query(
            r#"
            INSERT INTO settings (user_id, record) VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET record = excluded.record
            "#,
        )
        .bind(&settings.user_id)
        .bind(payload)
        .execute(&self.pool)
        .await
        .context("Failed to save settings")?;
        Ok(())
    }

    async fn save_progress(&self, user_id: &str, snapshot: &ProgressSnapshot) -> Result<()> {
        let payload =
            serde_json::to_string(snapshot).context("Failed to serialize progress snapshot")?;
        sqlx::query(
            r#"
            INSERT INTO progress (user_id, snapshot, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                snapshot = excluded.snapshot,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(payload)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to save progress snapshot")?;
        Ok(())
    }

    async fn load_progress(&self, user_id: &str) -> Result<Option<ProgressSnapshot>> {
        let row = sqlx::query("SELECT snapshot FROM progress WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query progress snapshot")?;

        match row {
            Some(row) => {
                let raw: String = row.get("snapshot");
                let snapshot =
                    serde_json::from_str(&raw).context("Failed to parse progress snapshot")?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }
}

/// Map-backed remote store for tests and offline development.
#[derive(Default)]
pub struct MemoryRemoteStore {
    analyses: RwLock<HashMap<String, Vec<AnalysisRecord>>>,
    settings: RwLock<HashMap<String, SettingsRecord>>,
    progress: RwLock<HashMap<String, ProgressSnapshot>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full history for a user, in insertion order. Test helper.
    pub async fn history(&self, user_id: &str) -> Vec<AnalysisRecord> {
        self.analyses
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn append_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        self.analyses
            .write()
            .await
            .entry(record.user_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn latest_analysis(&self, user_id: &str) -> Result<Option<AnalysisRecord>> {
        Ok(self
            .analyses
            .read()
            .await
            .get(user_id)
            .and_then(|records| records.iter().max_by_key(|r| r.created_at).cloned()))
    }

    async fn load_settings(&self, user_id: &str) -> Result<Option<SettingsRecord>> {
        Ok(self.settings.read().await.get(user_id).cloned())
    }

    async fn save_settings(&self, settings: &SettingsRecord) -> Result<()> {
        self.settings
            .write()
            .await
            .insert(settings.user_id.clone(), settings.clone());
        Ok(())
    }

    async fn save_progress(&self, user_id: &str, snapshot: &ProgressSnapshot) -> Result<()> {
        self.progress
            .write()
            .await
            .insert(user_id.to_string(), snapshot.clone());
        Ok(())
    }

    async fn load_progress(&self, user_id: &str) -> Result<Option<ProgressSnapshot>> {
        Ok(self.progress.read().await.get(user_id).cloned())
    }
}
