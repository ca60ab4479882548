//! Live progress of in-flight generations, observable from other contexts.
//!
//! Every transition is persisted immediately (in-process slot first, then
//! the two durable mirrors), so an observer polling at any cadence sees
//! monotonic progress and never a stale "still generating" flag after the
//! job ends. Only the orchestrating task writes; sub-tasks never report
//! progress themselves. At most one live slot exists per user, and a new
//! `begin` implicitly resets whatever terminal state the last job left.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use wayfarer_core::ProgressSnapshot;
use wayfarer_store::{LocalStore, RemoteStore};

pub struct ProgressTracker {
    slots: RwLock<HashMap<String, ProgressSnapshot>>,
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
}

fn mirror_key(user_id: &str) -> String {
    format!("progress:{user_id}")
}

impl ProgressTracker {
    pub fn new(local: Arc<dyn LocalStore>, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            local,
            remote,
        }
    }

    /// Begin a new generation.
    pub async fn begin(&self, user_id: &str, stage: &str, progress: u8) {
        let snapshot = ProgressSnapshot {
            is_generating: true,
            progress: progress.min(100),
            stage: stage.to_string(),
            estimated_secs_remaining: None,
            started_at: Some(Utc::now()),
        };
        self.store(user_id, snapshot).await;
    }

    /// Advance to a new stage. Progress never moves backwards while a job
    /// is live, whatever order stage updates land in.
    pub async fn advance(&self, user_id: &str, stage: &str, progress: u8) {
        let current = self.slots.read().await.get(user_id).cloned();
        let (floor, started_at) = match current {
            Some(ref c) if c.is_generating => (c.progress, c.started_at),
            _ => (0, Some(Utc::now())),
        };
        let pct = progress.clamp(floor, 100);
        let snapshot = ProgressSnapshot {
            is_generating: true,
            progress: pct,
            stage: stage.to_string(),
            estimated_secs_remaining: started_at.and_then(|t| estimate_remaining(t, pct)),
            started_at,
        };
        self.store(user_id, snapshot).await;
    }

    /// Finalize a successful run at exactly 100.
    pub async fn complete(&self, user_id: &str) {
        let started_at = self.started_at(user_id).await;
        let snapshot = ProgressSnapshot {
            is_generating: false,
            progress: 100,
            stage: "analysis ready".to_string(),
            estimated_secs_remaining: None,
            started_at,
        };
        self.store(user_id, snapshot).await;
    }

    /// Finalize a failed run: progress resets to 0 under a failure label.
    pub async fn fail(&self, user_id: &str, stage: &str) {
        let started_at = self.started_at(user_id).await;
        let snapshot = ProgressSnapshot {
            is_generating: false,
            progress: 0,
            stage: stage.to_string(),
            estimated_secs_remaining: None,
            started_at,
        };
        self.store(user_id, snapshot).await;
    }

    pub async fn is_generating(&self, user_id: &str) -> bool {
        self.slots
            .read()
            .await
            .get(user_id)
            .map(|s| s.is_generating)
            .unwrap_or(false)
    }

    /// In-process view of the user's job, if this process has seen one.
    pub async fn snapshot(&self, user_id: &str) -> Option<ProgressSnapshot> {
        self.slots.read().await.get(user_id).cloned()
    }

    /// Durable view; lets a second device poll a job it did not start.
    pub async fn observe(&self, user_id: &str) -> anyhow::Result<Option<ProgressSnapshot>> {
        self.remote.load_progress(user_id).await
    }

    async fn started_at(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.slots
            .read()
            .await
            .get(user_id)
            .and_then(|s| s.started_at)
    }

    async fn store(&self, user_id: &str, snapshot: ProgressSnapshot) {
        self.slots
            .write()
            .await
            .insert(user_id.to_string(), snapshot.clone());

        // Mirrors are observability; their failures never fail the job.
        match serde_json::to_string(&snapshot) {
            Ok(raw) => {
                if let Err(e) = self.local.set(&mirror_key(user_id), &raw).await {
                    tracing::warn!("Failed to mirror progress locally for {user_id}: {e:#}");
                }
            }
            Err(e) => tracing::warn!("Failed to serialize progress snapshot: {e:#}"),
        }
        if let Err(e) = self.remote.save_progress(user_id, &snapshot).await {
            tracing::warn!("Failed to mirror progress remotely for {user_id}: {e:#}");
        }
    }
}

fn estimate_remaining(started_at: DateTime<Utc>, progress: u8) -> Option<u64> {
    if progress == 0 || progress >= 100 {
        return None;
    }
    let elapsed = (Utc::now() - started_at).num_seconds().max(0) as u64;
    Some(elapsed * u64::from(100 - progress) / u64::from(progress))
}
