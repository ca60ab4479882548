//! Three-tier read-through cache for the most recent analysis record.
//!
//! Tiers are consulted fastest-first: in-process memory (short TTL), the
//! on-device key/value store (valid until invalidated), then the remote
//! system of record. Slower-tier hits populate the faster tiers; promotion
//! is idempotent and safe to race. A tier that errors is skipped with a
//! warning, never fatal; only the remote store is authoritative.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use wayfarer_core::AnalysisRecord;
use wayfarer_store::{LocalStore, RemoteStore, SettingsStore};

use crate::progress::ProgressTracker;

/// One cache layer.
#[async_trait]
pub trait CacheTier: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<AnalysisRecord>>;
    async fn set(&self, record: &AnalysisRecord) -> Result<()>;
    async fn invalidate(&self, user_id: &str) -> Result<()>;
}

/// In-process tier. Entries expire after a short TTL and die with the
/// process.
pub struct MemoryTier {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, AnalysisRecord)>>,
}

impl MemoryTier {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CacheTier for MemoryTier {
    async fn get(&self, user_id: &str) -> Result<Option<AnalysisRecord>> {
        Ok(self.entries.read().await.get(user_id).and_then(
            |(populated_at, record)| {
                if populated_at.elapsed() <= self.ttl {
                    Some(record.clone())
                } else {
                    None
                }
            },
        ))
    }

    async fn set(&self, record: &AnalysisRecord) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(record.user_id.clone(), (Instant::now(), record.clone()));
        Ok(())
    }

    async fn invalidate(&self, user_id: &str) -> Result<()> {
        self.entries.write().await.remove(user_id);
        Ok(())
    }
}

/// On-device tier backed by the local key/value store. Survives restarts,
/// valid until explicitly invalidated, local to one device.
pub struct LocalTier {
    store: Arc<dyn LocalStore>,
}

impl LocalTier {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    fn key(user_id: &str) -> String {
        format!("analysis:{user_id}")
    }
}

#[async_trait]
impl CacheTier for LocalTier {
    async fn get(&self, user_id: &str) -> Result<Option<AnalysisRecord>> {
        let Some(raw) = self.store.get(&Self::key(user_id)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // A corrupt local entry is a miss, not an outage.
                tracing::warn!("Discarding unreadable cached analysis for {user_id}: {e}");
                Ok(None)
            }
        }
    }

    async fn set(&self, record: &AnalysisRecord) -> Result<()> {
        let raw = serde_json::to_string(record).context("Failed to serialize analysis record")?;
        self.store.set(&Self::key(&record.user_id), &raw).await
    }

    async fn invalidate(&self, user_id: &str) -> Result<()> {
        self.store.remove(&Self::key(user_id)).await
    }
}

pub struct TieredCache {
    tiers: Vec<Arc<dyn CacheTier>>,
    remote: Arc<dyn RemoteStore>,
    settings: Arc<SettingsStore>,
    progress: Arc<ProgressTracker>,
}

impl TieredCache {
    /// Compose an arbitrary chain of tiers, fastest first. Lets tests
    /// inject a tier with an artificially short TTL or drop a tier
    /// entirely.
    pub fn new(
        tiers: Vec<Arc<dyn CacheTier>>,
        remote: Arc<dyn RemoteStore>,
        settings: Arc<SettingsStore>,
        progress: Arc<ProgressTracker>,
    ) -> Self {
        Self {
            tiers,
            remote,
            settings,
            progress,
        }
    }

    /// Standard wiring: memory tier over the local key/value tier.
    pub fn with_default_tiers(
        memory_ttl: Duration,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        settings: Arc<SettingsStore>,
        progress: Arc<ProgressTracker>,
    ) -> Self {
        Self::new(
            vec![
                Arc::new(MemoryTier::new(memory_ttl)),
                Arc::new(LocalTier::new(local)),
            ],
            remote,
            settings,
            progress,
        )
    }

    /// The freshest available record for the user.
    ///
    /// While a generation is in flight this returns a transient placeholder
    /// rather than any tier's data; an in-flight job must not be mistaken
    /// for a finished one. `force_refresh` drops the local tiers first; the
    /// remote store is never locally invalidated. The remote store is only
    /// consulted while the settings record says the stored analysis is not
    /// yet due for refresh. A due record is the caller's cue to regenerate,
    /// signalled by `None`.
    pub async fn get(&self, user_id: &str, force_refresh: bool) -> Result<Option<AnalysisRecord>> {
        if self.progress.is_generating(user_id).await {
            return Ok(Some(AnalysisRecord::placeholder(user_id)));
        }

        if force_refresh {
            for tier in &self.tiers {
                if let Err(e) = tier.invalidate(user_id).await {
                    tracing::warn!("Cache invalidation failed for {user_id}: {e:#}");
                }
            }
        } else {
            for (depth, tier) in self.tiers.iter().enumerate() {
                match tier.get(user_id).await {
                    Ok(Some(record)) => {
                        self.promote(&record, depth).await;
                        return Ok(Some(record));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!("Cache tier {depth} read failed for {user_id}: {e:#}")
                    }
                }
            }
        }

        let settings = self
            .settings
            .load(user_id)
            .await
            .context("Failed to load settings for cache read")?;
        let Some(last_updated) = settings.last_updated_at else {
            return Ok(None);
        };
        if Utc::now() - last_updated >= settings.refresh_interval() {
            return Ok(None);
        }

        match self
            .remote
            .latest_analysis(user_id)
            .await
            .context("Failed to query latest analysis")?
        {
            Some(record) => {
                self.promote(&record, self.tiers.len()).await;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Commit a freshly generated record. The remote append must succeed
    /// before any local tier is touched, so a partial failure never leaves
    /// a local tier pointing at data absent from the system of record.
    pub async fn commit(&self, record: &AnalysisRecord) -> Result<()> {
        self.remote
            .append_analysis(record)
            .await
            .context("Failed to append analysis record")?;
        self.settings
            .mark_updated(&record.user_id, record.created_at)
            .await
            .context("Failed to stamp settings after commit")?;
        self.promote(record, self.tiers.len()).await;
        Ok(())
    }

    /// Populate every tier faster than `depth`.
    async fn promote(&self, record: &AnalysisRecord, depth: usize) {
        for tier in &self.tiers[..depth] {
            if let Err(e) = tier.set(record).await {
                tracing::warn!("Cache tier promotion failed for {}: {e:#}", record.user_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wayfarer_core::{ProgressSnapshot, SettingsRecord};
    use wayfarer_store::{MemoryLocalStore, MemoryRemoteStore};

    /// Remote store wrapper that counts analysis queries.
    struct CountingRemote {
        inner: MemoryRemoteStore,
        latest_calls: AtomicUsize,
    }

    impl CountingRemote {
        fn new() -> Self {
            Self {
                inner: MemoryRemoteStore::new(),
                latest_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteStore for CountingRemote {
        async fn append_analysis(&self, record: &AnalysisRecord) -> Result<()> {
            self.inner.append_analysis(record).await
        }
        async fn latest_analysis(&self, user_id: &str) -> Result<Option<AnalysisRecord>> {
            self.latest_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.latest_analysis(user_id).await
        }
        async fn load_settings(&self, user_id: &str) -> Result<Option<SettingsRecord>> {
            self.inner.load_settings(user_id).await
        }
        async fn save_settings(&self, settings: &SettingsRecord) -> Result<()> {
            self.inner.save_settings(settings).await
        }
        async fn save_progress(&self, user_id: &str, snapshot: &ProgressSnapshot) -> Result<()> {
            self.inner.save_progress(user_id, snapshot).await
        }
        async fn load_progress(&self, user_id: &str) -> Result<Option<ProgressSnapshot>> {
            self.inner.load_progress(user_id).await
        }
    }

    /// Remote store that rejects every write.
    struct ReadOnlyRemote;

    #[async_trait]
    impl RemoteStore for ReadOnlyRemote {
        async fn append_analysis(&self, _: &AnalysisRecord) -> Result<()> {
            Err(anyhow!("remote rejected the append"))
        }
        async fn latest_analysis(&self, _: &str) -> Result<Option<AnalysisRecord>> {
            Ok(None)
        }
        async fn load_settings(&self, _: &str) -> Result<Option<SettingsRecord>> {
            Ok(None)
        }
        async fn save_settings(&self, _: &SettingsRecord) -> Result<()> {
            Ok(())
        }
        async fn save_progress(&self, _: &str, _: &ProgressSnapshot) -> Result<()> {
            Ok(())
        }
        async fn load_progress(&self, _: &str) -> Result<Option<ProgressSnapshot>> {
            Ok(None)
        }
    }

    fn committed_record(user_id: &str) -> AnalysisRecord {
        let mut record = AnalysisRecord::placeholder(user_id);
        record.is_generating = false;
        record.based_on_places = 7;
        record
    }

    fn harness(
        memory_ttl: Duration,
        remote: Arc<dyn RemoteStore>,
    ) -> (TieredCache, Arc<MemoryTier>, Arc<LocalTier>) {
        let local_store: Arc<dyn LocalStore> = Arc::new(MemoryLocalStore::new());
        let settings = Arc::new(SettingsStore::new(remote.clone(), local_store.clone()));
        let progress = Arc::new(ProgressTracker::new(local_store.clone(), remote.clone()));
        let memory = Arc::new(MemoryTier::new(memory_ttl));
        let local = Arc::new(LocalTier::new(local_store));
        let cache = TieredCache::new(
            vec![memory.clone(), local.clone()],
            remote,
            settings,
            progress,
        );
        (cache, memory, local)
    }

    #[tokio::test]
    async fn test_memory_tier_wins_while_within_ttl() {
        let remote = Arc::new(CountingRemote::new());
        let (cache, memory, local) = harness(Duration::from_secs(300), remote.clone());

        let mut stale = committed_record("u1");
        stale.based_on_places = 1;
        local.set(&stale).await.unwrap();

        let fresh = committed_record("u1");
        memory.set(&fresh).await.unwrap();

        let got = cache.get("u1", false).await.unwrap().unwrap();
        assert_eq!(got.id, fresh.id);
        assert_eq!(remote.latest_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_memory_falls_to_local_without_remote_call() {
        let remote = Arc::new(CountingRemote::new());
        let (cache, memory, local) = harness(Duration::from_secs(0), remote.clone());

        let in_memory = committed_record("u1");
        memory.set(&in_memory).await.unwrap();
        let on_device = committed_record("u1");
        local.set(&on_device).await.unwrap();

        // TTL of zero: the memory entry is already expired.
        let got = cache.get("u1", false).await.unwrap().unwrap();
        assert_eq!(got.id, on_device.id);
        assert_eq!(remote.latest_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_local_hit_promotes_into_memory() {
        let remote = Arc::new(CountingRemote::new());
        let (cache, memory, local) = harness(Duration::from_secs(300), remote);

        let record = committed_record("u1");
        local.set(&record).await.unwrap();
        cache.get("u1", false).await.unwrap().unwrap();

        let promoted = memory.get("u1").await.unwrap().unwrap();
        assert_eq!(promoted.id, record.id);
    }

    #[tokio::test]
    async fn test_remote_consulted_only_while_not_due_for_refresh() {
        let remote = Arc::new(CountingRemote::new());
        let (cache, _memory, _local) = harness(Duration::from_secs(300), remote.clone());

        let record = committed_record("u1");
        remote.inner.append_analysis(&record).await.unwrap();

        // No settings stamp yet: nothing says the remote record is fresh.
        assert!(cache.get("u1", false).await.unwrap().is_none());

        // Stamped recently: the remote record is served and promoted.
        let mut settings = SettingsRecord::new("u1");
        settings.last_updated_at = Some(Utc::now());
        remote.inner.save_settings(&settings).await.unwrap();
        let got = cache.get("u1", true).await.unwrap().unwrap();
        assert_eq!(got.id, record.id);

        // Stamped past the refresh interval: the caller must regenerate.
        settings.last_updated_at = Some(Utc::now() - chrono::Duration::hours(25));
        remote.inner.save_settings(&settings).await.unwrap();
        assert!(cache.get("u1", true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_flight_generation_returns_placeholder() {
        let remote = Arc::new(CountingRemote::new());
        let local_store: Arc<dyn LocalStore> = Arc::new(MemoryLocalStore::new());
        let settings = Arc::new(SettingsStore::new(
            remote.clone() as Arc<dyn RemoteStore>,
            local_store.clone(),
        ));
        let progress = Arc::new(ProgressTracker::new(local_store.clone(), remote.clone()));
        let memory = Arc::new(MemoryTier::new(Duration::from_secs(300)));
        let cache = TieredCache::new(
            vec![memory.clone()],
            remote,
            settings,
            progress.clone(),
        );

        // A committed record sits in memory, but a job is now in flight.
        memory.set(&committed_record("u1")).await.unwrap();
        progress.begin("u1", "preparing input", 5).await;

        let got = cache.get("u1", false).await.unwrap().unwrap();
        assert!(got.is_generating);
        assert_eq!(got.based_on_places, 0);
    }

    #[tokio::test]
    async fn test_force_refresh_drops_local_tiers() {
        let remote = Arc::new(CountingRemote::new());
        let (cache, memory, local) = harness(Duration::from_secs(300), remote);

        let record = committed_record("u1");
        memory.set(&record).await.unwrap();
        local.set(&record).await.unwrap();

        // No fresh settings stamp, so the forced read comes back empty
        // and both local tiers are gone.
        assert!(cache.get("u1", true).await.unwrap().is_none());
        assert!(memory.get("u1").await.unwrap().is_none());
        assert!(local.get("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_remote_append_leaves_local_tiers_untouched() {
        let remote: Arc<dyn RemoteStore> = Arc::new(ReadOnlyRemote);
        let (cache, memory, local) = harness(Duration::from_secs(300), remote);

        let record = committed_record("u1");
        assert!(cache.commit(&record).await.is_err());
        assert!(memory.get("u1").await.unwrap().is_none());
        assert!(local.get("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_stamps_settings_and_populates_tiers() {
        let remote = Arc::new(CountingRemote::new());
        let (cache, memory, local) = harness(Duration::from_secs(300), remote.clone());

        let record = committed_record("u1");
        cache.commit(&record).await.unwrap();

        assert_eq!(memory.get("u1").await.unwrap().unwrap().id, record.id);
        assert_eq!(local.get("u1").await.unwrap().unwrap().id, record.id);
        let settings = remote.inner.load_settings("u1").await.unwrap().unwrap();
        assert_eq!(settings.last_updated_at, Some(record.created_at));
    }
}
