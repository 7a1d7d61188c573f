//! Task progress tracking on top of the cache.
//!
//! Producers hold a [`ProgressTracker`] and persist each step with an explicit
//! cache write; pollers read through [`ProgressStore::get`], which reports
//! missing and corrupt records alike as `None`.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::cache::{CacheError, CacheKey, CacheService, DecodeError, JsonCodec, Ttl};
use crate::cache_key;
use crate::domain::progress::{ProgressError, TaskProgress};

const PROGRESS_KEY_PREFIX: &str = "progress";

static PROGRESS_CODEC: JsonCodec<TaskProgress> = JsonCodec::with_validator(validate_progress);

fn validate_progress(progress: &TaskProgress) -> Result<(), DecodeError> {
    progress
        .check()
        .map_err(|err| DecodeError::invalid(err.to_string()))
}

#[derive(Debug, Error)]
pub enum ProgressStoreError {
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error("failed to persist task progress: {0}")]
    Cache(#[from] CacheError),
}

#[derive(Clone)]
pub struct ProgressStore {
    cache: Arc<CacheService>,
    ttl: Ttl,
}

impl ProgressStore {
    pub fn new(cache: Arc<CacheService>) -> Self {
        let ttl = cache.config().progress_ttl();
        Self { cache, ttl }
    }

    pub fn key(task_id: &str) -> CacheKey {
        cache_key![PROGRESS_KEY_PREFIX, task_id]
    }

    /// Register a task under a fresh id and write its `pending` record.
    pub async fn start_new(&self) -> Result<ProgressTracker, ProgressStoreError> {
        self.start(Uuid::new_v4().to_string()).await
    }

    /// Write a `pending` record for `task_id`, replacing any previous record.
    #[instrument(skip(self, task_id), fields(task_id = tracing::field::Empty))]
    pub async fn start(
        &self,
        task_id: impl Into<String>,
    ) -> Result<ProgressTracker, ProgressStoreError> {
        let task_id = task_id.into();
        tracing::Span::current().record("task_id", task_id.as_str());

        let tracker = ProgressTracker {
            store: self.clone(),
            task_id,
            snapshot: TaskProgress::pending(),
        };
        tracker.persist().await?;
        debug!("task progress registered");
        Ok(tracker)
    }

    /// Latest snapshot for `task_id`; `None` when unknown or unreadable.
    pub async fn get(&self, task_id: &str) -> Option<TaskProgress> {
        self.cache
            .get_decoded(&Self::key(task_id), &PROGRESS_CODEC)
            .await
    }

    /// Best-effort removal once a poller has seen the terminal state.
    pub async fn clear(&self, task_id: &str) {
        self.cache.delete_keys(&[Self::key(task_id)]).await
    }

    async fn write(&self, task_id: &str, progress: &TaskProgress) -> Result<(), CacheError> {
        self.cache
            .set(&Self::key(task_id), progress, &PROGRESS_CODEC, self.ttl)
            .await
    }
}

/// Producer-side handle owning the authoritative snapshot of one task.
pub struct ProgressTracker {
    store: ProgressStore,
    task_id: String,
    snapshot: TaskProgress,
}

impl ProgressTracker {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn snapshot(&self) -> &TaskProgress {
        &self.snapshot
    }

    pub async fn begin(&mut self, total: u64) -> Result<(), ProgressStoreError> {
        self.apply(|next| next.begin(total)).await
    }

    pub async fn set_total(&mut self, total: u64) -> Result<(), ProgressStoreError> {
        self.apply(|next| next.set_total(total)).await
    }

    /// Count one finished item.
    pub async fn advance(&mut self, current: impl Into<String>) -> Result<(), ProgressStoreError> {
        self.advance_by(1, current).await
    }

    pub async fn advance_by(
        &mut self,
        count: u64,
        current: impl Into<String>,
    ) -> Result<(), ProgressStoreError> {
        let current = current.into();
        self.apply(|next| next.advance(count, current)).await
    }

    pub async fn warn(&mut self, message: impl Into<String>) -> Result<(), ProgressStoreError> {
        let message = message.into();
        self.apply(|next| next.push_warning(message)).await
    }

    pub async fn error(&mut self, message: impl Into<String>) -> Result<(), ProgressStoreError> {
        let message = message.into();
        self.apply(|next| next.push_error(message)).await
    }

    pub async fn complete(&mut self) -> Result<(), ProgressStoreError> {
        self.apply(TaskProgress::complete).await
    }

    pub async fn fail(&mut self, message: impl Into<String>) -> Result<(), ProgressStoreError> {
        let message = message.into();
        self.apply(|next| next.fail(message)).await
    }

    /// Validate `change` on a copy and adopt it only once the write succeeded,
    /// so a failed write can be retried.
    async fn apply<F>(&mut self, change: F) -> Result<(), ProgressStoreError>
    where
        F: FnOnce(&mut TaskProgress) -> Result<(), ProgressError>,
    {
        let mut next = self.snapshot.clone();
        change(&mut next)?;
        self.store.write(&self.task_id, &next).await?;
        self.snapshot = next;
        Ok(())
    }

    async fn persist(&self) -> Result<(), ProgressStoreError> {
        self.store.write(&self.task_id, &self.snapshot).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::cache::{BackendError, BackgroundTasks, CacheBackend, CacheConfig, MemoryBackend};
    use crate::domain::progress::ProgressStatus;

    /// Memory backend whose next `put` fails once armed.
    #[derive(Default)]
    struct FailNextPut {
        inner: MemoryBackend,
        armed: AtomicBool,
    }

    #[async_trait]
    impl CacheBackend for FailNextPut {
        async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
            self.inner.get(key).await
        }

        async fn put(
            &self,
            key: &str,
            value: String,
            ttl: Option<Ttl>,
        ) -> Result<(), BackendError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                return Err(BackendError::Timeout);
            }
            self.inner.put(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<(), BackendError> {
            self.inner.delete(key).await
        }
    }

    fn store_with(backend: Arc<MemoryBackend>) -> ProgressStore {
        let cache = CacheService::new(
            CacheConfig::default(),
            backend,
            Arc::new(BackgroundTasks::new()),
        );
        ProgressStore::new(Arc::new(cache))
    }

    #[tokio::test]
    async fn start_writes_pending_record() {
        let store = store_with(Arc::new(MemoryBackend::new()));
        let tracker = store.start("import-1").await.expect("start");

        let seen = store.get(tracker.task_id()).await.expect("record exists");
        assert_eq!(seen.status, ProgressStatus::Pending);
        assert_eq!(seen.total, 0);
    }

    #[tokio::test]
    async fn unknown_and_corrupt_records_read_as_none() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone());

        assert!(store.get("missing").await.is_none());

        backend
            .put(
                &ProgressStore::key("broken").serialize(),
                r#"{"status":"running","total":1,"completed":5,"current":"","errors":[],"warnings":[]}"#
                    .to_string(),
                None,
            )
            .await
            .expect("prime");
        assert!(store.get("broken").await.is_none());

        backend
            .put(
                &ProgressStore::key("stale").serialize(),
                r#"{"state":"done"}"#.to_string(),
                None,
            )
            .await
            .expect("prime");
        assert!(store.get("stale").await.is_none());
    }

    #[tokio::test]
    async fn rejected_step_is_not_persisted() {
        let store = store_with(Arc::new(MemoryBackend::new()));
        let mut tracker = store.start("export-1").await.expect("start");
        tracker.begin(1).await.expect("begin");
        tracker.advance("posts.json").await.expect("advance");

        let err = tracker.advance("extra").await.expect_err("overflow");
        assert!(matches!(err, ProgressStoreError::Progress(_)));

        let seen = store.get("export-1").await.expect("record");
        assert_eq!(seen.completed, 1);
        assert_eq!(seen.current, "posts.json");
    }

    #[tokio::test]
    async fn clear_removes_record() {
        let store = store_with(Arc::new(MemoryBackend::new()));
        let mut tracker = store.start_new().await.expect("start");
        tracker.fail("cancelled").await.expect("fail");
        let task_id = tracker.task_id().to_string();

        assert!(store.get(&task_id).await.is_some());
        store.clear(&task_id).await;
        assert!(store.get(&task_id).await.is_none());
    }

    #[tokio::test]
    async fn failed_write_leaves_tracker_retryable() {
        let backend = Arc::new(FailNextPut::default());
        let cache = CacheService::new(
            CacheConfig::default(),
            backend.clone(),
            Arc::new(BackgroundTasks::new()),
        );
        let store = ProgressStore::new(Arc::new(cache));
        let mut tracker = store.start("import-9").await.expect("start");
        tracker.begin(1).await.expect("begin");
        tracker.advance("only.md").await.expect("advance");

        backend.armed.store(true, Ordering::SeqCst);
        let err = tracker.complete().await.expect_err("write fails");
        assert!(matches!(
            err,
            ProgressStoreError::Cache(CacheError::Backend(BackendError::Timeout))
        ));
        assert_eq!(tracker.snapshot().status, ProgressStatus::Running);
        let seen = store.get("import-9").await.expect("record");
        assert_eq!(seen.status, ProgressStatus::Running);

        tracker.complete().await.expect("retry succeeds");
        let seen = store.get("import-9").await.expect("record");
        assert_eq!(seen.status, ProgressStatus::Completed);
        assert_eq!(&seen, tracker.snapshot());
    }

    #[tokio::test(start_paused = true)]
    async fn records_live_for_one_day_by_default() {
        let store = store_with(Arc::new(MemoryBackend::new()));
        let mut tracker = store.start("import-3").await.expect("start");
        tracker.fail("archive unreadable").await.expect("fail");

        tokio::time::advance(Ttl::DAY.as_duration() - std::time::Duration::from_secs(1)).await;
        assert!(store.get("import-3").await.is_some());

        tokio::time::advance(std::time::Duration::from_secs(2)).await;
        assert!(store.get("import-3").await.is_none());
    }
}
