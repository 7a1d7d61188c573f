use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};

use crate::application::progress::ProgressStore;
use crate::domain::progress::TaskProgress;

const DEFAULT_WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("task `{task_id}` has no progress record")]
    NotFound { task_id: String },
    #[error("task `{task_id}` timed out after {timeout:?}")]
    TimedOut { task_id: String, timeout: Duration },
}

/// Poll until the task reaches a terminal state or the timeout elapses,
/// returning the final snapshot.
///
/// A missing record is reported as not found from the second poll on.
pub async fn wait_for_task_completion(
    store: &ProgressStore,
    task_id: &str,
    timeout: Duration,
) -> Result<TaskProgress, WaitError> {
    wait_for_task_completion_with_interval(store, task_id, timeout, DEFAULT_WAIT_POLL_INTERVAL)
        .await
}

pub async fn wait_for_task_completion_with_interval(
    store: &ProgressStore,
    task_id: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<TaskProgress, WaitError> {
    let deadline = Instant::now() + timeout;
    let mut first_poll = true;

    loop {
        match store.get(task_id).await {
            Some(progress) if progress.is_terminal() => return Ok(progress),
            Some(_) => {}
            None if !first_poll => {
                return Err(WaitError::NotFound {
                    task_id: task_id.to_string(),
                });
            }
            None => {}
        }
        first_poll = false;

        if Instant::now() >= deadline {
            return Err(WaitError::TimedOut {
                task_id: task_id.to_string(),
                timeout,
            });
        }

        sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::{BackgroundTasks, CacheConfig, CacheService, MemoryBackend};
    use crate::domain::progress::ProgressStatus;

    fn store() -> ProgressStore {
        let cache = CacheService::new(
            CacheConfig::default(),
            Arc::new(MemoryBackend::new()),
            Arc::new(BackgroundTasks::new()),
        );
        ProgressStore::new(Arc::new(cache))
    }

    #[tokio::test]
    async fn returns_terminal_snapshot() {
        let store = store();
        let mut tracker = store.start("import-1").await.expect("start");
        tracker.begin(1).await.expect("begin");

        let producer = tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            tracker.advance("only").await.expect("advance");
            tracker.complete().await.expect("complete");
        });

        let finished = wait_for_task_completion(&store, "import-1", Duration::from_secs(5))
            .await
            .expect("task finishes");
        producer.await.expect("producer");

        assert_eq!(finished.status, ProgressStatus::Completed);
        assert_eq!(finished.completed, 1);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let store = store();
        let err = wait_for_task_completion_with_interval(
            &store,
            "ghost",
            Duration::from_secs(1),
            Duration::from_millis(1),
        )
        .await
        .expect_err("no record");
        assert_eq!(
            err,
            WaitError::NotFound {
                task_id: "ghost".to_string()
            }
        );
    }

    #[tokio::test]
    async fn zero_interval_polling_still_times_out() {
        let store = store();
        let _tracker = store.start("export-2").await.expect("start");

        let err = wait_for_task_completion_with_interval(
            &store,
            "export-2",
            Duration::from_millis(30),
            Duration::ZERO,
        )
        .await
        .expect_err("never finishes");
        assert_eq!(
            err,
            WaitError::TimedOut {
                task_id: "export-2".to_string(),
                timeout: Duration::from_millis(30),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_task_times_out() {
        let store = store();
        let _tracker = store.start("export-1").await.expect("start");

        let err = wait_for_task_completion(&store, "export-1", Duration::from_millis(200))
            .await
            .expect_err("never finishes");
        assert!(matches!(err, WaitError::TimedOut { .. }));
    }
}
