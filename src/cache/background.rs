//! Deferred completion for writes that must outlive the request that issued them.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use metrics::gauge;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

const METRIC_BACKGROUND_PENDING: &str = "quire_cache_background_pending";

/// Fire-and-forget executor with a drain barrier.
///
/// Spawned futures run on the ambient tokio runtime. Callers never wait on
/// them; process shutdown calls [`BackgroundTasks::drain`] so nothing spawned
/// before the barrier is lost.
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    tasks: Mutex<JoinSet<()>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` without waiting for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.lock_tasks("spawn");
        while let Some(finished) = tasks.try_join_next() {
            report_join(finished);
        }
        tasks.spawn(task);
        gauge!(METRIC_BACKGROUND_PENDING).set(tasks.len() as f64);
    }

    /// Number of tasks spawned and not yet reaped.
    pub fn pending(&self) -> usize {
        self.lock_tasks("pending").len()
    }

    /// Wait until every task spawned so far, and any they spawn in turn, settles.
    pub async fn drain(&self) {
        loop {
            let mut batch = std::mem::take(&mut *self.lock_tasks("drain"));
            if batch.is_empty() {
                break;
            }
            debug!(pending = batch.len(), "draining background cache tasks");
            while let Some(finished) = batch.join_next().await {
                report_join(finished);
            }
        }
        gauge!(METRIC_BACKGROUND_PENDING).set(0.0);
    }

    /// A panic while the set was locked leaves it intact, so the guard is recovered.
    fn lock_tasks(&self, op: &'static str) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(|poisoned| {
            warn!(op, "recovered poisoned background task set");
            poisoned.into_inner()
        })
    }
}

fn report_join(result: Result<(), JoinError>) {
    if let Err(err) = result {
        warn!(error = %err, "background cache task did not complete");
    }
}
