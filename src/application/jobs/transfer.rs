use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::progress::{ProgressStore, ProgressStoreError, ProgressTracker};
use crate::domain::progress::TaskProgress;

/// Direction of a content transfer job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Import,
    Export,
}

impl TransferKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferKind::Import => "import",
            TransferKind::Export => "export",
        }
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of processing one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    /// Item processed, with a note for the operator.
    DoneWithWarning(String),
}

/// Failure of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    /// Record the message and continue with the next item.
    Skip(String),
    /// Record the message and fail the whole task.
    Abort(String),
}

/// Work item with a label shown as the task's `current` field.
pub trait TransferItem {
    fn label(&self) -> String;
}

impl TransferItem for String {
    fn label(&self) -> String {
        self.clone()
    }
}

impl TransferItem for &str {
    fn label(&self) -> String {
        (*self).to_string()
    }
}

/// Process `items` in order, recording progress after each one.
///
/// Skipped items count as processed so `completed` reaches `total`; their
/// messages land in `errors`. An abort fails the task immediately.
pub async fn run_transfer<I, F, Fut>(
    kind: TransferKind,
    mut tracker: ProgressTracker,
    items: Vec<I>,
    mut step: F,
) -> Result<TaskProgress, ProgressStoreError>
where
    I: TransferItem,
    F: FnMut(I) -> Fut,
    Fut: Future<Output = Result<StepOutcome, StepError>>,
{
    let task_id = tracker.task_id().to_string();
    tracker.begin(items.len() as u64).await?;
    info!(%kind, task_id = %task_id, total = items.len(), "transfer started");

    for item in items {
        let label = item.label();
        match step(item).await {
            Ok(StepOutcome::Done) => {}
            Ok(StepOutcome::DoneWithWarning(message)) => {
                warn!(%kind, task_id = %task_id, item = %label, detail = %message, "transfer item warning");
                tracker.warn(format!("{label}: {message}")).await?;
            }
            Err(StepError::Skip(message)) => {
                warn!(%kind, task_id = %task_id, item = %label, detail = %message, "transfer item skipped");
                tracker.error(format!("{label}: {message}")).await?;
            }
            Err(StepError::Abort(message)) => {
                error!(%kind, task_id = %task_id, item = %label, detail = %message, "transfer aborted");
                tracker.fail(format!("{label}: {message}")).await?;
                return Ok(tracker.snapshot().clone());
            }
        }
        tracker.advance(label).await?;
    }

    tracker.complete().await?;
    info!(
        %kind,
        task_id = %task_id,
        errors = tracker.snapshot().errors.len(),
        warnings = tracker.snapshot().warnings.len(),
        "transfer completed"
    );
    Ok(tracker.snapshot().clone())
}

/// Register a task and run it on the tokio runtime, returning its id at once.
pub async fn spawn_transfer<I, F, Fut>(
    store: &ProgressStore,
    kind: TransferKind,
    items: Vec<I>,
    step: F,
) -> Result<(String, JoinHandle<Result<TaskProgress, ProgressStoreError>>), ProgressStoreError>
where
    I: TransferItem + Send + 'static,
    F: FnMut(I) -> Fut + Send + 'static,
    Fut: Future<Output = Result<StepOutcome, StepError>> + Send + 'static,
{
    let tracker = store.start_new().await?;
    let task_id = tracker.task_id().to_string();
    let handle = tokio::spawn(run_transfer(kind, tracker, items, step));
    Ok((task_id, handle))
}
