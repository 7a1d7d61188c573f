use std::sync::Arc;
use std::time::Duration;

use quire::application::jobs::{
    StepError, StepOutcome, TransferKind, spawn_transfer, wait_for_task_completion,
};
use quire::application::progress::ProgressStore;
use quire::cache::{BackgroundTasks, CacheConfig, CacheService, MemoryBackend};
use quire::domain::progress::{ProgressStatus, TaskProgress};

fn store() -> ProgressStore {
    let cache = CacheService::new(
        CacheConfig::default(),
        Arc::new(MemoryBackend::new()),
        Arc::new(BackgroundTasks::new()),
    );
    ProgressStore::new(Arc::new(cache))
}

fn assert_forward(previous: &TaskProgress, next: &TaskProgress) {
    assert!(
        next.completed >= previous.completed,
        "completed went from {} to {}",
        previous.completed,
        next.completed
    );
    assert!(
        next.status == previous.status || previous.status.can_transition_to(next.status),
        "status went from {} to {}",
        previous.status,
        next.status
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn poller_never_observes_progress_moving_backwards() {
    let store = store();
    let items: Vec<String> = (0..200).map(|index| format!("tab-{index}.gp5")).collect();

    let (task_id, handle) = spawn_transfer(&store, TransferKind::Import, items, |item| async move {
        tokio::task::yield_now().await;
        if item.ends_with("13.gp5") {
            Err(StepError::Skip("unsupported format".to_string()))
        } else {
            Ok(StepOutcome::Done)
        }
    })
    .await
    .expect("spawn");

    let poller = {
        let store = store.clone();
        let task_id = task_id.clone();
        tokio::spawn(async move {
            let mut seen: Vec<TaskProgress> = Vec::new();
            loop {
                if let Some(snapshot) = store.get(&task_id).await {
                    if let Some(previous) = seen.last() {
                        assert_forward(previous, &snapshot);
                    }
                    let done = snapshot.is_terminal();
                    seen.push(snapshot);
                    if done {
                        return seen;
                    }
                }
                tokio::task::yield_now().await;
            }
        })
    };

    let finished = handle.await.expect("join").expect("transfer");
    let seen = poller.await.expect("poller");

    assert_eq!(finished.status, ProgressStatus::Completed);
    assert_eq!(finished.completed, 200);
    assert_eq!(finished.errors.len(), 2);
    assert_eq!(seen.last(), Some(&finished));
}

#[tokio::test]
async fn waiter_returns_terminal_snapshot() {
    let store = store();

    let (task_id, handle) = spawn_transfer(
        &store,
        TransferKind::Export,
        vec!["posts".to_string(), "tags".to_string()],
        |item| async move {
            if item == "tags" {
                Err(StepError::Abort("archive closed".to_string()))
            } else {
                Ok(StepOutcome::Done)
            }
        },
    )
    .await
    .expect("spawn");

    let finished = wait_for_task_completion(&store, &task_id, Duration::from_secs(5))
        .await
        .expect("terminal state");
    handle.await.expect("join").expect("transfer");

    assert_eq!(finished.status, ProgressStatus::Failed);
    assert_eq!(finished.completed, 1);
    assert_eq!(finished.errors, vec!["tags: archive closed".to_string()]);
}
