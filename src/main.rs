use std::{process, sync::Arc, time::Duration};

use quire::{
    application::{
        error::AppError,
        jobs::{
            StepError, StepOutcome, TransferKind, spawn_transfer, wait_for_task_completion,
        },
        posts::{POSTS_LIST_NAMESPACE, PostListService},
        progress::ProgressStore,
        repos::PostQueryFilter,
    },
    cache::{BackgroundTasks, CacheConfig, CacheService, MemoryBackend},
    config,
    domain::{posts::PostSummary, progress::TaskProgress},
    infra::{posts::InMemoryPostsRepo, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?error.chain(), "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?error.chain(), "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Simulate(config::SimulateArgs::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Simulate(_) => run_simulate(settings).await,
    }
}

async fn run_simulate(settings: config::Settings) -> Result<(), AppError> {
    let backend = Arc::new(MemoryBackend::new());
    let sweeper = backend.spawn_sweeper(settings.cache.sweep_interval);
    let cache = Arc::new(CacheService::new(
        CacheConfig::from(&settings.cache),
        backend,
        Arc::new(BackgroundTasks::new()),
    ));

    let outcome = simulate_import(&cache, &settings.simulate).await;
    let listing = simulate_listing(&cache).await;

    cache.drain_background().await;
    info!("background cache writes drained");

    sweeper.abort();
    let _ = sweeper.await;

    outcome?;
    listing
}

async fn simulate_import(
    cache: &Arc<CacheService>,
    simulate: &config::SimulateSettings,
) -> Result<(), AppError> {
    let store = ProgressStore::new(cache.clone());
    let items: Vec<String> = (1..=simulate.items.get())
        .map(|index| format!("post-{index:03}.md"))
        .collect();
    let step_delay = simulate.step_delay;

    let (task_id, handle) = spawn_transfer(&store, TransferKind::Import, items, move |item| {
        async move {
            tokio::time::sleep(step_delay).await;
            if item.ends_with("007.md") {
                Err(StepError::Skip("front matter is not valid TOML".to_string()))
            } else if item.ends_with("5.md") {
                Ok(StepOutcome::DoneWithWarning("missing excerpt".to_string()))
            } else {
                Ok(StepOutcome::Done)
            }
        }
    })
    .await?;
    info!(task_id = %task_id, "import simulation started");

    let poller = tokio::spawn(poll_progress(
        store.clone(),
        task_id.clone(),
        simulate.poll_interval,
    ));

    let waited = wait_for_task_completion(&store, &task_id, simulate.timeout).await;
    if waited.is_err() {
        handle.abort();
        poller.abort();
    }
    let finished = waited?;

    handle
        .await
        .map_err(|err| AppError::unexpected(format!("import task panicked: {err}")))??;
    poller
        .await
        .map_err(|err| AppError::unexpected(format!("progress poller panicked: {err}")))??;

    info!(
        task_id = %task_id,
        status = %finished.status,
        completed = finished.completed,
        errors = finished.errors.len(),
        warnings = finished.warnings.len(),
        "import simulation finished"
    );
    store.clear(&task_id).await;
    Ok(())
}

/// Print each distinct snapshot as one JSON line until the task is terminal.
async fn poll_progress(
    store: ProgressStore,
    task_id: String,
    interval: Duration,
) -> Result<(), AppError> {
    let mut ticker = tokio::time::interval(interval);
    let mut last: Option<TaskProgress> = None;

    loop {
        ticker.tick().await;
        let Some(snapshot) = store.get(&task_id).await else {
            continue;
        };
        if last.as_ref() != Some(&snapshot) {
            let line = serde_json::to_string(&snapshot)
                .map_err(|err| AppError::unexpected(format!("failed to encode snapshot: {err}")))?;
            println!("{line}");
        }
        if snapshot.is_terminal() {
            return Ok(());
        }
        last = Some(snapshot);
    }
}

async fn simulate_listing(cache: &Arc<CacheService>) -> Result<(), AppError> {
    let repo = Arc::new(InMemoryPostsRepo::new());
    let service = PostListService::new(cache.clone(), repo.clone(), repo.clone());
    let filter = PostQueryFilter::default();

    service.publish(demo_post("tuning-drop-d", &["tabs"])).await?;
    cache.drain_background().await;

    let first = service.list(&filter, 10, 0).await?;
    cache.drain_background().await;
    let second = service.list(&filter, 10, 0).await?;
    let served_from_cache = first == second && repo.list_calls() == 1;
    info!(
        items = second.items.len(),
        repo_queries = repo.list_calls(),
        served_from_cache,
        "listing read twice"
    );

    service.publish(demo_post("new-strings", &["gear"])).await?;
    let refreshed = service.list(&filter, 10, 0).await?;
    let version = cache.get_cache_version(POSTS_LIST_NAMESPACE).await;
    info!(
        items = refreshed.items.len(),
        repo_queries = repo.list_calls(),
        version = %version,
        "listing refreshed after publish"
    );

    Ok(())
}

fn demo_post(slug: &str, tags: &[&str]) -> PostSummary {
    PostSummary {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        title: slug.replace('-', " "),
        excerpt: String::new(),
        theme: "default".to_string(),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
    }
}
