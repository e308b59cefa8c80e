// End-to-end scenarios against the in-memory store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::conflict::CreateJobConflictAction;
use common::dispatcher::{Dispatcher, DispatcherConfig};
use common::errors::{ExecutionError, SchedulerError, StoreError};
use common::models::{Job, JobPayload, JobSpec, JobState, Schedule};
use common::retry::FixedDelay;
use common::runner::{JobContext, JobRunner, RunnerRegistry};
use common::scheduler::{JobScheduler, SchedulerConfig};
use common::store::{CreateOutcome, JobStore, MemoryJobStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// Runner that reports when it starts and then waits for a release signal
struct GatedRunner {
    started: mpsc::UnboundedSender<()>,
    release: Arc<Notify>,
}

#[async_trait]
impl JobRunner for GatedRunner {
    async fn run(&self, _ctx: &JobContext) -> Result<(), ExecutionError> {
        let _ = self.started.send(());
        self.release.notified().await;
        Ok(())
    }
}

/// Runner that fails every attempt and counts them
struct CountingFailRunner {
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl JobRunner for CountingFailRunner {
    async fn run(&self, _ctx: &JobContext) -> Result<(), ExecutionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ExecutionError::PayloadFailed("always fails".to_string()))
    }
}

struct NoopRunner;

#[async_trait]
impl JobRunner for NoopRunner {
    async fn run(&self, _ctx: &JobContext) -> Result<(), ExecutionError> {
        Ok(())
    }
}

fn build_scheduler(
    store: Arc<MemoryJobStore>,
    kind: &str,
    runner: Arc<dyn JobRunner>,
) -> Arc<JobScheduler> {
    let mut registry = RunnerRegistry::new();
    registry.register(kind, runner);

    let dispatcher = Dispatcher::new(
        store.clone() as Arc<dyn JobStore>,
        Arc::new(registry),
        Arc::new(FixedDelay::new(Duration::from_millis(5), 3)),
        DispatcherConfig::default(),
    );

    let config = SchedulerConfig {
        poll_interval: Duration::from_millis(20),
        max_jobs_per_poll: 100,
        store_failure_budget: 5,
        shutdown_grace: Duration::from_secs(2),
    };
    Arc::new(JobScheduler::new(config, store, dispatcher))
}

fn one_shot_spec(name: &str, kind: &str, fire_at: DateTime<Utc>) -> JobSpec {
    JobSpec::new(
        name,
        Schedule::OneShot { fire_at },
        JobPayload::new(kind, serde_json::json!({})),
    )
}

async fn wait_for(
    scheduler: &JobScheduler,
    name: &str,
    pred: impl Fn(&Job) -> bool,
) -> Job {
    for _ in 0..500 {
        if let Ok(job) = scheduler.get_job(name).await {
            if pred(&job) {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached for job '{name}'");
}

#[tokio::test]
async fn test_one_shot_job_runs_to_completion() {
    let store = Arc::new(MemoryJobStore::new());
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let scheduler = build_scheduler(
        Arc::clone(&store),
        "gated",
        Arc::new(GatedRunner {
            started: started_tx,
            release: Arc::clone(&release),
        }),
    );

    let loop_handle = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.start().await })
    };

    scheduler
        .create_job(
            one_shot_spec("Backup", "gated", Utc::now()),
            CreateJobConflictAction::Throw,
        )
        .await
        .unwrap();

    // The payload is running once it signals
    tokio::time::timeout(Duration::from_secs(5), started_rx.recv())
        .await
        .expect("job never started")
        .unwrap();
    let job = scheduler.get_job("Backup").await.unwrap();
    assert_eq!(job.state, JobState::Running);

    release.notify_one();

    let job = wait_for(&scheduler, "Backup", |j| j.state.is_terminal()).await;
    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(job.next_fire_time, None);
    assert!(job.last_fire_time.is_some());

    scheduler.stop().await;
    loop_handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_create_twice_with_update_keeps_second_definition() {
    let store = Arc::new(MemoryJobStore::new());
    let scheduler = build_scheduler(Arc::clone(&store), "noop", Arc::new(NoopRunner));

    let first = JobSpec::new(
        "Report",
        Schedule::FixedRate {
            interval_seconds: 3600,
            start_at: None,
        },
        JobPayload::new("noop", serde_json::json!({"report": "daily"})),
    );
    let second = JobSpec::new(
        "Report",
        Schedule::FixedRate {
            interval_seconds: 7200,
            start_at: None,
        },
        JobPayload::new("noop", serde_json::json!({"report": "weekly"})),
    );

    let handle = scheduler
        .create_job(first, CreateJobConflictAction::Update)
        .await
        .unwrap();
    assert!(matches!(handle.outcome, CreateOutcome::Created { .. }));

    let handle = scheduler
        .create_job(second.clone(), CreateJobConflictAction::Update)
        .await
        .unwrap();
    assert!(matches!(handle.outcome, CreateOutcome::Updated { .. }));

    let job = scheduler.get_job("Report").await.unwrap();
    assert_eq!(job.spec(), second);
    assert_eq!(job.retry_count, 0);
    assert!(job.last_fire_time.is_none());
}

#[tokio::test]
async fn test_conflict_policies_against_existing_job() {
    let store = Arc::new(MemoryJobStore::new());
    let scheduler = build_scheduler(Arc::clone(&store), "noop", Arc::new(NoopRunner));

    let original = one_shot_spec("Nightly", "noop", Utc::now() + chrono::Duration::hours(1));
    scheduler
        .create_job(original.clone(), CreateJobConflictAction::Throw)
        .await
        .unwrap();

    // Throw: rejected, original untouched
    let replacement = one_shot_spec("Nightly", "noop", Utc::now() + chrono::Duration::hours(2));
    let err = scheduler
        .create_job(replacement.clone(), CreateJobConflictAction::Throw)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::Store(StoreError::DuplicateName(_))
    ));
    assert_eq!(scheduler.get_job("Nightly").await.unwrap().spec(), original);

    // Ignore: success, original still untouched
    let handle = scheduler
        .create_job(replacement, CreateJobConflictAction::Ignore)
        .await
        .unwrap();
    assert_eq!(handle.outcome, CreateOutcome::Ignored);
    assert_eq!(scheduler.get_job("Nightly").await.unwrap().spec(), original);
}

#[tokio::test]
async fn test_failing_job_retried_exactly_max_retries_times() {
    let store = Arc::new(MemoryJobStore::new());
    let attempts = Arc::new(AtomicUsize::new(0));
    let scheduler = build_scheduler(
        Arc::clone(&store),
        "failing",
        Arc::new(CountingFailRunner {
            attempts: Arc::clone(&attempts),
        }),
    );

    let loop_handle = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.start().await })
    };

    let spec = one_shot_spec("Doomed", "failing", Utc::now()).with_max_retries(2);
    scheduler
        .create_job(spec, CreateJobConflictAction::Throw)
        .await
        .unwrap();

    let job = wait_for(&scheduler, "Doomed", |j| j.state.is_terminal()).await;
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.retry_count, 2);
    // Initial attempt plus exactly two retries
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    scheduler.stop().await;
    loop_handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_cancel_running_job_marks_failed() {
    let store = Arc::new(MemoryJobStore::new());
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let scheduler = build_scheduler(
        Arc::clone(&store),
        "gated",
        Arc::new(GatedRunner {
            started: started_tx,
            release,
        }),
    );

    let loop_handle = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.start().await })
    };

    scheduler
        .create_job(
            one_shot_spec("Glacier", "gated", Utc::now()),
            CreateJobConflictAction::Throw,
        )
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), started_rx.recv())
        .await
        .expect("job never started")
        .unwrap();

    assert!(scheduler.cancel_job("Glacier").await.unwrap());

    let job = wait_for(&scheduler, "Glacier", |j| j.state.is_terminal()).await;
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.retry_count, 0);
    assert!(job.last_error.as_deref().unwrap().contains("cancelled"));

    scheduler.stop().await;
    loop_handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_concurrent_polls_claim_job_exactly_once() {
    let store = Arc::new(MemoryJobStore::new());
    let mut registry = RunnerRegistry::new();
    registry.register("noop", Arc::new(NoopRunner) as Arc<dyn JobRunner>);
    let dispatcher = Dispatcher::new(
        store.clone() as Arc<dyn JobStore>,
        Arc::new(registry),
        Arc::new(FixedDelay::new(Duration::from_millis(5), 0)),
        DispatcherConfig::default(),
    );

    let now = Utc::now();
    store
        .create_job(
            one_shot_spec("Contended", "noop", now),
            CreateJobConflictAction::Throw,
            now,
        )
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let dispatcher = dispatcher.clone();
        handles.push(tokio::spawn(async move {
            dispatcher.poll_due_jobs(now, 10).await.unwrap()
        }));
    }

    let mut total = 0;
    for handle in handles {
        total += handle.await.unwrap();
    }
    assert_eq!(total, 1);
}

/// Store stub whose every operation reports unavailability
struct UnavailableStore;

#[async_trait]
impl JobStore for UnavailableStore {
    async fn create_job(
        &self,
        _spec: JobSpec,
        _action: CreateJobConflictAction,
        _now: DateTime<Utc>,
    ) -> Result<CreateOutcome, StoreError> {
        Err(StoreError::Unavailable("store offline".to_string()))
    }

    async fn get_job(&self, _name: &str) -> Result<Job, StoreError> {
        Err(StoreError::Unavailable("store offline".to_string()))
    }

    async fn update_job(
        &self,
        _name: &str,
        _spec: JobSpec,
        _now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("store offline".to_string()))
    }

    async fn delete_job(&self, _name: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("store offline".to_string()))
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        Err(StoreError::Unavailable("store offline".to_string()))
    }

    async fn claim_due_jobs(
        &self,
        _now: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<Job>, StoreError> {
        Err(StoreError::Unavailable("store offline".to_string()))
    }

    async fn mark_running(
        &self,
        _name: &str,
        _expected_version: i64,
        _now: DateTime<Utc>,
    ) -> Result<Job, StoreError> {
        Err(StoreError::Unavailable("store offline".to_string()))
    }

    async fn record_retry(
        &self,
        _name: &str,
        _expected_version: i64,
        _error: &str,
        _now: DateTime<Utc>,
    ) -> Result<Job, StoreError> {
        Err(StoreError::Unavailable("store offline".to_string()))
    }

    async fn record_success(
        &self,
        _name: &str,
        _expected_version: i64,
        _fired_at: DateTime<Utc>,
        _next_fire_time: Option<DateTime<Utc>>,
        _now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("store offline".to_string()))
    }

    async fn record_failure(
        &self,
        _name: &str,
        _expected_version: i64,
        _fired_at: DateTime<Utc>,
        _error: &str,
        _now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("store offline".to_string()))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("store offline".to_string()))
    }
}

#[tokio::test]
async fn test_unavailable_store_halts_polling_loop() {
    let store: Arc<dyn JobStore> = Arc::new(UnavailableStore);
    let dispatcher = Dispatcher::new(
        Arc::clone(&store),
        Arc::new(RunnerRegistry::new()),
        Arc::new(FixedDelay::new(Duration::from_millis(5), 0)),
        DispatcherConfig::default(),
    );
    let config = SchedulerConfig {
        poll_interval: Duration::from_millis(10),
        max_jobs_per_poll: 10,
        store_failure_budget: 2,
        shutdown_grace: Duration::from_millis(100),
    };
    let scheduler = JobScheduler::new(config, store, dispatcher);

    let result = tokio::time::timeout(Duration::from_secs(10), scheduler.start())
        .await
        .expect("loop did not halt on store failure");
    match result {
        Err(SchedulerError::Store(e)) => assert!(e.is_fatal()),
        other => panic!("expected fatal store error, got {other:?}"),
    }
}
