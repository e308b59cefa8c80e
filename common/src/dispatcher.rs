// Due-job claiming and execution coordination
//
// The dispatcher claims due jobs through the store's compare-and-swap
// operations, runs their payloads on a semaphore-bounded worker pool, and
// records outcomes. No store lock is held while a payload runs; the claim
// itself is the only mutual exclusion.

use crate::errors::StoreError;
use crate::models::{Job, RetentionPolicy, Schedule};
use crate::retry::RetryStrategy;
use crate::runner::{JobContext, JobRunner, RunnerRegistry};
use crate::schedule::ScheduleTrigger;
use crate::store::JobStore;
use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Configuration for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum number of payloads executing at once
    pub concurrency: usize,
    /// Wall-clock budget for a single execution attempt
    pub execution_timeout: Duration,
    /// What happens to one-shot records after completion
    pub retention: RetentionPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            execution_timeout: Duration::from_secs(300),
            retention: RetentionPolicy::Retain,
        }
    }
}

/// Claims due jobs and drives them through execution
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    runners: Arc<RunnerRegistry>,
    retry: Arc<dyn RetryStrategy>,
    config: DispatcherConfig,
    permits: Arc<Semaphore>,
    cancellations: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        runners: Arc<RunnerRegistry>,
        retry: Arc<dyn RetryStrategy>,
        config: DispatcherConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.concurrency));
        Self {
            store,
            runners,
            retry,
            config,
            permits,
            cancellations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Claim up to `limit` due jobs and hand each to a worker task.
    ///
    /// Store errors abort the cycle and propagate to the caller; individual
    /// execution outcomes are recorded against their job records instead.
    #[instrument(skip(self))]
    pub async fn poll_due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<usize, StoreError> {
        let claimed = self.store.claim_due_jobs(now, limit).await?;
        let count = claimed.len();
        if count > 0 {
            counter!("scheduler_jobs_claimed_total").increment(count as u64);
            debug!(count, "Claimed due jobs");
        }

        for job in claimed {
            let worker = self.clone();
            tokio::spawn(async move {
                let permit = match worker.permits.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                worker.execute_claimed(job).await;
                drop(permit);
            });
        }

        Ok(count)
    }

    /// Request cooperative cancellation of a running execution.
    /// Returns false when the job has no execution in flight.
    pub async fn cancel(&self, name: &str) -> bool {
        match self.cancellations.read().await.get(name) {
            Some(token) => {
                info!(job_name = %name, "Cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Wait until every in-flight execution has finished, up to `grace`
    pub async fn drain(&self, grace: Duration) {
        let all = self.config.concurrency as u32;
        match tokio::time::timeout(grace, self.permits.acquire_many(all)).await {
            Ok(Ok(permits)) => drop(permits),
            Ok(Err(_)) => {}
            Err(_) => {
                warn!(
                    grace_seconds = grace.as_secs(),
                    "Shutdown grace period elapsed with executions still in flight"
                );
            }
        }
    }

    async fn execute_claimed(&self, job: Job) {
        let name = job.name.clone();
        let token = CancellationToken::new();
        self.cancellations
            .write()
            .await
            .insert(name.clone(), token.clone());

        let result = self.execute_job(job, token).await;
        self.cancellations.write().await.remove(&name);

        match result {
            Ok(()) => {}
            Err(e) if e.is_lost_race() => {
                debug!(job_name = %name, error = %e, "Claim superseded, skipping")
            }
            Err(e) => {
                error!(job_name = %name, error = %e, "Failed to record execution outcome")
            }
        }
    }

    #[instrument(skip(self, claimed, token), fields(job_name = %claimed.name))]
    async fn execute_job(&self, claimed: Job, token: CancellationToken) -> Result<(), StoreError> {
        let fired_at = Utc::now();
        let execution_id = Uuid::new_v4();
        let mut job = self
            .store
            .mark_running(&claimed.name, claimed.version, fired_at)
            .await?;
        info!(execution_id = %execution_id, "Job execution started");

        let runner = match self.runners.get(&job.payload.kind) {
            Ok(runner) => runner,
            Err(e) => {
                warn!(payload_kind = %job.payload.kind, "No runner for payload kind");
                counter!("scheduler_executions_failed_total").increment(1);
                return self
                    .store
                    .record_failure(&job.name, job.version, fired_at, &e.to_string(), Utc::now())
                    .await;
            }
        };

        let max_retries = job.max_retries.unwrap_or_else(|| self.retry.max_retries());
        let mut attempt: u32 = 0;
        loop {
            let ctx = JobContext::new(&job, execution_id, fired_at, attempt, token.clone());
            match self.run_attempt(runner.as_ref(), &ctx, &token).await {
                Ok(()) => {
                    let completed_at = Utc::now();
                    let next_fire_time = self.next_fire_after(&job, fired_at, completed_at);
                    self.store
                        .record_success(&job.name, job.version, fired_at, next_fire_time, completed_at)
                        .await?;
                    counter!("scheduler_executions_succeeded_total").increment(1);
                    info!(attempt, "Job execution succeeded");

                    if next_fire_time.is_none() && self.config.retention == RetentionPolicy::Remove {
                        if let Err(e) = self.store.delete_job(&job.name).await {
                            debug!(error = %e, "Completed job already removed");
                        }
                    }
                    return Ok(());
                }
                Err(err) => {
                    if err.is_retryable() && attempt < max_retries {
                        job = self
                            .store
                            .record_retry(&job.name, job.version, &err.to_string(), Utc::now())
                            .await?;
                        let delay = self.retry.delay(attempt);
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Job attempt failed, retrying"
                        );
                        counter!("scheduler_execution_retries_total").increment(1);
                        attempt += 1;
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    self.store
                        .record_failure(&job.name, job.version, fired_at, &err.to_string(), Utc::now())
                        .await?;
                    counter!("scheduler_executions_failed_total").increment(1);
                    warn!(attempt, error = %err, "Job execution failed terminally");
                    return Ok(());
                }
            }
        }
    }

    async fn run_attempt(
        &self,
        runner: &dyn JobRunner,
        ctx: &JobContext,
        token: &CancellationToken,
    ) -> Result<(), crate::errors::ExecutionError> {
        use crate::errors::ExecutionError;

        let timeout = self.config.execution_timeout;
        tokio::select! {
            _ = token.cancelled() => Err(ExecutionError::Cancelled),
            result = tokio::time::timeout(timeout, runner.run(ctx)) => match result {
                Ok(inner) => inner,
                Err(_) => Err(ExecutionError::Timeout(timeout.as_secs())),
            },
        }
    }

    /// Compute the follow-up fire time once an execution has succeeded.
    /// Fixed-delay schedules measure from completion; everything else from
    /// the fire that just happened.
    fn next_fire_after(
        &self,
        job: &Job,
        fired_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let reference = match &job.schedule {
            Schedule::FixedDelay { .. } => completed_at,
            _ => fired_at,
        };
        match job.schedule.next_fire_time(Some(reference), completed_at) {
            Ok(next) => next,
            Err(e) => {
                warn!(job_name = %job.name, error = %e, "Failed to compute next fire time");
                None
            }
        }
    }
}
