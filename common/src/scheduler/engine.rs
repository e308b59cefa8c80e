// Scheduler facade and polling loop

use crate::conflict::CreateJobConflictAction;
use crate::dispatcher::Dispatcher;
use crate::errors::SchedulerError;
use crate::models::{Job, JobSpec};
use crate::schedule::ScheduleTrigger;
use crate::store::{CreateOutcome, JobStore};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep};
use tracing::{debug, error, info, instrument};

/// Configuration for the scheduler polling loop
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often to poll for due jobs
    pub poll_interval: Duration,
    /// Maximum number of jobs to claim per poll
    pub max_jobs_per_poll: usize,
    /// Consecutive fatal store failures tolerated before the loop halts
    pub store_failure_budget: u32,
    /// How long `stop` waits for in-flight executions to finish
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_jobs_per_poll: 100,
            store_failure_budget: 5,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// Receipt returned by `create_job`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub name: String,
    pub outcome: CreateOutcome,
}

/// Public entry point composing the store, conflict policy, trigger engine,
/// and dispatcher
pub struct JobScheduler {
    config: SchedulerConfig,
    store: Arc<dyn JobStore>,
    dispatcher: Dispatcher,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl JobScheduler {
    pub fn new(config: SchedulerConfig, store: Arc<dyn JobStore>, dispatcher: Dispatcher) -> Self {
        let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel(1);
        Self {
            config,
            store,
            dispatcher,
            shutdown_tx,
        }
    }

    /// Get a shutdown signal receiver
    pub fn shutdown_receiver(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Register a job, resolving name conflicts per `action`
    #[instrument(skip(self, spec), fields(job_name = %spec.name))]
    pub async fn create_job(
        &self,
        spec: JobSpec,
        action: CreateJobConflictAction,
    ) -> Result<JobHandle, SchedulerError> {
        spec.schedule.validate()?;
        let name = spec.name.clone();
        let outcome = self.store.create_job(spec, action, Utc::now()).await?;
        info!(outcome = ?outcome, "Job registered");
        Ok(JobHandle { name, outcome })
    }

    pub async fn get_job(&self, name: &str) -> Result<Job, SchedulerError> {
        Ok(self.store.get_job(name).await?)
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>, SchedulerError> {
        Ok(self.store.list_jobs().await?)
    }

    /// Replace a job's definition wholesale
    #[instrument(skip(self, spec))]
    pub async fn update_job(&self, name: &str, spec: JobSpec) -> Result<(), SchedulerError> {
        spec.schedule.validate()?;
        Ok(self.store.update_job(name, spec, Utc::now()).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_job(&self, name: &str) -> Result<(), SchedulerError> {
        Ok(self.store.delete_job(name).await?)
    }

    /// Request cooperative cancellation of a running execution. Returns
    /// false when the job exists but has nothing in flight.
    pub async fn cancel_job(&self, name: &str) -> Result<bool, SchedulerError> {
        self.store.get_job(name).await?;
        Ok(self.dispatcher.cancel(name).await)
    }

    /// Run the polling loop until `stop` is called.
    ///
    /// Fatal store errors back the loop off exponentially; once the failure
    /// budget is exhausted the loop halts and the error is returned.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), SchedulerError> {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Starting scheduler"
        );

        let mut poll_interval = interval(self.config.poll_interval);
        let mut shutdown_rx = self.shutdown_receiver();
        let mut consecutive_failures: u32 = 0;

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    match self
                        .dispatcher
                        .poll_due_jobs(Utc::now(), self.config.max_jobs_per_poll)
                        .await
                    {
                        Ok(count) => {
                            consecutive_failures = 0;
                            if count > 0 {
                                debug!(jobs_claimed = count, "Poll cycle complete");
                            }
                        }
                        Err(e) if e.is_fatal() => {
                            consecutive_failures += 1;
                            error!(
                                error = %e,
                                consecutive_failures,
                                "Store unavailable during poll cycle"
                            );
                            if consecutive_failures >= self.config.store_failure_budget {
                                error!("Store failure budget exhausted, halting scheduler");
                                return Err(SchedulerError::Store(e));
                            }
                            let backoff = self
                                .config
                                .poll_interval
                                .saturating_mul(2_u32.saturating_pow(consecutive_failures).min(64));
                            sleep(backoff).await;
                        }
                        Err(e) => {
                            error!(error = %e, "Error processing due jobs");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping scheduler");
                    break;
                }
            }
        }

        info!("Scheduler stopped");
        Ok(())
    }

    /// Signal the polling loop to exit and wait for in-flight executions
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        info!("Stopping scheduler");
        let _ = self.shutdown_tx.send(());
        self.dispatcher.drain(self.config.shutdown_grace).await;
        info!("Scheduler stopped gracefully");
    }
}
