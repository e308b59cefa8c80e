// Job store trait and backends

pub mod memory;
pub mod postgres;

pub use memory::MemoryJobStore;
pub use postgres::PostgresJobStore;

use crate::conflict::CreateJobConflictAction;
use crate::errors::StoreError;
use crate::models::{Job, JobSpec};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Result of a create operation, including how a name conflict was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new job record was inserted
    Created {
        next_fire_time: Option<DateTime<Utc>>,
    },
    /// An existing record was replaced under the `Update` policy
    Updated {
        next_fire_time: Option<DateTime<Utc>>,
    },
    /// An existing record was kept under the `Ignore` policy
    Ignored,
}

impl CreateOutcome {
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        match self {
            CreateOutcome::Created { next_fire_time } | CreateOutcome::Updated { next_fire_time } => {
                *next_fire_time
            }
            CreateOutcome::Ignored => None,
        }
    }
}

/// Name-indexed durable registry of job records.
///
/// All mutations are atomic with respect to concurrent readers, and state
/// transitions are guarded by the record's version counter so that exactly
/// one caller wins any race. Locking is scoped per job name; operations on
/// unrelated jobs never contend.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a job, resolving a name collision per `action` in one atomic
    /// step with the collision check.
    async fn create_job(
        &self,
        spec: JobSpec,
        action: CreateJobConflictAction,
        now: DateTime<Utc>,
    ) -> Result<CreateOutcome, StoreError>;

    async fn get_job(&self, name: &str) -> Result<Job, StoreError>;

    /// Replace a job's whole definition, resetting execution history
    async fn update_job(
        &self,
        name: &str,
        spec: JobSpec,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn delete_job(&self, name: &str) -> Result<(), StoreError>;

    async fn list_jobs(&self) -> Result<Vec<Job>, StoreError>;

    /// Atomically claim up to `limit` due jobs, transitioning each from
    /// `Scheduled` to `Triggered`. A given job instance is claimed by exactly
    /// one caller; the returned snapshots carry the post-claim version.
    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError>;

    /// Transition a claimed job from `Triggered` to `Running`
    async fn mark_running(
        &self,
        name: &str,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<Job, StoreError>;

    /// Record a failed attempt that will be retried; the job stays `Running`
    /// and its retry count is incremented
    async fn record_retry(
        &self,
        name: &str,
        expected_version: i64,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<Job, StoreError>;

    /// Record a successful execution. With a next fire time the job returns
    /// to `Scheduled` (retry count reset); without one it is terminal
    /// `Succeeded`.
    async fn record_success(
        &self,
        name: &str,
        expected_version: i64,
        fired_at: DateTime<Utc>,
        next_fire_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Record a terminal failure after retry exhaustion or cancellation
    async fn record_failure(
        &self,
        name: &str,
        expected_version: i64,
        fired_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Shared pre-insert validation for store backends
pub(crate) fn validate_spec(spec: &JobSpec) -> Result<(), StoreError> {
    use crate::schedule::ScheduleTrigger;

    if spec.name.trim().is_empty() {
        return Err(StoreError::InvalidSpec(
            "job name must not be empty".to_string(),
        ));
    }
    spec.schedule
        .validate()
        .map_err(|e| StoreError::InvalidSpec(e.to_string()))
}
