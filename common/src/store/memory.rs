// In-process job store
//
// The map lock is held only to look up, insert, or remove entries; every job
// mutation happens under that job's own mutex. Writers on unrelated jobs
// never contend, and a claim is a compare-and-swap under the entry lock.

use crate::conflict::{resolve_conflict, ConflictResolution, CreateJobConflictAction};
use crate::errors::StoreError;
use crate::models::{Job, JobSpec, JobState};
use crate::schedule::ScheduleTrigger;
use crate::store::{validate_spec, CreateOutcome, JobStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

type Entry = Arc<Mutex<Job>>;

/// In-memory `JobStore` backend
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, Entry>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, name: &str) -> Result<Entry, StoreError> {
        self.jobs
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn check_version(job: &Job, expected: i64) -> Result<(), StoreError> {
        if job.version != expected {
            return Err(StoreError::VersionConflict {
                name: job.name.clone(),
                expected,
                actual: job.version,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(
        &self,
        spec: JobSpec,
        action: CreateJobConflictAction,
        now: DateTime<Utc>,
    ) -> Result<CreateOutcome, StoreError> {
        validate_spec(&spec)?;
        let next_fire_time = spec
            .schedule
            .next_fire_time(None, now)
            .map_err(|e| StoreError::InvalidSpec(e.to_string()))?;

        // The map write lock is held across the collision check and the
        // applied resolution, making them one atomic step.
        let mut map = self.jobs.write().await;
        match map.get(&spec.name) {
            None => {
                let job = Job::from_spec(spec, next_fire_time, now);
                debug!(job_name = %job.name, "Job created");
                map.insert(job.name.clone(), Arc::new(Mutex::new(job)));
                Ok(CreateOutcome::Created { next_fire_time })
            }
            Some(entry) => {
                let mut job = entry.lock().await;
                match resolve_conflict(action, &job)? {
                    ConflictResolution::Replace => {
                        let created_at = job.created_at;
                        // Version stays monotonic so stale claims of the old
                        // definition cannot transition the new one
                        let version = job.version + 1;
                        *job = Job::from_spec(spec, next_fire_time, now);
                        job.created_at = created_at;
                        job.version = version;
                        debug!(job_name = %job.name, "Job definition replaced on conflict");
                        Ok(CreateOutcome::Updated { next_fire_time })
                    }
                    ConflictResolution::Keep => {
                        debug!(job_name = %job.name, "Creation ignored, existing job kept");
                        Ok(CreateOutcome::Ignored)
                    }
                }
            }
        }
    }

    async fn get_job(&self, name: &str) -> Result<Job, StoreError> {
        let entry = self.entry(name).await?;
        let job = entry.lock().await;
        Ok(job.clone())
    }

    async fn update_job(
        &self,
        name: &str,
        spec: JobSpec,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if spec.name != name {
            return Err(StoreError::InvalidSpec(format!(
                "spec name '{}' does not match job '{}'",
                spec.name, name
            )));
        }
        validate_spec(&spec)?;
        let next_fire_time = spec
            .schedule
            .next_fire_time(None, now)
            .map_err(|e| StoreError::InvalidSpec(e.to_string()))?;

        let entry = self.entry(name).await?;
        let mut job = entry.lock().await;
        let created_at = job.created_at;
        let version = job.version + 1;
        *job = Job::from_spec(spec, next_fire_time, now);
        job.created_at = created_at;
        job.version = version;
        Ok(())
    }

    async fn delete_job(&self, name: &str) -> Result<(), StoreError> {
        let mut map = self.jobs.write().await;
        map.remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let entries: Vec<Entry> = self.jobs.read().await.values().cloned().collect();
        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            jobs.push(entry.lock().await.clone());
        }
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(jobs)
    }

    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let entries: Vec<Entry> = self.jobs.read().await.values().cloned().collect();

        let mut claimed = Vec::new();
        for entry in entries {
            if claimed.len() >= limit {
                break;
            }
            let mut job = entry.lock().await;
            if job.is_due(now) {
                job.state = JobState::Triggered;
                job.version += 1;
                job.updated_at = now;
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_running(
        &self,
        name: &str,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<Job, StoreError> {
        let entry = self.entry(name).await?;
        let mut job = entry.lock().await;
        Self::check_version(&job, expected_version)?;
        if job.state != JobState::Triggered {
            return Err(StoreError::VersionConflict {
                name: job.name.clone(),
                expected: expected_version,
                actual: job.version,
            });
        }
        job.state = JobState::Running;
        job.version += 1;
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn record_retry(
        &self,
        name: &str,
        expected_version: i64,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<Job, StoreError> {
        let entry = self.entry(name).await?;
        let mut job = entry.lock().await;
        Self::check_version(&job, expected_version)?;
        job.retry_count += 1;
        job.last_error = Some(error.to_string());
        job.version += 1;
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn record_success(
        &self,
        name: &str,
        expected_version: i64,
        fired_at: DateTime<Utc>,
        next_fire_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let entry = self.entry(name).await?;
        let mut job = entry.lock().await;
        Self::check_version(&job, expected_version)?;
        job.last_fire_time = Some(fired_at);
        job.next_fire_time = next_fire_time;
        job.retry_count = 0;
        job.last_error = None;
        job.state = if next_fire_time.is_some() {
            JobState::Scheduled
        } else {
            JobState::Succeeded
        };
        job.version += 1;
        job.updated_at = now;
        Ok(())
    }

    async fn record_failure(
        &self,
        name: &str,
        expected_version: i64,
        fired_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let entry = self.entry(name).await?;
        let mut job = entry.lock().await;
        Self::check_version(&job, expected_version)?;
        job.state = JobState::Failed;
        job.last_fire_time = Some(fired_at);
        job.next_fire_time = None;
        job.last_error = Some(error.to_string());
        job.version += 1;
        job.updated_at = now;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
