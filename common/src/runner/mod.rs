// Job payload execution interface

pub mod http;

pub use http::HttpRunner;

use crate::errors::ExecutionError;
use crate::models::Job;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Context handed to a runner for a single execution attempt
#[derive(Clone)]
pub struct JobContext {
    pub job_name: String,
    /// Identifier shared by every attempt of one execution
    pub execution_id: Uuid,
    pub fire_time: DateTime<Utc>,
    /// Zero-based attempt number; greater than zero on retries
    pub attempt: u32,
    pub params: serde_json::Value,
    cancellation: CancellationToken,
}

impl JobContext {
    pub fn new(
        job: &Job,
        execution_id: Uuid,
        fire_time: DateTime<Utc>,
        attempt: u32,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            job_name: job.name.clone(),
            execution_id,
            fire_time,
            attempt,
            params: job.payload.params.clone(),
            cancellation,
        }
    }

    /// Token a long-running payload should observe for cooperative
    /// cancellation
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// A runner executes one kind of job payload
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, ctx: &JobContext) -> Result<(), ExecutionError>;
}

/// Registry mapping payload kinds to their runners
#[derive(Default)]
pub struct RunnerRegistry {
    runners: HashMap<String, Arc<dyn JobRunner>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, runner: Arc<dyn JobRunner>) {
        self.runners.insert(kind.into(), runner);
    }

    pub fn get(&self, kind: &str) -> Result<Arc<dyn JobRunner>, ExecutionError> {
        self.runners
            .get(kind)
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownPayloadKind(kind.to_string()))
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.runners.keys().map(String::as_str).collect()
    }
}
