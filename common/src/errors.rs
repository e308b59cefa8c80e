// Error handling framework

use thiserror::Error;

/// Schedule-related errors
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid schedule configuration: {0}")]
    InvalidConfiguration(String),
}

/// Job store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("A job named '{0}' already exists")]
    DuplicateName(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Invalid job specification: {0}")]
    InvalidSpec(String),

    #[error("Stale version for job '{name}': expected {expected}, found {actual}")]
    VersionConflict {
        name: String,
        expected: i64,
        actual: i64,
    },

    #[error("Job store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Fatal errors abort the poll cycle; the rest are per-operation outcomes
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    /// Lost races during claim/transition are expected under concurrency and
    /// should be skipped, not escalated
    pub fn is_lost_race(&self) -> bool {
        matches!(
            self,
            StoreError::VersionConflict { .. } | StoreError::NotFound(_)
        )
    }
}

/// Job execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Payload execution failed: {0}")]
    PayloadFailed(String),

    #[error("Execution timeout after {0} seconds")]
    Timeout(u64),

    #[error("Execution cancelled")]
    Cancelled,

    #[error("No runner registered for payload kind: {0}")]
    UnknownPayloadKind(String),

    #[error("Invalid payload parameters: {0}")]
    InvalidParams(String),

    #[error("HTTP request failed: {0}")]
    HttpRequestFailed(String),

    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
}

impl ExecutionError {
    /// Transient failures are retried; definition problems and cancellation
    /// are terminal on the first occurrence
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ExecutionError::Cancelled
                | ExecutionError::UnknownPayloadKind(_)
                | ExecutionError::InvalidParams(_)
        )
    }
}

/// Facade-level error covering every scheduler operation
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

// Implement From for common external errors
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                if db_err.code().as_deref() == Some("23505") {
                    StoreError::DuplicateName(db_err.message().to_string())
                } else {
                    StoreError::Unavailable(db_err.message().to_string())
                }
            }
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
