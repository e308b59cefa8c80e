use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// Helper functions for Tz serialization
fn serialize_tz<S>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&tz.to_string())
}

fn deserialize_tz<'de, D>(deserializer: D) -> Result<Tz, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Tz::from_str(&s).map_err(serde::de::Error::custom)
}

// ============================================================================
// Schedule Models
// ============================================================================

/// Schedule defines when a job should fire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Fire exactly once at the given instant
    OneShot {
        fire_at: DateTime<Utc>,
    },
    /// Fire every `interval_seconds`, measured from the previous fire time
    FixedRate {
        interval_seconds: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_at: Option<DateTime<Utc>>,
    },
    /// Fire `delay_seconds` after the previous execution completed
    FixedDelay {
        delay_seconds: u32,
    },
    /// Calendar-based recurrence from a cron expression
    Cron {
        expression: String,
        #[serde(serialize_with = "serialize_tz", deserialize_with = "deserialize_tz")]
        timezone: Tz,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_date: Option<DateTime<Utc>>,
    },
}

// ============================================================================
// Job Models
// ============================================================================

/// JobPayload identifies the work a job performs: a runner kind plus its
/// JSON parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl JobPayload {
    pub fn new(kind: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }
}

/// JobSpec is the caller-supplied definition of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub schedule: Schedule,
    pub payload: JobPayload,
    /// Per-job override of the dispatcher's retry budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, schedule: Schedule, payload: JobPayload) -> Self {
        Self {
            name: name.into(),
            schedule,
            payload,
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Lifecycle state of a job record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for its next fire time
    Scheduled,
    /// Claimed by a dispatcher, not yet running
    Triggered,
    /// Payload currently executing
    Running,
    /// One-shot work completed; terminal
    Succeeded,
    /// Retries exhausted or cancelled; terminal
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Scheduled => "scheduled",
            JobState::Triggered => "triggered",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(JobState::Scheduled),
            "triggered" => Ok(JobState::Triggered),
            "running" => Ok(JobState::Running),
            "succeeded" => Ok(JobState::Succeeded),
            "failed" => Ok(JobState::Failed),
            other => Err(format!("unknown job state: {}", other)),
        }
    }
}

/// Job is the stored record for a named unit of schedulable work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub schedule: Schedule,
    pub payload: JobPayload,
    pub max_retries: Option<u32>,
    pub state: JobState,
    /// Monotonic counter guarding compare-and-swap state transitions
    pub version: i64,
    pub retry_count: u32,
    pub last_fire_time: Option<DateTime<Utc>>,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build a fresh record from a spec, in `Scheduled` state with zeroed
    /// execution history
    pub fn from_spec(spec: JobSpec, next_fire_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        Self {
            name: spec.name,
            schedule: spec.schedule,
            payload: spec.payload,
            max_retries: spec.max_retries,
            state: JobState::Scheduled,
            version: 0,
            retry_count: 0,
            last_fire_time: None,
            next_fire_time,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstruct the caller-facing spec from a stored record
    pub fn spec(&self) -> JobSpec {
        JobSpec {
            name: self.name.clone(),
            schedule: self.schedule.clone(),
            payload: self.payload.clone(),
            max_retries: self.max_retries,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Scheduled && self.next_fire_time.is_some_and(|t| t <= now)
    }
}

/// What happens to a one-shot job record after it completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Keep the terminal record queryable
    #[default]
    Retain,
    /// Delete the record once the outcome is recorded
    Remove,
}
