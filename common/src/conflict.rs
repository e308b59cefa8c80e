// Conflict policy for creating a job whose name already exists

use crate::errors::StoreError;
use crate::models::Job;
use serde::{Deserialize, Serialize};

/// Specifies how to handle the case where a job with the same name has
/// already been created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateJobConflictAction {
    /// Fail the creation with a duplicate-name error
    #[default]
    Throw,
    /// Replace the existing job's definition with the new one
    Update,
    /// Keep the existing job untouched and report success
    Ignore,
}

/// Resolution applied by the store after a conflict is detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Replace the whole stored definition; the name is preserved and
    /// execution history starts over
    Replace,
    /// Leave the existing record exactly as it is
    Keep,
}

/// Decide what to do about a creation that collided on name.
///
/// This is pure policy. The calling store must hold its per-name lock across
/// both the collision check and the applied resolution, so the two form one
/// atomic step and no concurrent creation can race between them.
pub fn resolve_conflict(
    action: CreateJobConflictAction,
    existing: &Job,
) -> Result<ConflictResolution, StoreError> {
    match action {
        CreateJobConflictAction::Throw => Err(StoreError::DuplicateName(existing.name.clone())),
        CreateJobConflictAction::Update => Ok(ConflictResolution::Replace),
        CreateJobConflictAction::Ignore => Ok(ConflictResolution::Keep),
    }
}
