// Schedule validation and next-fire-time calculation
//
// This module implements trigger computation for all schedule types:
// OneShot, FixedRate, FixedDelay, and Cron. Calculations are pure functions
// of their arguments: "now" is always passed explicitly, so the same inputs
// always produce the same next fire time.

use crate::errors::ScheduleError;
use crate::models::Schedule;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;

/// ScheduleTrigger defines the interface for computing fire times
pub trait ScheduleTrigger {
    /// Check the schedule for structural problems before it is stored
    fn validate(&self) -> Result<(), ScheduleError>;

    /// Compute the next fire time after `last_fire` (or from `now` for a job
    /// that has never fired). Returns `None` when the schedule is exhausted.
    fn next_fire_time(
        &self,
        last_fire: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ScheduleError>;

    /// Whether the schedule has no further fires after `last_fire`
    fn is_complete(&self, last_fire: Option<DateTime<Utc>>) -> bool;
}

impl ScheduleTrigger for Schedule {
    fn validate(&self) -> Result<(), ScheduleError> {
        match self {
            Schedule::OneShot { .. } => Ok(()),

            Schedule::FixedRate {
                interval_seconds, ..
            } => {
                if *interval_seconds == 0 {
                    return Err(ScheduleError::InvalidConfiguration(
                        "fixed rate interval must be greater than zero".to_string(),
                    ));
                }
                Ok(())
            }

            Schedule::FixedDelay { delay_seconds } => {
                if *delay_seconds == 0 {
                    return Err(ScheduleError::InvalidConfiguration(
                        "fixed delay must be greater than zero".to_string(),
                    ));
                }
                Ok(())
            }

            Schedule::Cron { expression, .. } => {
                parse_cron_expression(expression)?;
                Ok(())
            }
        }
    }

    fn next_fire_time(
        &self,
        last_fire: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        match self {
            Schedule::OneShot { fire_at } => Ok(one_shot_next(*fire_at, last_fire)),

            Schedule::FixedRate {
                interval_seconds,
                start_at,
            } => Ok(fixed_rate_next(*interval_seconds, *start_at, last_fire, now)),

            Schedule::FixedDelay { delay_seconds } => {
                Ok(fixed_delay_next(*delay_seconds, last_fire, now))
            }

            Schedule::Cron {
                expression,
                timezone,
                end_date,
            } => cron_next(expression, *timezone, *end_date, last_fire, now),
        }
    }

    fn is_complete(&self, last_fire: Option<DateTime<Utc>>) -> bool {
        match self {
            // One-shot schedules are complete after their single fire
            Schedule::OneShot { .. } => last_fire.is_some(),

            Schedule::Cron { end_date, .. } => match (end_date, last_fire) {
                (Some(end), Some(last)) => last >= *end,
                _ => false,
            },

            // Interval schedules never complete
            Schedule::FixedRate { .. } | Schedule::FixedDelay { .. } => false,
        }
    }
}

/// Parse and validate a cron expression
pub fn parse_cron_expression(expression: &str) -> Result<CronSchedule, ScheduleError> {
    CronSchedule::from_str(expression).map_err(|e| ScheduleError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

fn one_shot_next(
    fire_at: DateTime<Utc>,
    last_fire: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    if last_fire.is_some() {
        // Already fired, no next execution
        None
    } else {
        Some(fire_at)
    }
}

fn fixed_rate_next(
    interval_seconds: u32,
    start_at: Option<DateTime<Utc>>,
    last_fire: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match last_fire {
        // Next fire is one interval after the previous fire started
        Some(last) => Some(last + Duration::seconds(i64::from(interval_seconds))),
        None => Some(start_at.unwrap_or(now)),
    }
}

fn fixed_delay_next(
    delay_seconds: u32,
    last_fire: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match last_fire {
        // Next fire is the delay after the previous execution completed
        Some(last) => Some(last + Duration::seconds(i64::from(delay_seconds))),
        None => Some(now),
    }
}

fn cron_next(
    expression: &str,
    timezone: Tz,
    end_date: Option<DateTime<Utc>>,
    last_fire: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ScheduleError> {
    let schedule = parse_cron_expression(expression)?;

    let reference = last_fire.unwrap_or(now);
    let reference_in_tz = reference.with_timezone(&timezone);

    // Find the next fire in the schedule's timezone, then convert back
    let next_in_tz = match schedule.after(&reference_in_tz).next() {
        Some(next) => next,
        None => return Ok(None),
    };
    let next_utc = next_in_tz.with_timezone(&Utc);

    if let Some(end) = end_date {
        if next_utc > end {
            return Ok(None);
        }
    }

    Ok(Some(next_utc))
}
