// Telemetry module for structured logging and metric registration

use anyhow::Result;
use metrics::describe_counter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set, falling back to the configured
/// level. JSON formatting is used when `json_logs` is set; plain formatting
/// otherwise.
pub fn init_logging(log_level: &str, json_logs: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let registry = tracing_subscriber::registry();
    if json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_filter(env_filter),
            )
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        registry
            .with(fmt::layer().with_target(true).with_filter(env_filter))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(log_level, json_logs, "Logging initialized");
    Ok(())
}

/// Register descriptions for the metrics the dispatcher emits
pub fn describe_metrics() {
    describe_counter!(
        "scheduler_jobs_claimed_total",
        "Due jobs claimed by poll cycles"
    );
    describe_counter!(
        "scheduler_executions_succeeded_total",
        "Job executions that completed successfully"
    );
    describe_counter!(
        "scheduler_executions_failed_total",
        "Job executions that failed terminally"
    );
    describe_counter!(
        "scheduler_execution_retries_total",
        "Failed attempts that were retried"
    );
}
