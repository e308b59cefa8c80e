// Scheduler service entry point

use common::config::{Settings, StoreBackend};
use common::db::DbPool;
use common::dispatcher::Dispatcher;
use common::runner::{HttpRunner, RunnerRegistry};
use common::scheduler::JobScheduler;
use common::store::{JobStore, MemoryJobStore, PostgresJobStore};
use common::telemetry;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let settings = Settings::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.json_logs,
    )?;
    telemetry::describe_metrics();

    info!("Starting job scheduler service");

    // Select the store backend
    let store: Arc<dyn JobStore> = match settings.store.backend {
        StoreBackend::Postgres => {
            let database = settings
                .store
                .database
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Postgres backend requires store.database settings"))?;
            info!("Initializing PostgreSQL job store");
            let pool = DbPool::new(database).await.map_err(|e| {
                error!(error = %e, "Failed to initialize database pool");
                anyhow::anyhow!("{e}")
            })?;
            let store = PostgresJobStore::new(pool);
            store
                .ensure_schema()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to prepare job table: {e}"))?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory job store; jobs will not survive a restart");
            Arc::new(MemoryJobStore::new())
        }
    };

    // Register payload runners
    let mut registry = RunnerRegistry::new();
    let http_runner = HttpRunner::new(settings.dispatcher.execution_timeout_seconds)
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP runner: {e}"))?;
    registry.register("http", Arc::new(http_runner));
    info!(kinds = ?registry.kinds(), "Payload runners registered");

    let dispatcher = Dispatcher::new(
        Arc::clone(&store),
        Arc::new(registry),
        Arc::new(settings.dispatcher.retry_strategy()),
        settings.dispatcher.to_config(),
    );

    let scheduler = Arc::new(JobScheduler::new(
        settings.scheduler.to_config(),
        store,
        dispatcher,
    ));

    // Graceful shutdown on ctrl-c
    let scheduler_for_shutdown = Arc::clone(&scheduler);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            error!("Failed to listen for shutdown signal");
            return;
        }
        info!("Received ctrl-c, initiating graceful shutdown");
        scheduler_for_shutdown.stop().await;
    });

    info!("Starting scheduler polling loop");
    if let Err(e) = scheduler.start().await {
        error!(error = %e, "Scheduler halted");
        return Err(anyhow::anyhow!("{e}"));
    }

    info!("Scheduler service stopped");
    Ok(())
}
