// Configuration management with layered sources (defaults, file, env)

use crate::dispatcher::DispatcherConfig;
use crate::models::RetentionPolicy;
use crate::retry::ExponentialBackoff;
use crate::scheduler::SchedulerConfig;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub scheduler: SchedulerSettings,
    pub dispatcher: DispatcherSettings,
    pub observability: ObservabilitySettings,
}

/// Which job store backend the service runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub poll_interval_seconds: u64,
    pub max_jobs_per_poll: usize,
    pub store_failure_budget: u32,
    pub shutdown_grace_seconds: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 10,
            max_jobs_per_poll: 100,
            store_failure_budget: 5,
            shutdown_grace_seconds: 30,
        }
    }
}

impl SchedulerSettings {
    pub fn to_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: Duration::from_secs(self.poll_interval_seconds),
            max_jobs_per_poll: self.max_jobs_per_poll,
            store_failure_budget: self.store_failure_budget,
            shutdown_grace: Duration::from_secs(self.shutdown_grace_seconds),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    pub concurrency: usize,
    pub max_retries: u32,
    pub execution_timeout_seconds: u64,
    pub retry_base_delay_seconds: u64,
    pub retry_max_delay_seconds: u64,
    pub retention: RetentionPolicy,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 3,
            execution_timeout_seconds: 300,
            retry_base_delay_seconds: 5,
            retry_max_delay_seconds: 1800,
            retention: RetentionPolicy::Retain,
        }
    }
}

impl DispatcherSettings {
    pub fn to_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            concurrency: self.concurrency,
            execution_timeout: Duration::from_secs(self.execution_timeout_seconds),
            retention: self.retention,
        }
    }

    pub fn retry_strategy(&self) -> ExponentialBackoff {
        ExponentialBackoff::with_config(
            self.retry_base_delay_seconds,
            self.retry_max_delay_seconds,
            0.1,
            self.max_retries,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilitySettings {
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("SCHEDULER")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.scheduler.poll_interval_seconds == 0 {
            return Err("Scheduler poll_interval_seconds must be greater than 0".to_string());
        }
        if self.scheduler.max_jobs_per_poll == 0 {
            return Err("Scheduler max_jobs_per_poll must be greater than 0".to_string());
        }
        if self.dispatcher.concurrency == 0 {
            return Err("Dispatcher concurrency must be greater than 0".to_string());
        }
        if self.dispatcher.execution_timeout_seconds == 0 {
            return Err("Dispatcher execution_timeout_seconds must be greater than 0".to_string());
        }
        if self.store.backend == StoreBackend::Postgres {
            let database = self
                .store
                .database
                .as_ref()
                .ok_or_else(|| "Postgres backend requires store.database settings".to_string())?;
            if database.url.is_empty() {
                return Err("Database URL cannot be empty".to_string());
            }
            if database.max_connections == 0 {
                return Err("Database max_connections must be greater than 0".to_string());
            }
        }
        Ok(())
    }
}
