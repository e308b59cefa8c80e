// Scheduler facade module

mod engine;

pub use engine::{JobHandle, JobScheduler, SchedulerConfig};
