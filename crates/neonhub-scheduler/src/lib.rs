//! Periodic scheduling loop for NeonHub agents.
//!
//! A single background loop scans for due agents on a fixed cadence,
//! enforces a global concurrency ceiling, and hands eligible agents to
//! the manager, with its own retry/backoff across ticks independent of
//! the runtime's inner retry.

pub mod config;
pub mod schedule;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use scheduler::{AgentScheduler, SchedulerStats, TaskDetails};
