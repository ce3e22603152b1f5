//! Agent manager for NeonHub.
//!
//! Single source of truth for "is agent X currently running": owns the
//! in-memory running-handle map and the executor registry, and is the only
//! component that creates or destroys runtime instances.

pub mod manager;
pub mod registry;

pub use manager::{AgentManager, AgentStatusReport, RunningAgentSnapshot, StartOutcome};
pub use registry::ExecutorRegistry;
