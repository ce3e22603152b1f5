//! Execution lifecycle wrapper for NeonHub agents.
//!
//! The runtime executes exactly one agent run with uniform bookkeeping:
//! session creation and completion, inner retry with exponential backoff,
//! cooperative stop, event logging, and metrics emission.

pub mod options;
pub mod runtime;

pub use options::ExecuteOptions;
pub use runtime::{AgentRuntime, RuntimeStatus};
