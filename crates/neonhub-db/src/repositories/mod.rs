//! PostgreSQL repository implementations.

mod agent;
mod session;

pub use agent::PgAgentRepository;
pub use session::PgSessionRepository;
