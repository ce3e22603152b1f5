//! NeonHub Agent Core
//!
//! Core domain types, traits, and error handling for the NeonHub agent
//! platform. This crate has minimal dependencies and defines the shared
//! vocabulary used across all other crates.

pub mod agent;
pub mod context;
pub mod error;
pub mod event;
pub mod ids;
pub mod metrics;
pub mod ports;
pub mod session;

pub use error::{Error, Result};
pub use ids::*;
