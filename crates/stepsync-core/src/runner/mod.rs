//! Running the step sync for configured accounts.
//!
//! This module provides:
//! - `AccountExecutor`: cascade + submission for one account
//! - `Orchestrator`: sequential or bounded-concurrency fan-out over accounts,
//!   followed by a single save of the token cache

pub mod executor;
pub mod orchestrator;

pub use executor::{AccountExecutor, ExecutionResult};
pub use orchestrator::{ExecutionMode, Orchestrator, RunReport};
