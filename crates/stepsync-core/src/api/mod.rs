//! HTTP client for the Huami/Zepp account and data endpoints.
//!
//! `ZeppClient` implements both `IdentityProvider` (login, escalation,
//! app-token refresh and validation) and `StepSubmitter`.

pub mod client;
pub mod error;

pub use client::ZeppClient;
pub use error::ProviderError;
