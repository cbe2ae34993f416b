//! Account authentication.
//!
//! This module provides:
//! - `Identity`: normalized account handles and their escalation profile
//! - `IdentityProvider` / `StepSubmitter`: seams to the remote service
//! - `CredentialCascade`: the app-token ladder (validate, refresh, re-login)

pub mod cascade;
pub mod identity;
pub mod provider;

pub use cascade::{CascadeState, Credential, CredentialCascade, CredentialPath};
pub use identity::{redact, Identity, IdentityKind, DEFAULT_COUNTRY_PREFIX};
pub use provider::{IdentityProvider, LoginGrant, ProviderError, StepSubmitter};
