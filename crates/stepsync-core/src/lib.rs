//! stepsync core library.
//!
//! Keeps many provider accounts authenticated across runs and submits a step
//! count for each of them:
//!
//! - `crypto`: AES-128-CBC for the token cache file
//! - `cache`: credential records, the encrypted token file and the shared map
//! - `auth`: identities, provider seams and the credential cascade
//! - `api`: reqwest implementation of the provider seams
//! - `runner`: per-account executor and the multi-account orchestrator
//! - `steps`: step count selection

pub mod api;
pub mod auth;
pub mod cache;
pub mod crypto;
pub mod error;
pub mod runner;
pub mod steps;

#[cfg(test)]
pub(crate) mod testing;

pub use api::ZeppClient;
pub use auth::{CredentialCascade, Identity, IdentityKind, IdentityProvider, StepSubmitter};
pub use cache::{CredentialRecord, TokenCache, TokenPersistence, TokenStore};
pub use crypto::Cipher;
pub use error::{Error, Result};
pub use runner::{AccountExecutor, ExecutionMode, ExecutionResult, Orchestrator, RunReport};
pub use steps::{StepPolicy, StepRange};
