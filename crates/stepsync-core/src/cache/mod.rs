//! Persistent credential caching.
//!
//! This module provides:
//! - `CredentialRecord`: the cached token chain of one account
//! - `TokenStore`: the encrypted on-disk file holding every record
//! - `TokenCache`: the in-memory map shared by concurrent account workers
//!
//! The file is decrypted once at startup and written back once after every
//! account has finished.

pub mod record;
pub mod token_store;

pub use record::{CredentialRecord, TokenMap};
pub use token_store::{StoreError, TokenCache, TokenPersistence, TokenStore};
