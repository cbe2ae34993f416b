use std::time::Duration;

use thiserror::Error;

use crate::auth::ProviderError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("login failed: {0}")]
    AuthFailed(#[source] ProviderError),

    #[error("access token escalation failed: {0}")]
    EscalationFailed(#[source] ProviderError),

    #[error("app token refresh failed: {0}")]
    RefreshFailed(#[source] ProviderError),

    #[error("app token validation failed: {0}")]
    ValidationFailed(String),

    #[error("step submission failed: {0}")]
    BusinessActionFailed(#[source] ProviderError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
