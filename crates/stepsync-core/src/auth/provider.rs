//! Seams to the remote service.
//!
//! The credential cascade only talks to an [`IdentityProvider`], and the
//! account executor submits through a [`StepSubmitter`]. The HTTP
//! implementation lives in `crate::api`.

use async_trait::async_trait;

use super::identity::{Identity, IdentityKind};
pub use crate::api::ProviderError;

/// Tokens issued when an access token is escalated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    pub login_token: String,
    pub app_token: String,
    pub user_id: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange the account secret for an access token (tier A)
    async fn login(&self, identity: &Identity, secret: &str) -> Result<String, ProviderError>;

    /// Exchange an access token for login and app tokens (tiers B and C)
    async fn escalate(
        &self,
        access_token: &str,
        device_id: &str,
        kind: IdentityKind,
    ) -> Result<LoginGrant, ProviderError>;

    /// Issue a new app token from a login token
    async fn refresh_app_token(&self, login_token: &str) -> Result<String, ProviderError>;

    /// Check whether an app token is still accepted
    async fn validate(&self, app_token: &str) -> Result<bool, ProviderError>;
}

#[async_trait]
pub trait StepSubmitter: Send + Sync {
    /// Submit `steps` for the account, returning the provider's message
    async fn submit(&self, app_token: &str, user_id: &str, steps: u32)
        -> Result<String, ProviderError>;
}
