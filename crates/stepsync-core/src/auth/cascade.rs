//! Credential cascade: produce a usable app token at the lowest cost.
//!
//! The three provider tokens form a chain. An access token (tier A) comes
//! from a full login with the account secret, a login token (tier B) and an
//! app token (tier C) come from escalating the access token, and a new app
//! token can be issued from the login token alone. Full logins are the most
//! heavily rate limited call, so the ladder is walked from the top:
//!
//! ```text
//! HaveApp --rejected--> HaveLogin --failed--> NoCredential --login--> HaveAccess --escalate--> done
//!    |                      |
//!    +--valid--> done       +--refreshed--> done
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::identity::Identity;
use super::provider::{IdentityProvider, ProviderError};
use crate::cache::CredentialRecord;
use crate::error::{Error, Result};

/// Default bound on each provider call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Position on the credential ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeState {
    /// Nothing usable is cached; a full login is required
    NoCredential,
    /// A fresh access token awaits escalation
    HaveAccess { access_token: String },
    /// A cached login token can issue a new app token
    HaveLogin { login_token: String },
    /// A cached app token has not been checked yet
    HaveApp { app_token: String },
}

impl CascadeState {
    /// Starting state for a cached record.
    ///
    /// A record without a user id cannot be used for submission and starts
    /// from scratch, as does a forced login.
    pub fn entry(record: &CredentialRecord, force_login: bool) -> Self {
        if force_login || record.user_id.is_none() {
            return CascadeState::NoCredential;
        }
        if let Some(app_token) = &record.app_token {
            return CascadeState::HaveApp {
                app_token: app_token.clone(),
            };
        }
        if let Some(login_token) = &record.login_token {
            return CascadeState::HaveLogin {
                login_token: login_token.clone(),
            };
        }
        CascadeState::NoCredential
    }

    /// Next state after the call made in this state failed, or `None` when
    /// the failure ends the cascade.
    pub fn fallback(&self, record: &CredentialRecord) -> Option<Self> {
        match self {
            CascadeState::HaveApp { .. } => Some(match &record.login_token {
                Some(login_token) => CascadeState::HaveLogin {
                    login_token: login_token.clone(),
                },
                None => CascadeState::NoCredential,
            }),
            CascadeState::HaveLogin { .. } => Some(CascadeState::NoCredential),
            CascadeState::NoCredential | CascadeState::HaveAccess { .. } => None,
        }
    }

    pub fn tier(&self) -> &'static str {
        match self {
            CascadeState::NoCredential => "login",
            CascadeState::HaveAccess { .. } => "access",
            CascadeState::HaveLogin { .. } => "login_token",
            CascadeState::HaveApp { .. } => "app_token",
        }
    }
}

/// How the usable credential was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialPath {
    CacheHit,
    Refreshed,
    FullLogin,
}

/// A usable app token and the account it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub app_token: String,
    pub user_id: String,
    pub path: CredentialPath,
}

enum Transition {
    Next(CascadeState),
    Done(Credential),
}

#[derive(Clone)]
pub struct CredentialCascade {
    provider: Arc<dyn IdentityProvider>,
    call_timeout: Duration,
}

impl CredentialCascade {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Obtain a usable app token for `identity`, updating `record` in place.
    ///
    /// Steps run strictly one after another and nothing is retried here.
    /// On a full login the record is replaced with the new chain, keeping
    /// its device id.
    pub async fn obtain(
        &self,
        identity: &Identity,
        secret: &str,
        record: &mut CredentialRecord,
        force_login: bool,
    ) -> Result<Credential> {
        let account = identity.redacted();
        let device_id = record.ensure_device_id().to_string();
        let mut state = CascadeState::entry(record, force_login);
        debug!(account = %account, tier = state.tier(), force_login, "Starting credential cascade");

        loop {
            let step = match &state {
                CascadeState::HaveApp { app_token } => self.check_app(app_token, record).await,
                CascadeState::HaveLogin { login_token } => {
                    self.refresh_app(login_token, record).await
                }
                CascadeState::NoCredential => self.login(identity, secret).await,
                CascadeState::HaveAccess { access_token } => {
                    self.escalate(identity, access_token, &device_id, record).await
                }
            };

            state = match step {
                Ok(Transition::Done(credential)) => {
                    info!(account = %account, path = ?credential.path, "Credential ready");
                    return Ok(credential);
                }
                Ok(Transition::Next(next)) => next,
                Err(err) => match state.fallback(record) {
                    Some(next) => {
                        info!(
                            account = %account,
                            tier = state.tier(),
                            next = next.tier(),
                            error = %err,
                            "Cached credential unusable, falling back"
                        );
                        next
                    }
                    None => {
                        warn!(account = %account, tier = state.tier(), error = %err, "Credential cascade failed");
                        return Err(err);
                    }
                },
            };
        }
    }

    async fn check_app(&self, app_token: &str, record: &CredentialRecord) -> Result<Transition> {
        let valid = self
            .bounded(self.provider.validate(app_token))
            .await
            .map_err(|e| Error::ValidationFailed(e.to_string()))?;
        if !valid {
            return Err(Error::ValidationFailed("app token rejected".to_string()));
        }
        let user_id = record
            .user_id
            .clone()
            .ok_or_else(|| Error::ValidationFailed("cached record has no user id".to_string()))?;
        Ok(Transition::Done(Credential {
            app_token: app_token.to_string(),
            user_id,
            path: CredentialPath::CacheHit,
        }))
    }

    async fn refresh_app(
        &self,
        login_token: &str,
        record: &mut CredentialRecord,
    ) -> Result<Transition> {
        let app_token = self
            .bounded(self.provider.refresh_app_token(login_token))
            .await
            .map_err(Error::RefreshFailed)?;
        let user_id = record.user_id.clone().ok_or_else(|| {
            Error::RefreshFailed(ProviderError::InvalidResponse(
                "cached record has no user id".to_string(),
            ))
        })?;
        record.set_app_token(app_token.clone(), Utc::now());
        Ok(Transition::Done(Credential {
            app_token,
            user_id,
            path: CredentialPath::Refreshed,
        }))
    }

    async fn login(&self, identity: &Identity, secret: &str) -> Result<Transition> {
        let access_token = self
            .bounded(self.provider.login(identity, secret))
            .await
            .map_err(Error::AuthFailed)?;
        Ok(Transition::Next(CascadeState::HaveAccess { access_token }))
    }

    async fn escalate(
        &self,
        identity: &Identity,
        access_token: &str,
        device_id: &str,
        record: &mut CredentialRecord,
    ) -> Result<Transition> {
        let grant = self
            .bounded(self.provider.escalate(access_token, device_id, identity.kind()))
            .await
            .map_err(Error::EscalationFailed)?;

        *record = CredentialRecord::issued(
            device_id.to_string(),
            grant.user_id.clone(),
            access_token.to_string(),
            grant.login_token,
            grant.app_token.clone(),
            Utc::now(),
        );
        Ok(Transition::Done(Credential {
            app_token: grant.app_token,
            user_id: grant.user_id,
            path: CredentialPath::FullLogin,
        }))
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, ProviderError>>,
    ) -> std::result::Result<T, ProviderError> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or(Err(ProviderError::Timeout))
    }
}

// ============================================================================
// Tests
// ============================================================================
