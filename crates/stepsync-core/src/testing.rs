//! Scriptable in-process provider shared by the unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::auth::{Identity, IdentityKind, IdentityProvider, LoginGrant, ProviderError, StepSubmitter};

#[derive(Default)]
pub struct FakeProvider {
    pub login_calls: AtomicUsize,
    pub escalate_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub validate_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,

    pub login_fails: AtomicBool,
    pub escalate_fails: AtomicBool,
    pub refresh_fails: AtomicBool,
    /// Number of upcoming submissions to answer with `Unauthorized`
    pub expired_submits: AtomicUsize,
    /// Identities whose login always fails
    pub bad_accounts: Mutex<HashSet<String>>,

    pub last_kind: Mutex<Option<IdentityKind>>,
    pub submitted: Mutex<Vec<(String, u32)>>,
    /// Identities in the order their login started
    pub login_order: Mutex<Vec<String>>,
    /// Highest number of logins observed in progress at once
    pub max_logins_in_flight: AtomicUsize,

    logins_in_flight: AtomicUsize,

    valid_app_tokens: Mutex<HashSet<String>>,
    issued: AtomicUsize,
    login_delay: Option<Duration>,
    submit_delay: Option<Duration>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_login_delay(mut self, delay: Duration) -> Self {
        self.login_delay = Some(delay);
        self
    }

    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    pub fn accept_app_token(&self, token: &str) {
        self.valid_app_tokens.lock().unwrap().insert(token.to_string());
    }

    pub fn reject_account(&self, identity: &str) {
        self.bad_accounts.lock().unwrap().insert(identity.to_string());
    }

    pub fn network_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
            + self.escalate_calls.load(Ordering::SeqCst)
            + self.refresh_calls.load(Ordering::SeqCst)
            + self.validate_calls.load(Ordering::SeqCst)
            + self.submit_calls.load(Ordering::SeqCst)
    }

    fn next_app_token(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let token = format!("app-{n}");
        self.accept_app_token(&token);
        token
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn login(&self, identity: &Identity, _secret: &str) -> Result<String, ProviderError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.login_order.lock().unwrap().push(identity.as_str().to_string());
        let in_flight = self.logins_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_logins_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        if let Some(delay) = self.login_delay {
            tokio::time::sleep(delay).await;
        }
        self.logins_in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.login_fails.load(Ordering::SeqCst)
            || self.bad_accounts.lock().unwrap().contains(identity.as_str())
        {
            return Err(ProviderError::Rejected("wrong password".to_string()));
        }
        Ok(format!("access:{}", identity.as_str()))
    }

    async fn escalate(
        &self,
        access_token: &str,
        _device_id: &str,
        kind: IdentityKind,
    ) -> Result<LoginGrant, ProviderError> {
        self.escalate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_kind.lock().unwrap() = Some(kind);
        if self.escalate_fails.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected("invalid access token".to_string()));
        }
        let handle = access_token.trim_start_matches("access:");
        Ok(LoginGrant {
            login_token: format!("login:{handle}"),
            app_token: self.next_app_token(),
            user_id: format!("uid:{handle}"),
        })
    }

    async fn refresh_app_token(&self, _login_token: &str) -> Result<String, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.refresh_fails.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected("login token expired".to_string()));
        }
        Ok(self.next_app_token())
    }

    async fn validate(&self, app_token: &str) -> Result<bool, ProviderError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.valid_app_tokens.lock().unwrap().contains(app_token))
    }
}

#[async_trait]
impl StepSubmitter for FakeProvider {
    async fn submit(
        &self,
        app_token: &str,
        user_id: &str,
        steps: u32,
    ) -> Result<String, ProviderError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }
        let expire = self
            .expired_submits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if expire || !self.valid_app_tokens.lock().unwrap().contains(app_token) {
            return Err(ProviderError::Unauthorized);
        }
        self.submitted.lock().unwrap().push((user_id.to_string(), steps));
        Ok(format!("submitted {steps} steps"))
    }
}
