use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::auth::{
    redact, Credential, CredentialCascade, Identity, ProviderError, StepSubmitter,
};
use crate::cache::{CredentialRecord, TokenCache};
use crate::error::{Error, Result};
use crate::steps::StepPolicy;

/// Default bound on a single submission call.
const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one account's run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Redacted account handle
    pub account: String,
    pub success: bool,
    pub message: String,
    /// Step count submitted, when submission was attempted
    pub steps: Option<u32>,
}

impl ExecutionResult {
    pub fn success(account: String, message: String, steps: u32) -> Self {
        Self {
            account,
            success: true,
            message,
            steps: Some(steps),
        }
    }

    pub fn failure(account: String, message: impl Into<String>) -> Self {
        Self {
            account,
            success: false,
            message: message.into(),
            steps: None,
        }
    }
}

/// Redacted display form of a raw, possibly unnormalized, handle
pub fn display_account(raw: &str) -> String {
    Identity::parse(raw)
        .map(|identity| identity.redacted())
        .unwrap_or_else(|| redact(raw.trim()))
}

pub struct AccountExecutor {
    cascade: CredentialCascade,
    submitter: Arc<dyn StepSubmitter>,
    tokens: TokenCache,
    steps: StepPolicy,
    submit_timeout: Duration,
}

impl AccountExecutor {
    pub fn new(
        cascade: CredentialCascade,
        submitter: Arc<dyn StepSubmitter>,
        tokens: TokenCache,
    ) -> Self {
        Self {
            cascade,
            submitter,
            tokens,
            steps: StepPolicy::default(),
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }

    pub fn with_step_policy(mut self, steps: StepPolicy) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_submit_timeout(mut self, submit_timeout: Duration) -> Self {
        self.submit_timeout = submit_timeout;
        self
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// Authenticate and submit steps for one account.
    ///
    /// Never fails: every error becomes a failed [`ExecutionResult`]. The
    /// record is committed as soon as a credential is obtained, so a run
    /// aborted during submission still keeps the fresh tokens.
    pub async fn run(&self, raw_identity: &str, secret: &str) -> ExecutionResult {
        let identity = match Identity::parse(raw_identity) {
            Some(identity) if !secret.is_empty() => identity,
            _ => {
                let account = display_account(raw_identity);
                warn!(account = %account, "Account or password is empty, skipping");
                return ExecutionResult::failure(account, "account or password is empty");
            }
        };
        let account = identity.redacted();

        let mut record = self.tokens.checkout(identity.as_str()).await;
        let outcome = self.execute(&identity, secret, &mut record).await;
        self.tokens.commit(identity.as_str(), record).await;

        match outcome {
            Ok((steps, message)) => {
                info!(account = %account, steps, "Steps submitted");
                ExecutionResult::success(account, format!("steps set to {steps}: {message}"), steps)
            }
            Err(e) => {
                warn!(account = %account, error = %e, "Account run failed");
                ExecutionResult::failure(account, e.to_string())
            }
        }
    }

    async fn execute(
        &self,
        identity: &Identity,
        secret: &str,
        record: &mut CredentialRecord,
    ) -> Result<(u32, String)> {
        let credential = self.cascade.obtain(identity, secret, record, false).await?;
        self.tokens.commit(identity.as_str(), record.clone()).await;
        let steps = {
            let range = self.steps.current_range();
            range.sample(&mut rand::thread_rng())
        };
        info!(account = %identity.redacted(), steps, "Submitting steps");

        match self.submit(&credential, steps).await {
            Err(Error::BusinessActionFailed(e)) if e.is_credential_expired() => {
                info!(account = %identity.redacted(), "App token rejected on submit, logging in again");
                let credential = self.cascade.obtain(identity, secret, record, true).await?;
                self.tokens.commit(identity.as_str(), record.clone()).await;
                let message = self.submit(&credential, steps).await?;
                Ok((steps, message))
            }
            other => other.map(|message| (steps, message)),
        }
    }

    async fn submit(&self, credential: &Credential, steps: u32) -> Result<String> {
        tokio::time::timeout(
            self.submit_timeout,
            self.submitter
                .submit(&credential.app_token, &credential.user_id, steps),
        )
        .await
        .unwrap_or(Err(ProviderError::Timeout))
        .map_err(Error::BusinessActionFailed)
    }
}

// ============================================================================
// Tests
// ============================================================================
