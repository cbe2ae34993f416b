use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use super::executor::{display_account, AccountExecutor, ExecutionResult};
use crate::cache::TokenPersistence;
use crate::error::{Error, Result};

/// Default overall bound on one account's run.
pub const DEFAULT_ACCOUNT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One account at a time with a fixed pause between accounts
    Sequential { delay: Duration },
    /// At most `limit` accounts in flight. Results arrive in completion order.
    Concurrent { limit: usize },
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub results: Vec<ExecutionResult>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }
}

pub struct Orchestrator {
    executor: Arc<AccountExecutor>,
    persistence: Option<Arc<dyn TokenPersistence>>,
    account_timeout: Duration,
}

impl Orchestrator {
    /// `persistence` is `None` when token caching is disabled
    pub fn new(
        executor: Arc<AccountExecutor>,
        persistence: Option<Arc<dyn TokenPersistence>>,
    ) -> Self {
        Self {
            executor,
            persistence,
            account_timeout: DEFAULT_ACCOUNT_TIMEOUT,
        }
    }

    pub fn with_account_timeout(mut self, account_timeout: Duration) -> Self {
        self.account_timeout = account_timeout;
        self
    }

    /// Run every account and save the token cache once afterwards.
    ///
    /// Configuration problems are reported before any account runs.
    pub async fn run_all(
        &self,
        identities: &[String],
        secrets: &[String],
        mode: ExecutionMode,
    ) -> Result<RunReport> {
        if identities.len() != secrets.len() {
            return Err(Error::Config(format!(
                "{} accounts but {} passwords",
                identities.len(),
                secrets.len()
            )));
        }
        if let ExecutionMode::Concurrent { limit: 0 } = mode {
            return Err(Error::Config("concurrency limit must be at least 1".to_string()));
        }

        let accounts: Vec<(String, String)> = identities
            .iter()
            .cloned()
            .zip(secrets.iter().cloned())
            .collect();
        info!(accounts = accounts.len(), mode = ?mode, "Starting run");

        let results = match mode {
            ExecutionMode::Sequential { delay } => self.run_sequential(accounts, delay).await,
            ExecutionMode::Concurrent { limit } => self.run_concurrent(accounts, limit).await,
        };

        self.persist().await;

        let report = RunReport { results };
        info!(
            succeeded = report.succeeded(),
            total = report.results.len(),
            "Run finished"
        );
        Ok(report)
    }

    async fn run_sequential(
        &self,
        accounts: Vec<(String, String)>,
        delay: Duration,
    ) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(accounts.len());
        for (index, (identity, secret)) in accounts.into_iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            results.push(self.run_guarded(identity, secret).await);
        }
        results
    }

    async fn run_concurrent(
        &self,
        accounts: Vec<(String, String)>,
        limit: usize,
    ) -> Vec<ExecutionResult> {
        stream::iter(accounts)
            .map(|(identity, secret)| self.run_guarded(identity, secret))
            .buffer_unordered(limit)
            .collect()
            .await
    }

    /// Run one account on its own task under the overall account timeout.
    /// A panicking or timed-out worker becomes a failed result, and a
    /// timed-out worker is aborted so its slot is released.
    async fn run_guarded(&self, identity: String, secret: String) -> ExecutionResult {
        let account = display_account(&identity);
        let executor = Arc::clone(&self.executor);
        let handle = tokio::spawn(async move { executor.run(&identity, &secret).await });
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.account_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!(account = %account, error = %e, "Account worker crashed");
                ExecutionResult::failure(account, format!("account worker failed: {e}"))
            }
            Err(_) => {
                abort.abort();
                let err = Error::Timeout(self.account_timeout);
                warn!(account = %account, error = %err, "Account run timed out");
                ExecutionResult::failure(account, err.to_string())
            }
        }
    }

    async fn persist(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let snapshot = self.executor.tokens().snapshot().await;
        match persistence.save(&snapshot) {
            Ok(()) => info!(accounts = snapshot.len(), "Token cache saved"),
            Err(e) => error!(error = %e, "Failed to save token cache"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
