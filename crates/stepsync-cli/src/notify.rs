//! ServerChan push notifications for account results.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use stepsync_core::ExecutionResult;
use tracing::{debug, warn};

const SERVERCHAN_BASE_URL: &str = "https://sctapi.ftqq.com";

const NOTIFY_TIMEOUT_SECS: u64 = 10;

pub struct Notifier {
    client: Client,
    sckey: String,
}

impl Notifier {
    /// Build a notifier, or `None` without a push key
    pub fn new(sckey: Option<&str>) -> Result<Option<Self>> {
        let Some(sckey) = sckey.map(str::trim).filter(|k| !k.is_empty()) else {
            return Ok(None);
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(NOTIFY_TIMEOUT_SECS))
            .build()
            .context("Failed to build notification client")?;
        Ok(Some(Self {
            client,
            sckey: sckey.to_string(),
        }))
    }

    /// Push one message per result. Delivery failures are logged only.
    pub async fn notify_all(&self, results: &[ExecutionResult]) {
        for result in results {
            let (title, body) = format_result(result);
            if let Err(e) = self.send(&title, &body).await {
                warn!(account = %result.account, error = %e, "Notification failed");
            }
        }
    }

    async fn send(&self, title: &str, body: &str) -> Result<()> {
        let url = format!("{}/{}.send", SERVERCHAN_BASE_URL, self.sckey);
        self.client
            .post(&url)
            .form(&[("text", title), ("desp", body)])
            .send()
            .await
            .context("Failed to send notification")?
            .error_for_status()
            .context("Notification rejected")?;
        debug!("Notification sent");
        Ok(())
    }
}

pub fn format_result(result: &ExecutionResult) -> (String, String) {
    let outcome = if result.success { "succeeded" } else { "failed" };
    let title = format!("Account {} step sync {}", result.account, outcome);
    let body = format!("Account: {}\n{}", result.account, result.message);
    (title, body)
}
