//! stepsync - keeps many accounts authenticated and syncs a step count for
//! each of them.
//!
//! Usage: `stepsync [<user> <password> [sckey]]`. Without arguments accounts
//! come from `ACCOUNTS` / `PASSWORDS`. Exit codes: 0 when every account
//! succeeded, 1 when at least one failed, 2 on configuration errors.

mod config;
mod notify;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use stepsync_core::{
    AccountExecutor, CredentialCascade, Orchestrator, RunReport, TokenCache, TokenPersistence,
    TokenStore, ZeppClient,
};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use notify::Notifier;

/// Log file name prefix inside `LOG_DIR`
const LOG_FILE_PREFIX: &str = "stepsync.log";

/// Initialize the tracing subscriber for logging.
/// Returns the file writer guard, which must live until exit.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let log_dir = std::env::var_os("LOG_DIR").map(PathBuf::from);
    let _guard = init_tracing(log_dir.as_deref());
    info!("stepsync starting");

    match run().await {
        Ok(report) => {
            for result in &report.results {
                let status = if result.success { "OK  " } else { "FAIL" };
                println!("[{}] {}: {}", status, result.account, result.message);
            }
            println!(
                "{}/{} accounts succeeded",
                report.succeeded(),
                report.results.len()
            );
            if report.all_succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "Run aborted");
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run() -> Result<RunReport> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::from_env(&args).context("Invalid configuration")?;
    let notifier = Notifier::new(config.sckey.as_deref())?;

    let client = Arc::new(
        ZeppClient::new(config.request_timeout).context("Failed to build HTTP client")?,
    );

    let store = match config.cipher() {
        Some(cipher) => Some(Arc::new(TokenStore::new(&config.token_file, cipher))),
        None => {
            info!("Token cache disabled, every account will log in");
            None
        }
    };
    let tokens = TokenCache::new(store.as_ref().map(|s| s.load()).unwrap_or_default());

    let cascade = CredentialCascade::new(client.clone()).with_call_timeout(config.request_timeout);
    let executor = AccountExecutor::new(cascade, client.clone(), tokens)
        .with_step_policy(config.steps)
        .with_submit_timeout(config.request_timeout);

    let persistence = store.map(|s| s as Arc<dyn TokenPersistence>);
    let orchestrator = Orchestrator::new(Arc::new(executor), persistence)
        .with_account_timeout(config.account_timeout);

    let report = orchestrator
        .run_all(&config.accounts, &config.passwords, config.mode)
        .await?;

    if let Some(notifier) = notifier {
        notifier.notify_all(&report.results).await;
    }

    Ok(report)
}
