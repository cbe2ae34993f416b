//! Run configuration.
//!
//! Values come from positional arguments (`<user> <password> [sckey]`) and
//! environment variables, after loading `.env` if present. Multiple accounts
//! are `#`-separated in `ACCOUNTS` / `PASSWORDS`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use stepsync_core::api::client::DEFAULT_REQUEST_TIMEOUT_SECS;
use stepsync_core::{Cipher, ExecutionMode, StepPolicy, StepRange};
use tracing::warn;

/// Default encrypted token cache path, relative to the working directory
const DEFAULT_TOKEN_FILE: &str = "encrypted_tokens.data";

const DEFAULT_CONCURRENCY: usize = 3;
const DEFAULT_SLEEP_GAP_SECS: u64 = 5;
const DEFAULT_ACCOUNT_TIMEOUT_SECS: u64 = 120;

/// Separator between entries of `ACCOUNTS` and `PASSWORDS`
const LIST_SEPARATOR: char = '#';

#[derive(Debug, Clone)]
pub struct Config {
    pub accounts: Vec<String>,
    pub passwords: Vec<String>,
    pub sckey: Option<String>,
    pub aes_key: Option<String>,
    pub token_file: PathBuf,
    pub mode: ExecutionMode,
    pub account_timeout: Duration,
    pub request_timeout: Duration,
    pub steps: StepPolicy,
}

impl Config {
    pub fn from_env(args: &[String]) -> Result<Self> {
        Self::from_lookup(args, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(args: &[String], lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let (accounts, passwords, sckey) = if args.len() >= 2 {
            (args[0].clone(), args[1].clone(), args.get(2).cloned())
        } else {
            let accounts = get("ACCOUNTS").ok_or_else(|| anyhow!("ACCOUNTS is not set"))?;
            let passwords = get("PASSWORDS").ok_or_else(|| anyhow!("PASSWORDS is not set"))?;
            (accounts, passwords, get("SCKEY"))
        };

        let accounts: Vec<String> = accounts
            .split(LIST_SEPARATOR)
            .map(|a| a.trim().to_string())
            .collect();
        let passwords: Vec<String> = passwords
            .split(LIST_SEPARATOR)
            .map(String::from)
            .collect();

        let mode = match get("EXEC_MODE").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("sequential") => ExecutionMode::Sequential {
                delay: Duration::from_secs(parse_or(&get, "SLEEP_GAP", DEFAULT_SLEEP_GAP_SECS)?),
            },
            Some("concurrent") => {
                let limit = parse_or(&get, "CONCURRENCY", DEFAULT_CONCURRENCY)?;
                if limit == 0 {
                    bail!("CONCURRENCY must be at least 1");
                }
                ExecutionMode::Concurrent { limit }
            }
            Some(other) => bail!("EXEC_MODE must be 'sequential' or 'concurrent', got '{}'", other),
        };

        let steps = match (get("MIN_STEP"), get("MAX_STEP")) {
            (None, None) => StepPolicy::TimeOfDay,
            (Some(min), Some(max)) => StepPolicy::Fixed(StepRange::new(
                min.trim().parse().context("MIN_STEP must be a number")?,
                max.trim().parse().context("MAX_STEP must be a number")?,
            )),
            _ => bail!("MIN_STEP and MAX_STEP must be set together"),
        };

        Ok(Self {
            accounts,
            passwords,
            sckey: sckey.filter(|k| !k.trim().is_empty()),
            aes_key: lookup("AES_KEY"),
            token_file: get("TOKEN_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_FILE)),
            mode,
            account_timeout: Duration::from_secs(parse_or(
                &get,
                "ACCOUNT_TIMEOUT",
                DEFAULT_ACCOUNT_TIMEOUT_SECS,
            )?),
            request_timeout: Duration::from_secs(parse_or(
                &get,
                "REQUEST_TIMEOUT",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            steps,
        })
    }

    /// Cipher for the token cache, or `None` when caching is disabled
    pub fn cipher(&self) -> Option<Cipher> {
        let key = self.aes_key.as_deref()?;
        match Cipher::new(key.as_bytes()) {
            Ok(cipher) => Some(cipher),
            Err(e) => {
                warn!(error = %e, "AES_KEY is invalid, token cache disabled");
                None
            }
        }
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number, got '{}'", key, value)),
        None => Ok(default),
    }
}
