//! Configuration types.
//!
//! Everything is read from the environment once at startup and passed to the
//! components that need it.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::mail::GmailConfig;
use crate::mail::gmail::{DEFAULT_API_BASE, DEFAULT_USER_ID};
use crate::pipeline::orchestrator::{DEFAULT_CONCURRENCY, DEFAULT_MAX_EMAILS};

pub const DEFAULT_RULES_FILE: &str = "config/rules.json";
pub const DEFAULT_DB_PATH: &str = "./data/inbox-rules.db";

/// Runtime configuration for the binary.
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON rule-set file.
    pub rules_file: PathBuf,
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Messages fetched per run.
    pub max_emails: usize,
    /// Emails processed concurrently within a run.
    pub concurrency: usize,
    /// Poll forever at this interval instead of running once.
    pub poll_interval: Option<Duration>,
    /// Directory for daily rolling log files.
    pub log_dir: Option<PathBuf>,
    pub gmail: GmailConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let access_token = get("GMAIL_ACCESS_TOKEN")
            .ok_or_else(|| ConfigError::MissingEnvVar("GMAIL_ACCESS_TOKEN".to_string()))?;

        let max_emails = parse_or("INBOX_RULES_MAX_EMAILS", get("INBOX_RULES_MAX_EMAILS"), DEFAULT_MAX_EMAILS)?;
        let concurrency = parse_or(
            "INBOX_RULES_CONCURRENCY",
            get("INBOX_RULES_CONCURRENCY"),
            DEFAULT_CONCURRENCY,
        )?;
        require_positive("INBOX_RULES_MAX_EMAILS", max_emails)?;
        require_positive("INBOX_RULES_CONCURRENCY", concurrency)?;

        let poll_interval = match get("INBOX_RULES_POLL_INTERVAL_SECS") {
            Some(raw) => {
                let secs: u64 = parse("INBOX_RULES_POLL_INTERVAL_SECS", &raw)?;
                require_positive("INBOX_RULES_POLL_INTERVAL_SECS", secs)?;
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            rules_file: get("INBOX_RULES_RULES_FILE")
                .unwrap_or_else(|| DEFAULT_RULES_FILE.to_string())
                .into(),
            db_path: get("INBOX_RULES_DB_PATH")
                .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
                .into(),
            max_emails,
            concurrency,
            poll_interval,
            log_dir: get("INBOX_RULES_LOG_DIR").map(PathBuf::from),
            gmail: GmailConfig {
                api_base: get("GMAIL_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
                user_id: get("GMAIL_USER_ID").unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
                access_token: SecretString::from(access_token),
            },
        })
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{raw}': {e}"),
    })
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.map_or(Ok(default), |r| parse(key, &r))
}

fn require_positive<T: PartialOrd + Default>(key: &str, value: T) -> Result<(), ConfigError> {
    if value > T::default() {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be at least 1".to_string(),
        })
    }
}
