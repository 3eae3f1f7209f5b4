use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    pub poll_interval: Duration,
    pub window_size: usize,
    pub stats_window: usize,
    pub http_timeout: Duration,
    pub master_key: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_url", &self.api_url)
            .field("poll_interval", &self.poll_interval)
            .field("window_size", &self.window_size)
            .field("stats_window", &self.stats_window)
            .field("http_timeout", &self.http_timeout)
            .field("master_key", &self.master_key.as_ref().map(|_| "<set>"))
            .finish()
    }
}

/// Load `.env` from the working directory or its parents (best-effort).
/// Variables already set in the environment win.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        for path in ["../.env", "../../.env"] {
            if dotenvy::from_filename(path).is_ok() {
                break;
            }
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        load_dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = lookup("LOGWATCH_API_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let poll_ms: u64 = parse_var(&lookup, "LOGWATCH_POLL_INTERVAL_MS", 2000)?;
        let window_size: usize = parse_var(&lookup, "LOGWATCH_WINDOW_SIZE", 20)?;
        let stats_window: usize = parse_var(&lookup, "LOGWATCH_STATS_WINDOW", 50)?;
        let timeout_secs: u64 = parse_var(&lookup, "LOGWATCH_HTTP_TIMEOUT_SECS", 10)?;
        let master_key = lookup("LOGWATCH_MASTER_KEY").filter(|v| !v.trim().is_empty());

        let config = Self {
            api_url,
            poll_interval: Duration::from_millis(poll_ms),
            window_size,
            stats_window,
            http_timeout: Duration::from_secs(timeout_secs),
            master_key,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(anyhow!("LOGWATCH_POLL_INTERVAL_MS must be positive"));
        }
        if self.window_size == 0 || self.stats_window == 0 {
            return Err(anyhow!("window sizes must be positive"));
        }
        if self.http_timeout.is_zero() {
            return Err(anyhow!("LOGWATCH_HTTP_TIMEOUT_SECS must be positive"));
        }
        Ok(())
    }

    /// The master key, or an error naming the variable to set.
    pub fn require_master_key(&self) -> Result<&str> {
        self.master_key
            .as_deref()
            .ok_or_else(|| anyhow!("this command needs LOGWATCH_MASTER_KEY to be set"))
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("invalid {key}: {raw:?}")),
        _ => Ok(default),
    }
}
