//! Tuning knobs for the item client along with validation so callers can reason
//! about timeouts and the retry budget before any request is issued.

use anyhow::{bail, Result};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://hacker-news.firebaseio.com";
pub const DEFAULT_API_VERSION: &str = "v0";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
const DEFAULT_RETRY_WAIT_SECS: u64 = 1;
const DEFAULT_MAX_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientOptions {
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,
    pub base_url: String,
    pub api_version: String,
    /// Attempt `n` (0-indexed) waits `n * retry_wait` before its request.
    #[serde(with = "humantime_serde")]
    pub retry_wait: Duration,
    pub max_attempts: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_version: DEFAULT_API_VERSION.to_owned(),
            retry_wait: Duration::from_secs(DEFAULT_RETRY_WAIT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ClientOptions {
    pub fn validate(&self) -> Result<()> {
        if self.http_timeout.is_zero() {
            bail!("http_timeout must be greater than 0");
        }
        if self.max_attempts == 0 {
            bail!("max_attempts must be greater than 0");
        }
        let base_url = self.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            bail!("base_url must start with http:// or https://");
        }
        if self.api_version.trim().is_empty() {
            bail!("api_version cannot be empty");
        }
        Ok(())
    }

    /// Backoff applied before the 0-indexed attempt `attempt`.
    pub fn backoff_before(&self, attempt: usize) -> Duration {
        let factor = u32::try_from(attempt).unwrap_or(u32::MAX);
        self.retry_wait.saturating_mul(factor)
    }
}
