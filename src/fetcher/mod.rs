//! Page fetching with bounded retries.
//!
//! [`Fetcher::fetch`] never returns an error: once every attempt has failed
//! the page is reported as missing and the caller moves on to its next URL.

mod transport;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;

pub use transport::{ReqwestTransport, Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per URL, including the first.
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// A policy that retries without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            min_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Uniformly drawn from `[min_backoff, max_backoff]`.
    pub fn backoff(&self) -> Duration {
        let min = self.min_backoff.as_millis() as u64;
        let max = (self.max_backoff.as_millis() as u64).max(min);
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

pub struct Fetcher {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = ReqwestTransport::new(&config.http.user_agent, config.request_timeout())?;
        Ok(Self::new(
            Arc::new(transport),
            RetryPolicy::with_attempts(config.http.max_retries),
        ))
    }

    /// GET `url` under the configured retry policy. `None` means every
    /// attempt failed.
    pub async fn fetch(&self, url: &str) -> Option<String> {
        self.fetch_with_attempts(url, self.retry.max_attempts).await
    }

    /// GET `url` with at most `max_attempts` tries (at least one), keeping
    /// the configured backoff between them.
    pub async fn fetch_with_attempts(&self, url: &str, max_attempts: u32) -> Option<String> {
        let attempts = max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.transport.get(url).await {
                Ok(body) => {
                    debug!(%url, attempt, bytes = body.len(), "Fetched page");
                    return Some(body);
                }
                Err(e) => {
                    warn!(%url, attempt, max_attempts = attempts, error = %e, "Fetch failed");
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.backoff()).await;
                    }
                }
            }
        }

        None
    }
}
