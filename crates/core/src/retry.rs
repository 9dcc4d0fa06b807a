use crate::error::{EmbedError, StoreError};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Errors that may succeed when the same request is sent again.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

fn transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

fn transient_http(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

impl Transient for EmbedError {
    fn is_transient(&self) -> bool {
        match self {
            EmbedError::Http(error) => transient_http(error),
            EmbedError::BackendResponse { status, .. } => transient_status(*status),
            _ => false,
        }
    }
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::Http(error) => transient_http(error),
            StoreError::BackendResponse { status, .. } => transient_status(*status),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(16),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn backoff(&self, attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        self.base_delay
            .saturating_mul(1 << capped)
            .min(self.max_delay)
    }

    /// Runs `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0usize;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt + 1 < self.max_attempts.max(1) => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(%label, attempt, delay_ms = delay.as_millis() as u64, %error, "retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
