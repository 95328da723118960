//! Bounded retry with exponential backoff for outbound HTTP calls.
//!
//! Used by the embedding providers and the Chroma client. Only transient
//! failures are retried:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Connect / timeout / request errors → retry
//!
//! Backoff: 500ms, 1s, 2s, 4s, 8s, 16s (capped at 2^5). No retry starts once
//! the overall deadline would be exceeded.

use anyhow::{bail, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub deadline: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, deadline_secs: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(500),
            deadline: Duration::from_secs(deadline_secs),
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let capped = attempt.saturating_sub(1).min(5);
        self.base_delay * (1u32 << capped)
    }

    pub fn should_retry(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    pub fn is_retryable_error(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect() || err.is_request()
    }

    /// Send the request built by `make` until it succeeds, fails permanently,
    /// or retries run out. Only a 2xx response is returned as `Ok`.
    pub async fn send<F>(&self, label: &str, make: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let started = Instant::now();
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                if started.elapsed() + delay > self.deadline {
                    tracing::warn!(label, attempt, "retry deadline exceeded");
                    break;
                }
                tracing::debug!(label, attempt, ?delay, "retrying");
                tokio::time::sleep(delay).await;
            }

            match make().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());

                    if Self::should_retry(status) {
                        last_err = Some(anyhow::anyhow!("{} failed ({}): {}", label, status, body));
                        continue;
                    }

                    bail!("{} failed ({}): {}", label, status, body);
                }
                Err(e) => {
                    if Self::is_retryable_error(&e) {
                        last_err = Some(anyhow::anyhow!("{} failed: {}", label, e));
                        continue;
                    }
                    return Err(anyhow::anyhow!("{} failed: {}", label, e));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} failed after retries", label)))
    }
}
