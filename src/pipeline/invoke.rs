//! Provider invocation with rate-limit backoff.
//!
//! This module runs one prompt against one resolved model and returns the
//! raw text. It is intentionally thin: prompts live in [`crate::prompts`]
//! and output parsing in [`super::coerce`], so retry behaviour can change
//! without touching either.
//!
//! ## Retry Strategy
//!
//! Only [`ProviderError::RateLimited`] is retried. Gemini enforces per-minute
//! quotas, and a user generating a summary and then a quiz in quick
//! succession is the typical trigger; a short wait clears it. Every other
//! failure (bad key, blocked prompt, network fault) is returned on the first
//! attempt.
//!
//! Backoff is linear: the n-th retry waits `n × base_delay` plus up to
//! `jitter` of random delay. With the defaults (3 attempts, 2 s base, 1 s
//! jitter) the worst case is roughly 2 s → 4 s, about 8 s per call.
//! Each call has its own budget; nothing is shared across requests.
//!
//! A `Retry-After` hint on the 429 raises the wait to the server's value,
//! capped at [`RetryPolicy::max_server_delay`] so a hostile header cannot
//! stall the caller.

use crate::config::StudyConfig;
use crate::error::{ProviderError, StudyAidError};
use crate::provider::{GenerativeProvider, ModelHandle, RawModelResponse};
use rand::Rng;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Attempt budget and backoff shape for one provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Always ≥ 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter: Duration,
    /// Upper bound on a server-requested `Retry-After` wait.
    pub max_server_delay: Duration,
}

/// Cap on `Retry-After` for policies built from configuration.
pub const MAX_SERVER_DELAY: Duration = Duration::from_secs(30);

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            jitter: Duration::from_secs(1),
            max_server_delay: MAX_SERVER_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &StudyConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            jitter: Duration::from_millis(config.retry_jitter_ms),
            max_server_delay: MAX_SERVER_DELAY,
        }
    }

    /// A policy that retries without waiting, ignoring `Retry-After`. Handy in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            jitter: Duration::ZERO,
            max_server_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based), jitter excluded.
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry)
    }

    fn jittered(&self, retry: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.backoff(retry) + Duration::from_millis(extra)
    }

    /// Wait before retry number `retry` after `err`: the jittered backoff,
    /// or the capped server hint when that is longer.
    pub fn delay_for(&self, retry: u32, err: &ProviderError) -> Duration {
        let hinted = err
            .retry_after()
            .map(|d| d.min(self.max_server_delay))
            .unwrap_or(Duration::ZERO);
        self.jittered(retry).max(hinted)
    }
}

/// A successful call and how many attempts it took.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub response: RawModelResponse,
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Call `provider.generate` with the retry policy applied.
///
/// # Errors
/// [`StudyAidError::Provider`] carrying the last [`ProviderError`] and the
/// number of attempts made: 1 for a permanent error, `max_attempts` when
/// the rate limit never cleared.
pub async fn invoke(
    provider: &dyn GenerativeProvider,
    model: &ModelHandle,
    prompt: &str,
    policy: &RetryPolicy,
) -> Result<Invocation, StudyAidError> {
    let start = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match provider.generate(model, prompt).await {
            Ok(response) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                debug!(
                    "{}: {:?} input tokens, {:?} output tokens, attempt {}, {}ms",
                    model, response.prompt_tokens, response.completion_tokens, attempt, duration_ms
                );
                return Ok(Invocation {
                    response,
                    attempts: attempt,
                    duration_ms,
                });
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let wait = policy.delay_for(attempt, &e);
                warn!(
                    "{}: rate limited (attempt {}/{}), retrying in {}ms",
                    model,
                    attempt,
                    max_attempts,
                    wait.as_millis()
                );
                sleep(wait).await;
            }
            Err(e) => {
                log_failure(model, attempt, &e);
                return Err(StudyAidError::Provider {
                    attempts: attempt,
                    source: e,
                });
            }
        }
    }
}

fn log_failure(model: &ModelHandle, attempt: u32, e: &ProviderError) {
    if e.is_transient() {
        warn!("{}: still rate limited after {} attempts", model, attempt);
    } else {
        warn!("{}: attempt {} failed: {}", model, attempt, e);
    }
}
