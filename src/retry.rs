//! Exponential backoff with jitter.
//!
//! Split into a pure classification policy ([`classify`]), a delay schedule
//! ([`RetryPolicy`]) and a generic driver ([`with_retry`]) that sleeps through
//! a [`Sleeper`], so each piece can be exercised on its own.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use metrics::increment_counter;
use rand::Rng;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{error, warn};

use crate::error::ModelError;
use crate::transport::TransportFailure;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Upper bound for the exponential part of the delay
    pub max_delay: Duration,
    /// Upper bound for the random jitter added to every delay
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_RETRIES)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(8000),
            max_jitter: Duration::from_millis(500),
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.max_jitter = Duration::ZERO;
        self
    }

    /// Exponential part of the delay after failed attempt `attempt` (1-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Base delay plus uniform jitter in `0..=max_jitter`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.base_delay(attempt) + Duration::from_millis(jitter)
    }

    /// Worst-case time spent sleeping across one call.
    pub fn max_total_delay(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.base_delay(attempt) + self.max_jitter)
            .sum()
    }
}

/// Suspension point between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Failure of a single attempt, before it is mapped onto [`ModelError`].
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("HTTP {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error(transparent)]
    Transport(#[from] TransportFailure),
}

/// Whether another attempt may help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Transient,
    Fatal,
}

/// 429, 5xx and transport failures are transient; everything else is fatal.
pub fn classify(error: &AttemptError) -> Disposition {
    match error {
        AttemptError::Status { status, .. }
            if *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() =>
        {
            Disposition::Transient
        }
        AttemptError::Status { .. } => Disposition::Fatal,
        AttemptError::Transport(_) => Disposition::Transient,
    }
}

impl From<AttemptError> for ModelError {
    fn from(error: AttemptError) -> Self {
        match error {
            AttemptError::Status { status, .. } if status == StatusCode::UNAUTHORIZED => {
                ModelError::Authentication("the API key was rejected by the provider".to_string())
            }
            AttemptError::Status { status, .. } if status == StatusCode::TOO_MANY_REQUESTS => {
                ModelError::RateLimit("too many requests, try again shortly".to_string())
            }
            AttemptError::Status { status, .. } if status.is_server_error() => ModelError::Network(
                format!("the service is temporarily unavailable ({}), try again", status),
            ),
            AttemptError::Status { status, message } => ModelError::Api { status, message },
            AttemptError::Transport(failure) => ModelError::Network(failure.to_string()),
        }
    }
}

/// Execute an async operation with retry logic.
///
/// `operation` receives the 1-based attempt number. Attempts run strictly one
/// after another; a transient failure before the last attempt sleeps for
/// `policy.delay_for(attempt)` first. The last error is returned unchanged.
pub async fn with_retry<T, E, Op, Fut, C>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    classify: C,
    mut operation: Op,
) -> Result<T, E>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> Disposition,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if classify(&err) == Disposition::Fatal {
            error!(attempt, error = %err, "attempt failed with a non-retryable error");
            return Err(err);
        }
        if attempt >= max_attempts {
            error!(attempts = attempt, error = %err, "giving up after exhausting retries");
            return Err(err);
        }

        let delay = policy.delay_for(attempt);
        warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Retrying after error: {}",
            err
        );
        increment_counter!("llm_retries_total");
        sleeper.sleep(delay).await;
        attempt += 1;
    }
}
