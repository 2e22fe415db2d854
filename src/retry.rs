//! Bounded, fixed-delay retry around a single remote call.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

/// Whether retrying an error could change the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    Permanent,
}

/// Errors that know their own retry classification.
pub trait Retryable {
    fn classify(&self) -> ErrorClass;
}

/// Which failures the invoker is allowed to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryEligibility {
    /// Retry only errors classified as transient; permanent errors fail fast.
    TransientOnly,
    /// Retry every failure regardless of classification.
    All,
}

impl FromStr for RetryEligibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transient" | "transient_only" => Ok(Self::TransientOnly),
            "all" => Ok(Self::All),
            other => anyhow::bail!("RETRY_ON must be 'transient' or 'all', got '{}'", other),
        }
    }
}

/// Retry configuration: attempt cap, fixed delay, and eligibility.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first call. Never less than one.
    pub max_attempts: usize,
    /// Fixed pause between attempts; no backoff growth, no jitter.
    pub delay: Duration,
    pub eligibility: RetryEligibility,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
            eligibility: RetryEligibility::TransientOnly,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            ..Self::default()
        }
    }

    pub fn with_eligibility(mut self, eligibility: RetryEligibility) -> Self {
        self.eligibility = eligibility;
        self
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn should_retry<E: Retryable>(&self, error: &E) -> bool {
        match self.eligibility {
            RetryEligibility::All => true,
            RetryEligibility::TransientOnly => error.classify() == ErrorClass::Transient,
        }
    }

    /// Runs `operation` until it succeeds, hits a non-retryable error, or
    /// `max_attempts` is exhausted. The last error is returned as-is.
    pub async fn invoke<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if attempt >= max_attempts {
                        tracing::warn!(
                            "{} failed after {} attempt(s): {}",
                            label,
                            attempt,
                            e
                        );
                        return Err(e);
                    }
                    if !self.should_retry(&e) {
                        tracing::warn!("{} failed with non-retryable error: {}", label, e);
                        return Err(e);
                    }
                    tracing::warn!(
                        "{} attempt {}/{} failed: {}. Retrying in {:?}",
                        label,
                        attempt,
                        max_attempts,
                        e,
                        self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
