//! Fixed-delay retry for assertion batches.
//!
//! Telemetry takes a roughly constant time to be ingested, so an assertion
//! batch is expected to fail at first and converge within the retry window.
//! Each attempt returns the full list of failures it observed; an empty list
//! is success. Only the final attempt's failures are surfaced.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

/// Errors that can be retried.
pub trait RetryableError {
    /// Whether another attempt could change the outcome.
    fn is_retryable(&self) -> bool;
}

/// Retry policy for assertion batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts including the first try (minimum 1).
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Attempts that will actually be made; at least one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Failure of a retried batch, holding the errors of the last attempt only.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed.
    Exhausted { attempts: u32, errors: Vec<E> },
    /// An attempt reported an error that retrying cannot fix.
    Fatal { attempt: u32, errors: Vec<E> },
}

impl<E> RetryError<E> {
    pub fn errors(&self) -> &[E] {
        match self {
            Self::Exhausted { errors, .. } | Self::Fatal { errors, .. } => errors,
        }
    }

    pub fn into_errors(self) -> Vec<E> {
        match self {
            Self::Exhausted { errors, .. } | Self::Fatal { errors, .. } => errors,
        }
    }

    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Fatal { attempt, .. } => *attempt,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { attempts, .. } => {
                write!(f, "assertions failed after {attempts} attempt(s)")?;
            }
            Self::Fatal { attempt, .. } => {
                write!(
                    f,
                    "assertions failed on attempt {attempt} with non-retryable errors"
                )?;
            }
        }
        for err in self.errors() {
            write!(f, "\n - {err}")?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Run `op` until it reports no errors, sleeping `policy.delay` in between.
pub fn retry<E, F>(phase: &str, policy: &RetryPolicy, op: F) -> Result<(), RetryError<E>>
where
    E: RetryableError + fmt::Display,
    F: FnMut() -> Vec<E>,
{
    retry_with_sleep(phase, policy, op, std::thread::sleep)
}

/// Same as [`retry`] with an injectable sleep.
pub fn retry_with_sleep<E, F, S>(
    phase: &str,
    policy: &RetryPolicy,
    mut op: F,
    mut sleep: S,
) -> Result<(), RetryError<E>>
where
    E: RetryableError + fmt::Display,
    F: FnMut() -> Vec<E>,
    S: FnMut(Duration),
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        debug!(phase, attempt, max_attempts, "Starting attempt");

        let errors = op();
        if errors.is_empty() {
            info!(phase, attempt, "Attempt succeeded");
            return Ok(());
        }

        for err in &errors {
            debug!(phase, attempt, error = %err, "Attempt error");
        }

        if errors.iter().any(|err| !err.is_retryable()) {
            warn!(
                phase,
                attempt,
                failures = errors.len(),
                "Attempt failed (non-retryable)"
            );
            return Err(RetryError::Fatal { attempt, errors });
        }

        if attempt >= max_attempts {
            warn!(
                phase,
                attempt,
                failures = errors.len(),
                "Attempt failed, retries exhausted"
            );
            return Err(RetryError::Exhausted {
                attempts: attempt,
                errors,
            });
        }

        warn!(
            phase,
            attempt,
            max_attempts,
            failures = errors.len(),
            delay_secs = policy.delay.as_secs_f64(),
            "Attempt failed (retryable), retrying after delay"
        );
        sleep(policy.delay);
        attempt += 1;
    }
}
