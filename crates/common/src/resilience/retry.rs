//! Generic retry strategy with cancellation-aware backoff
//!
//! The executor drives an async operation until it succeeds, the policy
//! declines another attempt, the attempt budget is spent or the caller's
//! [`CancellationToken`] fires. Every sleep between attempts is a
//! cancellation point.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Errors that can occur during retry operations
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// All retry attempts have been exhausted; `last` is the final failure
    #[error("All retry attempts exhausted after {attempts} tries")]
    AttemptsExhausted { attempts: u32, last: E },

    /// The operation failed with an error the policy refused to retry
    #[error("Operation failed with non-retryable error after {attempts} tries")]
    NonRetryable { attempts: u32, source: E },

    /// The cancellation token fired before the operation completed
    #[error("Retry cancelled after {attempts} tries")]
    Cancelled { attempts: u32 },

    /// The retry configuration is invalid
    #[error("Invalid retry configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl<E> RetryError<E> {
    /// The last error produced by the operation, if any.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::AttemptsExhausted { last, .. } => Some(last),
            Self::NonRetryable { source, .. } => Some(source),
            Self::Cancelled { .. } | Self::InvalidConfiguration { .. } => None,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Outcome of a retry execution including result and summary statistics.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: RetryResult<T, E>,
    pub attempts: u32,
    pub total_delay: Duration,
    pub elapsed: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    /// Consume the outcome and return only the result.
    pub fn into_result(self) -> RetryResult<T, E> {
        self.result
    }
}

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    /// Decide whether `error`, produced by the zero-based `attempt`, is
    /// worth another attempt.
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry with the configured backoff delay
    Retry,
    /// Give up
    Stop,
}

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// Exponential backoff: `initial_delay * base^attempt`, capped at `max_delay`
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
}

impl BackoffStrategy {
    /// Calculate the un-jittered delay for the given zero-based attempt
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed(delay) => *delay,
            BackoffStrategy::Exponential { initial_delay, base, max_delay } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let delay = initial_delay.as_secs_f64() * base.powi(exponent);
                if !delay.is_finite() || delay >= max_delay.as_secs_f64() {
                    *max_delay
                } else {
                    Duration::from_secs_f64(delay)
                }
            }
        }
    }
}

/// Jitter applied on top of a computed delay
#[derive(Debug, Clone, PartialEq)]
pub enum Jitter {
    /// No jitter
    None,
    /// Full jitter: uniform in `[0, delay]`
    Full,
    /// Additive jitter: `delay` plus uniform in `[0, delay * fraction]`
    Additive { fraction: f64 },
}

impl Jitter {
    /// Apply jitter to the calculated delay
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Full => random_up_to(delay),
            Jitter::Additive { fraction } => {
                let spread = delay.mul_f64(fraction.clamp(0.0, 1.0));
                delay + random_up_to(spread)
            }
        }
    }
}

fn random_up_to(max: Duration) -> Duration {
    let nanos = u64::try_from(max.as_nanos()).unwrap_or(u64::MAX);
    if nanos == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rand::thread_rng().gen_range(0..=nanos))
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Backoff strategy for calculating delays
    pub backoff: BackoffStrategy,
    /// Jitter type for randomizing delays
    pub jitter: Jitter,
    /// Lower bound applied after jitter
    pub min_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_secs(1),
                base: 2.0,
                max_delay: Duration::from_secs(30),
            },
            jitter: Jitter::Full,
            min_delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// A configuration that performs exactly one attempt.
    pub fn single_attempt() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RetryError<()>> {
        if self.max_attempts == 0 {
            return Err(RetryError::InvalidConfiguration {
                message: "max_attempts must be greater than 0".to_string(),
            });
        }

        if let BackoffStrategy::Exponential { base, initial_delay, max_delay } = &self.backoff {
            if *base <= 0.0 {
                return Err(RetryError::InvalidConfiguration {
                    message: "exponential base must be greater than 0".to_string(),
                });
            }
            if initial_delay > max_delay {
                return Err(RetryError::InvalidConfiguration {
                    message: "initial delay must not exceed max delay".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Delay to wait after the zero-based `attempt` failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.jitter.apply(self.backoff.calculate_delay(attempt));
        delay.max(self.min_delay)
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        base: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, base, max_delay };
        self
    }

    pub fn no_jitter(mut self) -> Self {
        self.config.jitter = Jitter::None;
        self
    }

    pub fn full_jitter(mut self) -> Self {
        self.config.jitter = Jitter::Full;
        self
    }

    pub fn min_delay(mut self, delay: Duration) -> Self {
        self.config.min_delay = delay;
        self
    }

    pub fn build(self) -> Result<RetryConfig, RetryError<()>> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Sleep for `delay` unless `cancel` fires first.
///
/// Returns `Err(())` when the token was cancelled.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<(), ()> {
    if cancel.is_cancelled() {
        return Err(());
    }
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(()),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

/// The main retry executor
#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    /// Create a new retry executor with the given configuration and policy
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    /// Execute an operation with retry logic.
    ///
    /// The operation receives the zero-based attempt index.
    pub async fn execute<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Debug,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_outcome(cancel, operation).await.into_result()
    }

    /// Execute an operation with retry logic and return outcome statistics.
    pub async fn execute_with_outcome<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> RetryOutcome<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Debug,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let mut total_delay = Duration::ZERO;
        let mut attempt: u32 = 0;

        loop {
            let outcome = |result, attempts, total_delay| RetryOutcome {
                result,
                attempts,
                total_delay,
                elapsed: started.elapsed(),
            };

            if cancel.is_cancelled() {
                return outcome(Err(RetryError::Cancelled { attempts: attempt }), attempt, total_delay);
            }

            let attempts_made = attempt + 1;
            let error = match operation(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempts = attempts_made, "operation succeeded after retries");
                    }
                    return outcome(Ok(value), attempts_made, total_delay);
                }
                Err(error) => error,
            };

            if attempts_made >= max_attempts {
                warn!(attempts = attempts_made, last_error = ?error, "all retry attempts exhausted");
                return outcome(
                    Err(RetryError::AttemptsExhausted { attempts: attempts_made, last: error }),
                    attempts_made,
                    total_delay,
                );
            }

            if self.policy.should_retry(&error, attempt) == RetryDecision::Stop {
                debug!(attempts = attempts_made, error = ?error, "retry policy declined");
                return outcome(
                    Err(RetryError::NonRetryable { attempts: attempts_made, source: error }),
                    attempts_made,
                    total_delay,
                );
            }
            let delay = self.config.delay_for(attempt);

            debug!(
                attempt = attempts_made,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = ?error,
                "retrying after backoff"
            );

            if sleep_or_cancel(delay, cancel).await.is_err() {
                return outcome(
                    Err(RetryError::Cancelled { attempts: attempts_made }),
                    attempts_made,
                    total_delay,
                );
            }
            total_delay += delay;
            attempt += 1;
        }
    }
}
