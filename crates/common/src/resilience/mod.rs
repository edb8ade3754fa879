//! Resilience patterns for transient failures
//!
//! The retry executor is generic over the operation's error type. Callers
//! supply a [`RetryPolicy`] that classifies errors, and a
//! [`tokio_util::sync::CancellationToken`] that interrupts backoff sleeps.

pub mod retry;

pub use retry::{
    sleep_or_cancel, BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder,
    RetryDecision, RetryError, RetryExecutor, RetryOutcome, RetryPolicy, RetryResult,
};
