//! Generic building blocks shared across the Pangea client crates.
//!
//! Only runtime concerns live here: backoff strategies, jitter, retry
//! policies and a cancellable retry executor. Nothing in this crate knows
//! about HTTP or the platform's envelope.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod resilience;
