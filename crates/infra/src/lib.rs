//! # Pangea Infrastructure
//!
//! Implementations of the `pangea-core` ports over HTTP.
//!
//! This crate contains:
//! - The retrying HTTP client and the Pangea transport
//! - Envelope decoding and async result polling
//! - Upload orchestration, hashing and the multipart codec
//! - Multipart response splitting and attached-file saving
//! - [`PangeaClient`] / [`ServiceClient`], the dispatch implementation
//! - An opt-in configuration loader
//!
//! ## Architecture
//! - Implements traits defined in `pangea-core`
//! - Contains all "impure" code (network, file system, environment)

pub mod attach;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod errors;
pub mod http;
pub mod multipart;
pub mod poller;
pub mod upload;

// Re-export commonly used items
pub use dispatch::{PangeaClient, ServiceClient};
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder, RawResponse, Transport};
pub use poller::{PollSchedule, PollTarget, Poller};
pub use upload::{DigestSelection, FileDigest, Uploader};
