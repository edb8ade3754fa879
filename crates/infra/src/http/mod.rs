//! HTTP plumbing: the retrying client and the Pangea transport on top of it

pub mod client;
pub mod transport;

pub use client::{HttpClient, HttpClientBuilder, RequestLabels, API_RETRY_STATUSES, UPLOAD_RETRY_STATUSES};
pub use transport::{user_agent, RawResponse, Transport};
