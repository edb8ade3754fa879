//! # Pangea Domain
//!
//! Pure data model for the Pangea client.
//!
//! This crate contains:
//! - Client configuration and the service URL resolver
//! - The response envelope, status vocabulary and error taxonomy
//! - Transfer-request types used by file endpoints
//! - The filter DSL used by list endpoints
//! - Request/response schemas of the object store service
//!
//! ## Architecture
//! - No dependencies on other Pangea crates
//! - No I/O; everything here is data and validation

pub mod config;
pub mod constants;
pub mod errors;
pub mod filter;
pub mod macros;
pub mod resolver;
pub mod types;

// Re-export commonly used items
pub use config::{Config, ConfigBuilder};
pub use errors::*;
pub use resolver::resolve_url;
pub use types::*;
