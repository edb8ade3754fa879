//! # Pangea Core
//!
//! Ports shared by every service layer - no HTTP code.
//!
//! This crate contains:
//! - [`ServiceDispatch`], the dispatch primitives a service calls
//! - [`CallContext`], per-call cancellation and deadline
//! - [`FileUpload`], the file source handed to upload endpoints
//! - [`StoreService`], the object store built on the primitives
//!
//! ## Architecture Principles
//! - Only depends on `pangea-domain`
//! - Services hold a dispatcher by composition
//! - Transport, polling and upload mechanics live in `pangea-infra`

pub mod context;
pub mod ports;
pub mod store;
pub mod upload;

pub use context::CallContext;
pub use ports::ServiceDispatch;
pub use store::StoreService;
pub use upload::{FileUpload, UploadSource};
