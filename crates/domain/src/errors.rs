//! Error taxonomy for every client operation

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::impl_wire_name_conversions;
use crate::types::{AcceptedResult, ErrorField, ResponseHeader, ResponseStatus};

/// Coarse classification of a [`PangeaError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidConfig,
    InvalidArgument,
    UnmarshalError,
    ApiError,
    Accepted,
    Timeout,
    Cancelled,
    UploadFailed,
    Unauthorized,
    RateLimited,
    Transport,
    Io,
}

impl_wire_name_conversions!(ErrorKind {
    InvalidConfig => "invalid-config",
    InvalidArgument => "invalid-argument",
    UnmarshalError => "unmarshal-error",
    ApiError => "api-error",
    Accepted => "accepted",
    Timeout => "timeout",
    Cancelled => "cancelled",
    UploadFailed => "upload-failed",
    Unauthorized => "unauthorized",
    RateLimited => "rate-limited",
    Transport => "transport",
    Io => "io",
});

/// A failed envelope: status, header and `result.errors`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: ResponseStatus,
    pub header: ResponseHeader,
    pub errors: Vec<ErrorField>,
    pub http_status: u16,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (request {})", self.status, self.header.summary, self.header.request_id)?;
        for field in &self.errors {
            write!(f, "; {} {}", field.code, field.detail)?;
            if let Some(path) = &field.path {
                write!(f, " at {path}")?;
            }
        }
        Ok(())
    }
}

/// The request was accepted and its result is still pending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedError {
    pub request_id: String,
    pub header: ResponseHeader,
    pub accepted_result: Option<AcceptedResult>,
    pub http_status: u16,
}

/// Main error type for Pangea client operations
#[derive(Error, Debug)]
pub enum PangeaError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to decode response: {message}")]
    Unmarshal { message: String, body: Vec<u8> },

    #[error("Response {} carries a result but no receiver was given", .0.request_id)]
    UnmarshalTargetMissing(Box<ResponseHeader>),

    #[error("Response {} has no result field", .0.request_id)]
    ResultFieldMissing(Box<ResponseHeader>),

    #[error("API error: {0}")]
    Api(Box<ApiError>),

    #[error("Unauthorized: {0}")]
    Unauthorized(Box<ApiError>),

    #[error("Rate limited: {0}")]
    RateLimited(Box<ApiError>),

    #[error("Request {} accepted, result still pending", .0.request_id)]
    Accepted(Box<AcceptedError>),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Upload failed{}: {message}", .status.map(|s| format!(" with HTTP {s}")).unwrap_or_default())]
    UploadFailed { status: Option<u16>, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl PangeaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Unmarshal { .. } | Self::UnmarshalTargetMissing(_) => ErrorKind::UnmarshalError,
            Self::ResultFieldMissing(_) | Self::Api(_) => ErrorKind::ApiError,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::Accepted(_) => ErrorKind::Accepted,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::UploadFailed { .. } => ErrorKind::UploadFailed,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether repeating the same call could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::RateLimited(_) | Self::Accepted(_) => true,
            Self::Api(api) => matches!(
                api.status,
                ResponseStatus::ServiceTemporarilyUnavailable | ResponseStatus::ServiceNotAvailable
            ),
            Self::UploadFailed { status, .. } => status.map_or(true, |code| code >= 500),
            _ => false,
        }
    }

    /// Request id of the response that produced this error, when known
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::UnmarshalTargetMissing(header) | Self::ResultFieldMissing(header) => {
                Some(&header.request_id)
            }
            Self::Api(api) | Self::Unauthorized(api) | Self::RateLimited(api) => {
                Some(&api.header.request_id)
            }
            Self::Accepted(accepted) => Some(&accepted.request_id),
            _ => None,
        }
    }

    /// The failed envelope, for the API-level variants
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(api) | Self::Unauthorized(api) | Self::RateLimited(api) => Some(api),
            _ => None,
        }
    }

    /// The pending handle, for the `Accepted` variant
    pub fn accepted(&self) -> Option<&AcceptedError> {
        match self {
            Self::Accepted(accepted) => Some(accepted),
            _ => None,
        }
    }
}

/// Result type alias for Pangea operations
pub type Result<T> = std::result::Result<T, PangeaError>;
