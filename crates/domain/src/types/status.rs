//! Envelope status vocabulary

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Value of the envelope `status` field
///
/// Unknown values are kept verbatim in [`ResponseStatus::Other`] and are
/// treated as generic failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResponseStatus {
    Success,
    Accepted,
    ValidationError,
    NotFound,
    PermissionDenied,
    Unauthorized,
    ServiceTemporarilyUnavailable,
    InternalError,
    TooManyRequests,
    ServiceNotAvailable,
    Other(String),
}

impl ResponseStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "Success",
            Self::Accepted => "Accepted",
            Self::ValidationError => "ValidationError",
            Self::NotFound => "NotFound",
            Self::PermissionDenied => "PermissionDenied",
            Self::Unauthorized => "Unauthorized",
            Self::ServiceTemporarilyUnavailable => "ServiceTemporarilyUnavailable",
            Self::InternalError => "InternalError",
            Self::TooManyRequests => "TooManyRequests",
            Self::ServiceNotAvailable => "ServiceNotAvailable",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Success" => Self::Success,
            "Accepted" => Self::Accepted,
            "ValidationError" => Self::ValidationError,
            "NotFound" => Self::NotFound,
            "PermissionDenied" => Self::PermissionDenied,
            "Unauthorized" => Self::Unauthorized,
            "ServiceTemporarilyUnavailable" => Self::ServiceTemporarilyUnavailable,
            "InternalError" => Self::InternalError,
            "TooManyRequests" => Self::TooManyRequests,
            "ServiceNotAvailable" => Self::ServiceNotAvailable,
            other => Self::Other(other.to_string()),
        })
    }
}

impl From<String> for ResponseStatus {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

impl From<ResponseStatus> for String {
    fn from(value: ResponseStatus) -> Self {
        match value {
            ResponseStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}
