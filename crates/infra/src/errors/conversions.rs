//! Conversions from external infrastructure errors into domain errors.

use std::io::Error as IoError;

use pangea_domain::PangeaError;
use reqwest::Error as HttpError;
use serde_json::Error as JsonError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub PangeaError);

impl From<InfraError> for PangeaError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<PangeaError> for InfraError {
    fn from(value: PangeaError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoPangeaError {
    fn into_pangea(self) -> PangeaError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → PangeaError */
/* -------------------------------------------------------------------------- */

impl IntoPangeaError for HttpError {
    fn into_pangea(self) -> PangeaError {
        if self.is_builder() {
            return PangeaError::InvalidArgument(format!("invalid HTTP request: {self}"));
        }

        if self.is_timeout() {
            return PangeaError::Transport(format!("HTTP request timed out: {self}"));
        }

        #[cfg(not(target_arch = "wasm32"))]
        if self.is_connect() {
            return PangeaError::Transport(format!("HTTP connection failure: {self}"));
        }

        if self.is_decode() || self.is_body() {
            return PangeaError::Unmarshal {
                message: format!("failed to read response body: {self}"),
                body: Vec::new(),
            };
        }

        if let Some(status) = self.status() {
            return PangeaError::Transport(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("unknown status")
            ));
        }

        PangeaError::Transport(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_pangea())
    }
}

/* -------------------------------------------------------------------------- */
/* std::io::Error → PangeaError */
/* -------------------------------------------------------------------------- */

impl IntoPangeaError for IoError {
    fn into_pangea(self) -> PangeaError {
        PangeaError::Io(format!("{:?}: {self}", self.kind()))
    }
}

impl From<IoError> for InfraError {
    fn from(value: IoError) -> Self {
        InfraError(value.into_pangea())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → PangeaError */
/* -------------------------------------------------------------------------- */

impl IntoPangeaError for JsonError {
    fn into_pangea(self) -> PangeaError {
        if self.is_io() {
            return PangeaError::Io(self.to_string());
        }
        PangeaError::InvalidArgument(format!("request cannot be encoded as JSON: {self}"))
    }
}

impl From<JsonError> for InfraError {
    fn from(value: JsonError) -> Self {
        InfraError(value.into_pangea())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
