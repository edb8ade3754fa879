//! The uniform response envelope
//!
//! Every endpoint answers with the same header fields plus either a
//! `result` object or an error payload under `result.errors`. Accepted
//! responses additionally carry an [`AcceptedResult`], either at the top
//! level or nested in `result`.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::attached::AttachedFile;
use super::status::ResponseStatus;
use crate::errors::{AcceptedError, ApiError, PangeaError};

/// Correlation fields present on every response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub request_id: String,
    #[serde(default)]
    pub request_time: String,
    #[serde(default)]
    pub response_time: String,
    pub status: ResponseStatus,
    #[serde(default)]
    pub summary: String,
}

/// One entry of `result.errors`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorField {
    pub code: String,
    pub detail: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Handle returned with an `Accepted` status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_form_data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_mins: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_headers: Option<BTreeMap<String, String>>,
}

impl AcceptedResult {
    /// Presigned POST form fields in server order, values stringified
    pub fn form_fields(&self) -> Vec<(String, String)> {
        self.post_form_data
            .iter()
            .flat_map(|map| map.iter())
            .map(|(key, value)| {
                let value = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Envelope as received, before classification
#[derive(Debug, Clone, Deserialize)]
pub struct RawEnvelope {
    #[serde(flatten)]
    pub header: ResponseHeader,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub accepted_result: Option<AcceptedResult>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    errors: Vec<ErrorField>,
}

impl RawEnvelope {
    pub fn status(&self) -> &ResponseStatus {
        &self.header.status
    }

    /// The accepted handle, falling back to fields nested under `result`
    pub fn accepted_result(&self) -> Option<AcceptedResult> {
        if let Some(accepted) = &self.accepted_result {
            return Some(accepted.clone());
        }
        let nested = self.result.as_ref().filter(|value| value.is_object())?;
        serde_json::from_value::<AcceptedResult>(nested.clone())
            .ok()
            .filter(|accepted| !accepted.is_empty())
    }

    /// `result.errors`, empty when absent or malformed
    pub fn error_fields(&self) -> Vec<ErrorField> {
        self.result
            .as_ref()
            .and_then(|value| serde_json::from_value::<ErrorPayload>(value.clone()).ok())
            .map(|payload| payload.errors)
            .unwrap_or_default()
    }

    /// Decode a successful envelope into a typed result
    ///
    /// # Errors
    ///
    /// `ResultFieldMissing` when `result` is absent, `Unmarshal` when it
    /// does not match `R`.
    pub fn into_response<R: DeserializeOwned>(
        self,
        http_status: u16,
    ) -> Result<PangeaResponse<R>, PangeaError> {
        let accepted_result = self.accepted_result();
        let Some(raw) = self.result else {
            return Err(PangeaError::ResultFieldMissing(Box::new(self.header)));
        };
        let result = serde_json::from_value::<R>(raw.clone()).map_err(|err| {
            PangeaError::Unmarshal {
                message: format!("result does not match the expected shape: {err}"),
                body: serde_json::to_vec(&raw).unwrap_or_default(),
            }
        })?;
        Ok(PangeaResponse {
            header: self.header,
            http_status,
            result,
            accepted_result,
            attached_files: Vec::new(),
        })
    }

    /// Decode a successful envelope whose caller expects no result
    ///
    /// # Errors
    ///
    /// `UnmarshalTargetMissing` when the envelope carries a non-null `result`.
    pub fn into_header_response(self, http_status: u16) -> Result<PangeaResponse<()>, PangeaError> {
        if self.result.as_ref().is_some_and(|value| !value.is_null()) {
            return Err(PangeaError::UnmarshalTargetMissing(Box::new(self.header)));
        }
        Ok(PangeaResponse {
            accepted_result: self.accepted_result(),
            header: self.header,
            http_status,
            result: (),
            attached_files: Vec::new(),
        })
    }

    /// Build the `accepted` signal for this envelope
    pub fn into_accepted_error(self, http_status: u16) -> PangeaError {
        let accepted_result = self.accepted_result();
        PangeaError::Accepted(Box::new(AcceptedError {
            request_id: self.header.request_id.clone(),
            header: self.header,
            accepted_result,
            http_status,
        }))
    }

    /// Build the typed failure for a non-success, non-accepted envelope
    pub fn into_api_error(self, http_status: u16) -> PangeaError {
        let errors = self.error_fields();
        let status = self.header.status.clone();
        let api = Box::new(ApiError { status: status.clone(), header: self.header, errors, http_status });
        match status {
            ResponseStatus::Unauthorized => PangeaError::Unauthorized(api),
            ResponseStatus::TooManyRequests => PangeaError::RateLimited(api),
            _ => PangeaError::Api(api),
        }
    }
}

/// Decoded response handed to callers
#[derive(Debug, Clone)]
pub struct PangeaResponse<T> {
    pub header: ResponseHeader,
    pub http_status: u16,
    pub result: T,
    pub accepted_result: Option<AcceptedResult>,
    pub attached_files: Vec<AttachedFile>,
}

impl<T> PangeaResponse<T> {
    pub fn request_id(&self) -> &str {
        &self.header.request_id
    }

    pub fn status(&self) -> &ResponseStatus {
        &self.header.status
    }

    pub fn with_attached_files(mut self, attached_files: Vec<AttachedFile>) -> Self {
        self.attached_files = attached_files;
        self
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PangeaResponse<U> {
        PangeaResponse {
            header: self.header,
            http_status: self.http_status,
            result: f(self.result),
            accepted_result: self.accepted_result,
            attached_files: self.attached_files,
        }
    }
}
