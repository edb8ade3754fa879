//! Envelope decoding
//!
//! Turns a [`RawResponse`] into a typed [`PangeaResponse`] or the matching
//! [`PangeaError`]. Classification order: `Success` decodes, HTTP 202 or an
//! `Accepted` status becomes the accepted signal, anything else is an API
//! failure.

use bytes::Bytes;
use pangea_domain::constants::HTTP_ACCEPTED;
use pangea_domain::{AttachedFile, PangeaError, PangeaResponse, RawEnvelope, Result};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::attach::{is_multipart, split_response};
use crate::http::RawResponse;

/// Parse the envelope, splitting attached files off multipart bodies
///
/// # Errors
///
/// [`PangeaError::Unmarshal`] carrying the raw body when it is not an
/// envelope.
pub fn parse(response: &RawResponse) -> Result<(RawEnvelope, Vec<AttachedFile>)> {
    let (body, files) = match response.content_type() {
        Some(content_type) if is_multipart(content_type) => split_response(response)?,
        _ => (response.body.clone(), Vec::new()),
    };
    let envelope = parse_body(&body)?;
    Ok((envelope, files))
}

fn parse_body(body: &Bytes) -> Result<RawEnvelope> {
    serde_json::from_slice::<RawEnvelope>(body).map_err(|err| PangeaError::Unmarshal {
        message: format!("response is not a Pangea envelope: {err}"),
        body: body.to_vec(),
    })
}

/// Envelope that decoded as `Success`, everything else as an error
///
/// # Errors
///
/// `Accepted` for HTTP 202 or an `Accepted` status, the API variants for
/// any other non-success status.
pub fn classify(envelope: RawEnvelope, http_status: u16) -> Result<RawEnvelope> {
    let status = envelope.status();
    if status.is_accepted() || http_status == HTTP_ACCEPTED {
        Err(envelope.into_accepted_error(http_status))
    } else if status.is_success() {
        Ok(envelope)
    } else {
        Err(envelope.into_api_error(http_status))
    }
}

/// Decode a response whose `result` is typed as `R`
///
/// # Errors
///
/// See [`parse`], [`classify`] and [`RawEnvelope::into_response`].
pub fn decode<R: DeserializeOwned>(response: &RawResponse) -> Result<PangeaResponse<R>> {
    let (envelope, files) = parse(response)?;
    log_envelope(&envelope, response.status);
    classify(envelope, response.status)?
        .into_response(response.status)
        .map(|decoded| decoded.with_attached_files(files))
}

/// Decode a response whose caller expects no `result`
///
/// # Errors
///
/// See [`parse`], [`classify`] and [`RawEnvelope::into_header_response`].
pub fn decode_without_result(response: &RawResponse) -> Result<PangeaResponse<()>> {
    let (envelope, files) = parse(response)?;
    log_envelope(&envelope, response.status);
    classify(envelope, response.status)?
        .into_header_response(response.status)
        .map(|decoded| decoded.with_attached_files(files))
}

fn log_envelope(envelope: &RawEnvelope, http_status: u16) {
    debug!(
        request_id = %envelope.header.request_id,
        status = %envelope.status(),
        http_status,
        "decoded envelope"
    );
}
