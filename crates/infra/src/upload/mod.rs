//! Upload orchestration
//!
//! The request's transfer method picks the strategy:
//!
//! - `multipart`: one `multipart/form-data` POST to the service endpoint
//! - `put_url`: negotiate a presigned URL, PUT the raw bytes, poll
//! - `post_url`: like `put_url`, with a presigned form POST in phase 2
//!
//! Bodies are read into memory once so the retrying client can replay
//! them. The file source is owned by the call and dropped on every path.

pub mod hashing;

use std::collections::BTreeMap;

use bytes::Bytes;
use pangea_core::{CallContext, FileUpload, UploadSource};
use pangea_domain::constants::{
    CONTENT_TYPE_OCTET_STREAM, MULTIPART_REQUEST_PART, POST_URL_FILE_FIELD,
};
use pangea_domain::{
    AcceptedError, AcceptedResult, PangeaError, PangeaResponse, Result, TransferMethod,
    Transferable,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

pub use hashing::{digest, read_all, DigestSelection, FileDigest};

use crate::envelope::decode;
use crate::errors::InfraError;
use crate::http::{RawResponse, RequestLabels, Transport};
use crate::multipart::MultipartWriter;
use crate::poller::Poller;

/// Runs uploads against one service
pub struct Uploader<'a> {
    transport: &'a Transport,
    service: &'a str,
}

impl<'a> Uploader<'a> {
    pub fn new(transport: &'a Transport, service: &'a str) -> Self {
        Self { transport, service }
    }

    /// Upload `file` with the strategy named by the request
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for methods without a body, `UploadFailed` when
    /// the presigned transfer is refused, `Accepted` when queued retry is
    /// disabled or the poll budget runs out, otherwise the decoded failure.
    pub async fn post_with_file<Q, R, S>(
        &self,
        ctx: &CallContext,
        path: &str,
        mut request: Q,
        file: FileUpload<S>,
    ) -> Result<PangeaResponse<R>>
    where
        Q: Serialize + Transferable,
        R: DeserializeOwned,
        S: UploadSource,
    {
        let method = request.transfer_method();
        let FileUpload { mut source, filename, field_name, content_type } = file;
        debug!(service = self.service, path, transfer_method = %method, %filename, "starting upload");

        if !method.carries_body() {
            return Err(PangeaError::InvalidArgument(format!(
                "transfer method {method} carries no file; use a call without a file"
            )));
        }
        if method.requires_digest() {
            fill_digest(&mut request, &mut source).await?;
        }
        let content = read_all(&mut source).await?;
        drop(source);
        let content_type = content_type.or_else(|| request.declared_mimetype().map(str::to_owned));

        if method == TransferMethod::Multipart {
            let part_type = content_type.as_deref().unwrap_or(CONTENT_TYPE_OCTET_STREAM);
            return self
                .multipart(ctx, path, &request, &field_name, &filename, part_type, &content)
                .await;
        }

        let accepted = match self.negotiate::<Q, R>(ctx, path, &request).await? {
            Negotiated::Ready(response) => return Ok(response),
            Negotiated::Pending(accepted) => accepted,
        };
        let handle = accepted.accepted_result.clone().unwrap_or_default();
        if method == TransferMethod::PutUrl {
            let put_url = presigned(handle.put_url.as_deref(), "put_url")?;
            self.put(ctx, put_url, &handle, content_type.as_deref(), content).await?;
        } else {
            let post_url = presigned(handle.post_url.as_deref(), "post_url")?;
            self.post_form(ctx, post_url, &handle, &filename, content_type.as_deref(), content)
                .await?;
        }
        self.complete(ctx, accepted).await
    }

    /// Phase 1 only: ask the service for a presigned URL
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless the method is `put_url`, or `post_url` with
    /// crc32c, sha256 and size declared. `UploadFailed` when the service
    /// answers without a presigned URL.
    pub async fn request_upload_url<Q>(
        &self,
        ctx: &CallContext,
        path: &str,
        request: &Q,
    ) -> Result<PangeaResponse<AcceptedResult>>
    where
        Q: Serialize + Transferable + ?Sized,
    {
        let method = request.transfer_method();
        if !method.carries_body() || method == TransferMethod::Multipart {
            return Err(PangeaError::InvalidArgument(format!(
                "transfer method {method} does not use a presigned upload URL"
            )));
        }
        if method.requires_digest() && !request.transfer_request().has_digest() {
            return Err(PangeaError::InvalidArgument(format!(
                "{method} requires crc32c, sha256 and size"
            )));
        }

        match self.negotiate::<Q, serde_json::Value>(ctx, path, request).await? {
            Negotiated::Pending(accepted) => {
                let handle = accepted
                    .accepted_result
                    .clone()
                    .filter(|handle| handle.put_url.is_some() || handle.post_url.is_some())
                    .ok_or_else(|| PangeaError::UploadFailed {
                        status: None,
                        message: format!("request {} returned no presigned URL", accepted.request_id),
                    })?;
                Ok(PangeaResponse {
                    header: accepted.header,
                    http_status: accepted.http_status,
                    result: handle.clone(),
                    accepted_result: Some(handle),
                    attached_files: Vec::new(),
                })
            }
            Negotiated::Ready(response) => Err(PangeaError::UploadFailed {
                status: None,
                message: format!("request {} completed without a presigned URL", response.request_id()),
            }),
        }
    }

    /// Phase 2 only: send `file` to a URL negotiated earlier
    ///
    /// `put_url` wins when the handle carries both.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the handle has no URL, `UploadFailed` when
    /// the transfer is refused.
    pub async fn upload_to_presigned_url<S>(
        &self,
        ctx: &CallContext,
        handle: &AcceptedResult,
        file: FileUpload<S>,
    ) -> Result<()>
    where
        S: UploadSource,
    {
        let FileUpload { mut source, filename, content_type, .. } = file;
        let content = read_all(&mut source).await?;
        drop(source);

        if let Some(put_url) = handle.put_url.as_deref() {
            return self.put(ctx, parse_url(put_url)?, handle, content_type.as_deref(), content).await;
        }
        let post_url = presigned(handle.post_url.as_deref(), "put_url or post_url")?;
        self.post_form(ctx, post_url, handle, &filename, content_type.as_deref(), content).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn multipart<Q, R>(
        &self,
        ctx: &CallContext,
        path: &str,
        request: &Q,
        field_name: &str,
        filename: &str,
        part_type: &str,
        content: &[u8],
    ) -> Result<PangeaResponse<R>>
    where
        Q: Serialize,
        R: DeserializeOwned,
    {
        let json = serde_json::to_vec(request).map_err(InfraError::from)?;
        let mut writer = MultipartWriter::new();
        writer
            .json_field(MULTIPART_REQUEST_PART, &json)
            .file_field(field_name, filename, part_type, content);
        let content_type = writer.content_type();
        let body = writer.finish();

        let url = self.transport.url(self.service, path)?;
        let labels = RequestLabels { service: self.service, path, request_id: None };
        let response = self.transport.post_body(ctx, labels, url, body, &content_type).await?;
        match decode::<R>(&response) {
            Err(PangeaError::Accepted(accepted)) => self.complete(ctx, *accepted).await,
            outcome => outcome,
        }
    }

    async fn negotiate<Q, R>(&self, ctx: &CallContext, path: &str, request: &Q) -> Result<Negotiated<R>>
    where
        Q: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = serde_json::to_vec(request).map_err(InfraError::from)?;
        let url = self.transport.url(self.service, path)?;
        let labels = RequestLabels { service: self.service, path, request_id: None };
        let response = self.transport.post_json(ctx, labels, url, Bytes::from(body)).await?;
        match decode::<R>(&response) {
            Ok(ready) => Ok(Negotiated::Ready(ready)),
            Err(PangeaError::Accepted(accepted)) => {
                debug!(request_id = %accepted.request_id, "presigned URL negotiated");
                Ok(Negotiated::Pending(*accepted))
            }
            Err(err) => Err(err),
        }
    }

    async fn put(
        &self,
        ctx: &CallContext,
        url: Url,
        handle: &AcceptedResult,
        content_type: Option<&str>,
        content: Bytes,
    ) -> Result<()> {
        let mut headers = upload_headers(handle.upload_headers.as_ref())?;
        if !headers.contains_key(CONTENT_TYPE) {
            let value = content_type.unwrap_or(CONTENT_TYPE_OCTET_STREAM);
            headers.insert(CONTENT_TYPE, header_value(value)?);
        }
        let size = content.len();
        let response = self
            .transport
            .send_direct(ctx, Method::PUT, url, headers, Some(content))
            .await
            .map_err(phase_two_failure)?;
        check_transfer(&response)?;
        info!(service = self.service, bytes = size, "presigned PUT complete");
        Ok(())
    }

    async fn post_form(
        &self,
        ctx: &CallContext,
        url: Url,
        handle: &AcceptedResult,
        filename: &str,
        content_type: Option<&str>,
        content: Bytes,
    ) -> Result<()> {
        let mut writer = MultipartWriter::new();
        for (name, value) in handle.form_fields() {
            writer.text_field(&name, &value);
        }
        writer.file_field(
            POST_URL_FILE_FIELD,
            filename,
            content_type.unwrap_or(CONTENT_TYPE_OCTET_STREAM),
            &content,
        );
        let mut headers = upload_headers(handle.upload_headers.as_ref())?;
        headers.insert(CONTENT_TYPE, header_value(&writer.content_type())?);
        let body = writer.finish();

        let response = self
            .transport
            .send_direct(ctx, Method::POST, url, headers, Some(body))
            .await
            .map_err(phase_two_failure)?;
        check_transfer(&response)?;
        info!(service = self.service, bytes = content.len(), "presigned POST complete");
        Ok(())
    }

    /// Phase 3: poll when queued retry is on, hand back the handle otherwise
    async fn complete<R: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        accepted: AcceptedError,
    ) -> Result<PangeaResponse<R>> {
        if self.transport.config().queued_retry_enabled() {
            Poller::new(self.transport, self.service).wait(ctx, accepted).await
        } else {
            Err(PangeaError::Accepted(Box::new(accepted)))
        }
    }
}

enum Negotiated<R> {
    Ready(PangeaResponse<R>),
    Pending(AcceptedError),
}

async fn fill_digest<Q, S>(request: &mut Q, source: &mut S) -> Result<()>
where
    Q: Transferable,
    S: UploadSource,
{
    if request.transfer_request().has_digest() {
        return Ok(());
    }
    let computed = digest(source, DigestSelection::default()).await?;
    let transfer = request.transfer_request_mut();
    transfer.crc32c.get_or_insert(computed.crc32c);
    transfer.sha256.get_or_insert(computed.sha256);
    transfer.size.get_or_insert(computed.size);
    Ok(())
}

fn presigned(url: Option<&str>, field: &str) -> Result<Url> {
    let url = url.filter(|url| !url.is_empty()).ok_or_else(|| PangeaError::UploadFailed {
        status: None,
        message: format!("accepted response carries no {field}"),
    })?;
    parse_url(url)
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|err| PangeaError::UploadFailed {
        status: None,
        message: format!("invalid presigned URL: {err}"),
    })
}

fn upload_headers(declared: Option<&BTreeMap<String, String>>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in declared.into_iter().flatten() {
        let header = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
            PangeaError::InvalidArgument(format!("invalid upload header {name:?}: {err}"))
        })?;
        headers.insert(header, header_value(value)?);
    }
    Ok(headers)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|err| PangeaError::InvalidArgument(format!("invalid upload header value: {err}")))
}

fn check_transfer(response: &RawResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    warn!(status = response.status, "presigned transfer rejected");
    Err(PangeaError::UploadFailed { status: Some(response.status), message: response.text() })
}

fn phase_two_failure(err: PangeaError) -> PangeaError {
    match err {
        PangeaError::Transport(message) => PangeaError::UploadFailed { status: None, message },
        other => other,
    }
}
