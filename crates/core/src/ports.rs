//! Port interface for service dispatch
//!
//! Every service method reduces to one of these calls. The implementation
//! in `pangea-infra` owns URL resolution, headers, retries, envelope
//! decoding, async polling and upload mechanics.

use async_trait::async_trait;
use pangea_domain::{AcceptedResult, PangeaResponse, Result, Transferable};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::CallContext;
use crate::upload::{FileUpload, UploadSource};

/// Dispatch primitives for one service
#[async_trait]
pub trait ServiceDispatch: Send + Sync {
    /// Service name substituted into the base-URL template
    fn service_name(&self) -> &str;

    /// POST `request` and decode the envelope
    ///
    /// An `Accepted` answer is returned as [`pangea_domain::PangeaError::Accepted`]
    /// without polling.
    async fn post_no_queue<Q, R>(
        &self,
        ctx: &CallContext,
        path: &str,
        request: &Q,
    ) -> Result<PangeaResponse<R>>
    where
        Q: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send;

    /// POST `request`; an `Accepted` answer is polled to completion when
    /// queued retry is enabled
    async fn post<Q, R>(&self, ctx: &CallContext, path: &str, request: &Q) -> Result<PangeaResponse<R>>
    where
        Q: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send;

    /// Upload `file` using the request's transfer method
    async fn post_with_file<Q, R, S>(
        &self,
        ctx: &CallContext,
        path: &str,
        request: Q,
        file: FileUpload<S>,
    ) -> Result<PangeaResponse<R>>
    where
        Q: Serialize + Transferable + Send + Sync,
        R: DeserializeOwned + Send,
        S: UploadSource;

    /// Negotiate a presigned URL (phase 1 only)
    async fn request_upload_url<Q>(
        &self,
        ctx: &CallContext,
        path: &str,
        request: &Q,
    ) -> Result<PangeaResponse<AcceptedResult>>
    where
        Q: Serialize + Transferable + Sync;

    /// Poll the result endpoint once for a previously accepted request
    async fn poll_result_by_id<R>(
        &self,
        ctx: &CallContext,
        request_id: &str,
    ) -> Result<PangeaResponse<R>>
    where
        R: DeserializeOwned + Send;
}
