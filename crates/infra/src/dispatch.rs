//! Service dispatch over the shared transport
//!
//! [`PangeaClient`] owns the connection pools for one configuration and
//! hands out cheap [`ServiceClient`]s, one per service, which implement
//! [`ServiceDispatch`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use pangea_core::store::STORE_SERVICE;
use pangea_core::{CallContext, FileUpload, ServiceDispatch, StoreService, UploadSource};
use pangea_domain::{
    AcceptedError, AcceptedResult, AttachedFile, Config, PangeaError, PangeaResponse, Result,
    Transferable,
};
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument::WithSubscriber;
use tracing::{info_span, Instrument};
use url::Url;

use crate::attach;
use crate::envelope::{decode, decode_without_result};
use crate::errors::InfraError;
use crate::http::{RawResponse, RequestLabels, Transport};
use crate::poller::{PollTarget, Poller};
use crate::upload::Uploader;

/// Entry point: one configuration, shared connection pools
#[derive(Clone)]
pub struct PangeaClient {
    transport: Arc<Transport>,
}

impl PangeaClient {
    /// # Errors
    ///
    /// [`PangeaError::InvalidConfig`] when the configuration cannot be
    /// turned into valid HTTP headers or clients.
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self { transport: Arc::new(Transport::new(config)?) })
    }

    pub fn config(&self) -> &Config {
        self.transport.config()
    }

    /// Client with a different configuration reusing these connections
    ///
    /// # Errors
    ///
    /// Same as [`PangeaClient::new`].
    pub fn with_config(&self, config: Config) -> Result<Self> {
        Ok(Self { transport: Arc::new(self.transport.derive(config)?) })
    }

    /// Dispatcher for the service named `name`
    pub fn service(&self, name: impl Into<String>) -> ServiceClient {
        ServiceClient { transport: Arc::clone(&self.transport), service: name.into() }
    }

    pub fn store(&self) -> StoreService<ServiceClient> {
        StoreService::new(self.service(STORE_SERVICE))
    }
}

/// [`ServiceDispatch`] for one service
#[derive(Clone)]
pub struct ServiceClient {
    transport: Arc<Transport>,
    service: String,
}

impl ServiceClient {
    pub fn config(&self) -> &Config {
        self.transport.config()
    }

    /// Run `fut` in a call span, under the configured logger when one is set
    async fn scoped<F>(&self, operation: &'static str, path: &str, fut: F) -> F::Output
    where
        F: Future,
    {
        let span_for = |service: &str| info_span!("pangea_call", service, operation, path);
        match self.transport.config().logger() {
            Some(dispatch) => {
                let span = tracing::dispatcher::with_default(dispatch, || span_for(&self.service));
                fut.instrument(span).with_subscriber(dispatch.clone()).await
            }
            None => fut.instrument(span_for(&self.service)).await,
        }
    }

    async fn send_json<Q>(&self, ctx: &CallContext, path: &str, request: &Q) -> Result<RawResponse>
    where
        Q: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(request).map_err(InfraError::from)?;
        let url = self.transport.url(&self.service, path)?;
        let labels = RequestLabels { service: &self.service, path, request_id: None };
        self.transport.post_json(ctx, labels, url, Bytes::from(body)).await
    }

    async fn resolve_accepted<R>(
        &self,
        ctx: &CallContext,
        outcome: Result<PangeaResponse<R>>,
    ) -> Result<PangeaResponse<R>>
    where
        R: DeserializeOwned,
    {
        match outcome {
            Err(PangeaError::Accepted(accepted)) if self.config().queued_retry_enabled() => {
                Poller::new(&self.transport, &self.service).wait(ctx, *accepted).await
            }
            outcome => outcome,
        }
    }

    /// POST a request whose response carries no `result`
    ///
    /// # Errors
    ///
    /// `UnmarshalTargetMissing` when the service does return a result,
    /// otherwise as [`ServiceDispatch::post_no_queue`].
    pub async fn post_without_result<Q>(
        &self,
        ctx: &CallContext,
        path: &str,
        request: &Q,
    ) -> Result<PangeaResponse<()>>
    where
        Q: Serialize + Sync + ?Sized,
    {
        self.scoped("post_without_result", path, async {
            let response = self.send_json(ctx, path, request).await?;
            decode_without_result(&response)
        })
        .await
    }

    /// Resume polling for an `Accepted` handle returned earlier
    ///
    /// # Errors
    ///
    /// `Accepted` again when the poll budget runs out, `Cancelled` when
    /// `ctx` is cancelled, otherwise the terminal outcome.
    pub async fn wait_for_result<R>(
        &self,
        ctx: &CallContext,
        accepted: AcceptedError,
    ) -> Result<PangeaResponse<R>>
    where
        R: DeserializeOwned + Send,
    {
        let path = accepted.request_id.clone();
        self.scoped("wait_for_result", &path, async {
            Poller::new(&self.transport, &self.service).wait(ctx, accepted).await
        })
        .await
    }

    /// Phase 2 of a presigned upload negotiated with `request_upload_url`
    ///
    /// # Errors
    ///
    /// See [`Uploader::upload_to_presigned_url`].
    pub async fn upload_to_presigned_url<S>(
        &self,
        ctx: &CallContext,
        handle: &AcceptedResult,
        file: FileUpload<S>,
    ) -> Result<()>
    where
        S: UploadSource,
    {
        self.scoped("upload_to_presigned_url", "", async {
            Uploader::new(&self.transport, &self.service)
                .upload_to_presigned_url(ctx, handle, file)
                .await
        })
        .await
    }

    /// Fetch a `dest_url` into an attached file
    ///
    /// The filename comes from `Content-Disposition`, then the URL, then a
    /// timestamp.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an unparseable URL, `Transport` when the
    /// download is refused.
    pub async fn download_file(&self, ctx: &CallContext, url: &str) -> Result<AttachedFile> {
        let url = Url::parse(url)
            .map_err(|err| PangeaError::InvalidArgument(format!("invalid download URL: {err}")))?;
        let path = url.path().to_string();
        self.scoped("download_file", &path, async {
            let response =
                self.transport.send_direct(ctx, Method::GET, url, HeaderMap::new(), None).await?;
            if !response.is_success() {
                return Err(PangeaError::Transport(format!(
                    "download failed with HTTP {}: {}",
                    response.status,
                    response.text()
                )));
            }
            Ok(attach::from_download(&response))
        })
        .await
    }
}

#[async_trait]
impl ServiceDispatch for ServiceClient {
    fn service_name(&self) -> &str {
        &self.service
    }

    async fn post_no_queue<Q, R>(
        &self,
        ctx: &CallContext,
        path: &str,
        request: &Q,
    ) -> Result<PangeaResponse<R>>
    where
        Q: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send,
    {
        self.scoped("post_no_queue", path, async {
            let response = self.send_json(ctx, path, request).await?;
            decode(&response)
        })
        .await
    }

    async fn post<Q, R>(&self, ctx: &CallContext, path: &str, request: &Q) -> Result<PangeaResponse<R>>
    where
        Q: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send,
    {
        self.scoped("post", path, async {
            let response = self.send_json(ctx, path, request).await?;
            self.resolve_accepted(ctx, decode(&response)).await
        })
        .await
    }

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
        S: UploadSource,
    {
        self.scoped("post_with_file", path, async {
            Uploader::new(&self.transport, &self.service)
                .post_with_file(ctx, path, request, file)
                .await
        })
        .await
    }

    async fn request_upload_url<Q>(
        &self,
        ctx: &CallContext,
        path: &str,
        request: &Q,
    ) -> Result<PangeaResponse<AcceptedResult>>
    where
        Q: Serialize + Transferable + Sync,
    {
        self.scoped("request_upload_url", path, async {
            Uploader::new(&self.transport, &self.service)
                .request_upload_url(ctx, path, request)
                .await
        })
        .await
    }

    async fn poll_result_by_id<R>(
        &self,
        ctx: &CallContext,
        request_id: &str,
    ) -> Result<PangeaResponse<R>>
    where
        R: DeserializeOwned + Send,
    {
        self.scoped("poll_result_by_id", request_id, async {
            Poller::new(&self.transport, &self.service)
                .poll_once(ctx, &PollTarget::new(request_id))
                .await
        })
        .await
    }
}
