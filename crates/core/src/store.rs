//! Object store service
//!
//! Thin layer over [`ServiceDispatch`]: each method names its endpoint and
//! hands the typed request to one dispatch primitive.

use pangea_domain::types::store::{
    GetArchiveRequest, GetArchiveResult, GetRequest, GetResult, ListRequest, ListResult,
    PutRequest, PutResult,
};
use pangea_domain::{AcceptedResult, PangeaError, PangeaResponse, Result, TransferMethod};

use crate::context::CallContext;
use crate::ports::ServiceDispatch;
use crate::upload::{FileUpload, UploadSource};

/// Service name of the object store
pub const STORE_SERVICE: &str = "store";

const PUT_PATH: &str = "v1beta/put";
const GET_PATH: &str = "v1beta/get";
const GET_ARCHIVE_PATH: &str = "v1beta/get_archive";
const LIST_PATH: &str = "v1beta/list";

/// Object store client
pub struct StoreService<D> {
    dispatch: D,
}

impl<D: ServiceDispatch> StoreService<D> {
    pub fn new(dispatch: D) -> Self {
        Self { dispatch }
    }

    pub fn dispatch(&self) -> &D {
        &self.dispatch
    }

    /// Upload an object
    pub async fn put<S: UploadSource>(
        &self,
        ctx: &CallContext,
        request: PutRequest,
        file: FileUpload<S>,
    ) -> Result<PangeaResponse<PutResult>> {
        self.dispatch.post_with_file(ctx, PUT_PATH, request, file).await
    }

    /// Negotiate a presigned URL for a later upload
    pub async fn request_upload_url(
        &self,
        ctx: &CallContext,
        request: &PutRequest,
    ) -> Result<PangeaResponse<AcceptedResult>> {
        self.dispatch.request_upload_url(ctx, PUT_PATH, request).await
    }

    /// Fetch an object's metadata, and a download URL for `dest_url`
    pub async fn get(
        &self,
        ctx: &CallContext,
        request: &GetRequest,
    ) -> Result<PangeaResponse<GetResult>> {
        self.dispatch.post(ctx, GET_PATH, request).await
    }

    /// Bundle objects into an archive
    ///
    /// With `multipart` the archive arrives as an attached file on the
    /// response; with `dest_url` the result carries a download URL.
    pub async fn get_archive(
        &self,
        ctx: &CallContext,
        request: &GetArchiveRequest,
    ) -> Result<PangeaResponse<GetArchiveResult>> {
        if !matches!(request.transfer_method, TransferMethod::Multipart | TransferMethod::DestUrl) {
            return Err(PangeaError::InvalidArgument(format!(
                "get_archive supports multipart or dest_url, not {}",
                request.transfer_method
            )));
        }
        self.dispatch.post(ctx, GET_ARCHIVE_PATH, request).await
    }

    /// List objects matching a filter
    pub async fn list(
        &self,
        ctx: &CallContext,
        request: &ListRequest,
    ) -> Result<PangeaResponse<ListResult>> {
        self.dispatch.post(ctx, LIST_PATH, request).await
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pangea_domain::types::store::ArchiveFormat;
    use pangea_domain::{ResponseHeader, ResponseStatus, Transferable};
    use serde::de::DeserializeOwned;
    use serde::Serialize;
    use serde_json::{json, Value};

    use super::*;

    /// Records every dispatch and answers with a canned result.
    struct RecordingDispatch {
        calls: Mutex<Vec<(&'static str, String, Value)>>,
        answer: Value,
    }

    impl RecordingDispatch {
        fn new(answer: Value) -> Self {
            Self { calls: Mutex::new(Vec::new()), answer }
        }

        fn record(&self, primitive: &'static str, path: &str, request: Value) {
            self.calls.lock().unwrap().push((primitive, path.to_string(), request));
        }

        fn respond<R: DeserializeOwned>(&self) -> Result<PangeaResponse<R>> {
            Ok(PangeaResponse {
                header: ResponseHeader {
                    request_id: "prq_test".into(),
                    request_time: String::new(),
                    response_time: String::new(),
                    status: ResponseStatus::Success,
                    summary: String::new(),
                },
                http_status: 200,
                result: serde_json::from_value(self.answer.clone()).unwrap(),
                accepted_result: None,
                attached_files: Vec::new(),
            })
        }
    }

    #[async_trait]
    impl ServiceDispatch for RecordingDispatch {
        fn service_name(&self) -> &str {
            STORE_SERVICE
        }

        async fn post_no_queue<Q, R>(
            &self,
            _ctx: &CallContext,
            path: &str,
            request: &Q,
        ) -> Result<PangeaResponse<R>>
        where
            Q: Serialize + Sync + ?Sized,
            R: DeserializeOwned + Send,
        {
            self.record("post_no_queue", path, serde_json::to_value(request).unwrap());
            self.respond()
        }

        async fn post<Q, R>(
            &self,
            _ctx: &CallContext,
            path: &str,
            request: &Q,
        ) -> Result<PangeaResponse<R>>
        where
            Q: Serialize + Sync + ?Sized,
            R: DeserializeOwned + Send,
        {
            self.record("post", path, serde_json::to_value(request).unwrap());
            self.respond()
        }

        async fn post_with_file<Q, R, S>(
            &self,
            _ctx: &CallContext,
            path: &str,
            request: Q,
            _file: FileUpload<S>,
        ) -> Result<PangeaResponse<R>>
        where
            Q: Serialize + Transferable + Send + Sync,
            R: DeserializeOwned + Send,
            S: UploadSource,
        {
            self.record("post_with_file", path, serde_json::to_value(&request).unwrap());
            self.respond()
        }

        async fn request_upload_url<Q>(
            &self,
            _ctx: &CallContext,
            path: &str,
            request: &Q,
        ) -> Result<PangeaResponse<AcceptedResult>>
        where
            Q: Serialize + Transferable + Sync,
        {
            self.record("request_upload_url", path, serde_json::to_value(request).unwrap());
            self.respond()
        }

        async fn poll_result_by_id<R>(
            &self,
            _ctx: &CallContext,
            request_id: &str,
        ) -> Result<PangeaResponse<R>>
        where
            R: DeserializeOwned + Send,
        {
            self.record("poll_result_by_id", request_id, Value::Null);
            self.respond()
        }
    }

    #[tokio::test]
    async fn put_goes_through_file_upload() {
        let store = StoreService::new(RecordingDispatch::new(json!({ "object": { "id": "pos_1" } })));
        let file = FileUpload::new(Cursor::new(b"hello".to_vec()), "hello.txt");

        let response = store
            .put(&CallContext::new(), PutRequest::new(TransferMethod::Multipart), file)
            .await
            .unwrap();

        assert_eq!(response.result.object.id, "pos_1");
        let calls = store.dispatch().calls.lock().unwrap();
        assert_eq!(calls[0].0, "post_with_file");
        assert_eq!(calls[0].1, "v1beta/put");
        assert_eq!(calls[0].2, json!({ "transfer_method": "multipart" }));
    }

    #[tokio::test]
    async fn list_posts_filter_document() {
        let store = StoreService::new(RecordingDispatch::new(json!({ "count": 0, "objects": [] })));
        let mut request = ListRequest::default();
        request.filter.name().contains("report");

        store.list(&CallContext::new(), &request).await.unwrap();

        let calls = store.dispatch().calls.lock().unwrap();
        assert_eq!(calls[0].1, "v1beta/list");
        assert_eq!(calls[0].2, json!({ "filter": { "name": { "contains": "report" } } }));
    }

    #[tokio::test]
    async fn archive_rejects_upload_methods() {
        let store = StoreService::new(RecordingDispatch::new(json!({})));
        let request = GetArchiveRequest {
            ids: vec!["pos_1".into()],
            format: ArchiveFormat::Zip,
            transfer_method: TransferMethod::PutUrl,
            config_id: None,
        };

        let err = store.get_archive(&CallContext::new(), &request).await.unwrap_err();

        assert_eq!(err.kind(), pangea_domain::ErrorKind::InvalidArgument);
        assert!(store.dispatch().calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_url_negotiation_uses_put_path() {
        let store = StoreService::new(RecordingDispatch::new(json!({ "put_url": "https://b/o" })));
        let mut request = PutRequest::new(TransferMethod::PutUrl);
        request.transfer_request_mut().size = Some(3);

        let response = store.request_upload_url(&CallContext::new(), &request).await.unwrap();

        assert_eq!(response.result.put_url.as_deref(), Some("https://b/o"));
        assert_eq!(store.dispatch().calls.lock().unwrap()[0].0, "request_upload_url");
    }
}
