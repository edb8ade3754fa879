//! Integration tests for the upload orchestrator
//!
//! **Coverage:**
//! - `multipart`: request and file parts in one POST
//! - `put_url`: negotiate, raw PUT, poll
//! - `post_url`: digest filled before phase 1, form fields kept in order
//! - Presigned 4xx is an upload failure and never retried
//! - The file source is dropped on success and failure paths

#[path = "support.rs"]
mod support;

use std::io::{Cursor, SeekFrom};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use pangea_core::{CallContext, FileUpload, ServiceDispatch};
use pangea_domain::types::store::PutRequest;
use pangea_domain::{ErrorKind, PangeaError, TransferMethod};
use pangea_infra::PangeaClient;
use serde_json::{json, Value};
use support::{accepted, body_text, client_for, config_for, success};
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONTENT: &[u8] = b"123456789";

fn stored_object(id: &str) -> Value {
    json!({ "object": { "id": id, "name": "notes.txt", "type": "file", "size": 9 } })
}

/// Cursor that flags its own drop
struct TrackedSource {
    inner: Cursor<Vec<u8>>,
    dropped: Arc<AtomicBool>,
}

impl TrackedSource {
    fn new(content: &[u8]) -> (Self, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        (Self { inner: Cursor::new(content.to_vec()), dropped: Arc::clone(&dropped) }, dropped)
    }
}

impl Drop for TrackedSource {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

impl AsyncRead for TrackedSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncSeek for TrackedSource {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> std::io::Result<()> {
        Pin::new(&mut self.inner).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<u64>> {
        Pin::new(&mut self.inner).poll_complete(cx)
    }
}

#[tokio::test]
async fn test_multipart_upload_posts_request_and_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/put"))
        .respond_with(success("prq_mp", stored_object("pos_mp")))
        .expect(1)
        .mount(&server)
        .await;

    let content = vec![b'x'; 10 * 1024];
    let file = FileUpload::new(Cursor::new(content.clone()), "big.bin");
    let response = client_for(&server)
        .store()
        .put(&CallContext::new(), PutRequest::new(TransferMethod::Multipart).with_name("big.bin"), file)
        .await
        .expect("multipart upload");

    assert_eq!(response.result.object.id, "pos_mp");

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    let content_type = request.headers.get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data; boundary="));

    let body = body_text(request);
    let request_part = body.find("name=\"request\"").expect("request part");
    let file_part = body.find("name=\"upload\"; filename=\"big.bin\"").expect("file part");
    assert!(request_part < file_part);
    assert!(body.contains(r#"{"transfer_method":"multipart","name":"big.bin"}"#));
    assert!(body.contains("Content-Type: application/octet-stream"));
    assert!(request.body.windows(content.len()).any(|window| window == content.as_slice()));
}

#[tokio::test]
async fn test_put_url_uploads_then_polls() {
    let server = MockServer::start().await;
    let put_url = format!("{}/bucket/object-1?sig=abc", server.uri());
    Mock::given(method("POST"))
        .and(path("/v1beta/put"))
        .respond_with(accepted(
            "prq_put",
            json!({ "put_url": put_url, "upload_headers": { "x-amz-meta-owner": "tests" } }),
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/bucket/object-1"))
        .and(header("content-type", "application/octet-stream"))
        .and(header("x-amz-meta-owner", "tests"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/request/prq_put"))
        .respond_with(success("prq_put", stored_object("pos_put")))
        .expect(1)
        .mount(&server)
        .await;

    let (source, dropped) = TrackedSource::new(CONTENT);
    let response = client_for(&server)
        .store()
        .put(&CallContext::new(), PutRequest::new(TransferMethod::PutUrl), FileUpload::new(source, "notes.txt"))
        .await
        .expect("put_url upload");

    assert_eq!(response.result.object.id, "pos_put");
    assert!(dropped.load(Ordering::SeqCst));

    let requests = server.received_requests().await.unwrap();
    let put = requests.iter().find(|request| request.method.as_str() == "PUT").unwrap();
    assert_eq!(put.body, CONTENT.to_vec());
    assert!(put.headers.get("authorization").is_none(), "token must not reach the bucket");
}

#[tokio::test]
async fn test_post_url_fills_digest_and_keeps_field_order() {
    let server = MockServer::start().await;
    let post_url = format!("{}/bucket/", server.uri());
    Mock::given(method("POST"))
        .and(path("/v1beta/put"))
        .respond_with(accepted(
            "prq_post",
            json!({
                "post_url": post_url,
                "post_form_data": {
                    "key": "uploads/notes.txt",
                    "policy": "eyJwb2xpY3kiOnt9fQ==",
                    "x-amz-signature": "deadbeef",
                },
            }),
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bucket/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server).queued_retry_enabled(false).build().unwrap();
    let err = PangeaClient::new(config)
        .unwrap()
        .store()
        .put(
            &CallContext::new(),
            PutRequest::new(TransferMethod::PostUrl),
            FileUpload::new(Cursor::new(CONTENT.to_vec()), "notes.txt"),
        )
        .await
        .unwrap_err();

    // Phase 3 skipped: the caller gets the handle back
    assert_eq!(err.kind(), ErrorKind::Accepted);
    assert_eq!(err.request_id(), Some("prq_post"));

    let requests = server.received_requests().await.unwrap();
    let phase_one: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(
        phase_one,
        json!({
            "transfer_method": "post_url",
            "crc32c": "e3069283",
            "sha256": "15e2b0d3c33891ebb0f1ef609ec419420c20e320ce94c65fbc8c3312448eb225",
            "size": 9,
        })
    );

    let form = body_text(&requests[1]);
    let positions: Vec<usize> = ["name=\"key\"", "name=\"policy\"", "name=\"x-amz-signature\"", "name=\"file\""]
        .iter()
        .map(|needle| form.find(needle).unwrap_or_else(|| panic!("{needle} missing")))
        .collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]), "fields out of order: {positions:?}");
    assert_eq!(form.matches("name=\"file\"").count(), 1);
    assert!(requests[1].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_presigned_rejection_is_upload_failure_without_retry() {
    let server = MockServer::start().await;
    let put_url = format!("{}/bucket/denied", server.uri());
    Mock::given(method("POST"))
        .and(path("/v1beta/put"))
        .respond_with(accepted("prq_denied", json!({ "put_url": put_url })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/bucket/denied"))
        .respond_with(ResponseTemplate::new(403).set_body_string("SignatureDoesNotMatch"))
        .expect(1)
        .mount(&server)
        .await;

    let (source, dropped) = TrackedSource::new(CONTENT);
    let err = client_for(&server)
        .store()
        .put(&CallContext::new(), PutRequest::new(TransferMethod::PutUrl), FileUpload::new(source, "notes.txt"))
        .await
        .unwrap_err();

    match &err {
        PangeaError::UploadFailed { status, message } => {
            assert_eq!(*status, Some(403));
            assert_eq!(message, "SignatureDoesNotMatch");
        }
        other => panic!("expected UploadFailed, got {other:?}"),
    }
    assert!(!err.is_retryable());
    assert!(dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_presigned_server_error_is_retried() {
    let server = MockServer::start().await;
    let put_url = format!("{}/bucket/flaky", server.uri());
    Mock::given(method("POST"))
        .and(path("/v1beta/put"))
        .respond_with(accepted("prq_flaky", json!({ "put_url": put_url })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/bucket/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/bucket/flaky"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let config = config_for(&server).queued_retry_enabled(false).build().unwrap();
    let err = PangeaClient::new(config)
        .unwrap()
        .store()
        .put(
            &CallContext::new(),
            PutRequest::new(TransferMethod::PutUrl),
            FileUpload::new(Cursor::new(CONTENT.to_vec()), "notes.txt"),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Accepted);
    let puts = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.method.as_str() == "PUT")
        .count();
    assert_eq!(puts, 2);
}

#[tokio::test]
async fn test_body_less_method_is_rejected_and_source_dropped() {
    let server = MockServer::start().await;
    let (source, dropped) = TrackedSource::new(CONTENT);

    let err = client_for(&server)
        .service("store")
        .post_with_file::<_, Value, _>(
            &CallContext::new(),
            "v1beta/put",
            PutRequest::new(TransferMethod::DestUrl),
            FileUpload::new(source, "notes.txt"),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(dropped.load(Ordering::SeqCst));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_request_upload_url_then_upload() {
    let server = MockServer::start().await;
    let put_url = format!("{}/bucket/later", server.uri());
    Mock::given(method("POST"))
        .and(path("/v1beta/put"))
        .respond_with(accepted("prq_later", json!({ "put_url": put_url, "ttl_mins": 10 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/bucket/later"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let store = client.store();
    let ctx = CallContext::new();

    let negotiated = store
        .request_upload_url(&ctx, &PutRequest::new(TransferMethod::PutUrl))
        .await
        .expect("presigned URL");
    assert_eq!(negotiated.request_id(), "prq_later");
    assert_eq!(negotiated.result.ttl_mins, Some(10));

    store
        .dispatch()
        .upload_to_presigned_url(&ctx, &negotiated.result, FileUpload::new(Cursor::new(CONTENT.to_vec()), "later.txt"))
        .await
        .expect("phase 2");
}

#[tokio::test]
async fn test_request_upload_url_post_url_requires_digest() {
    let server = MockServer::start().await;

    let err = client_for(&server)
        .store()
        .request_upload_url(&CallContext::new(), &PutRequest::new(TransferMethod::PostUrl))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_multipart_part_type_follows_request_mimetype() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/put"))
        .respond_with(success("prq_mime", stored_object("pos_mime")))
        .expect(1)
        .mount(&server)
        .await;

    let mut request = PutRequest::new(TransferMethod::Multipart).with_name("notes.txt");
    request.mimetype = Some("text/plain".to_string());
    client_for(&server)
        .store()
        .put(&CallContext::new(), request, FileUpload::new(Cursor::new(CONTENT.to_vec()), "notes.txt"))
        .await
        .expect("multipart upload");

    let requests = server.received_requests().await.unwrap();
    let body = body_text(&requests[0]);
    let file_part = body.find("filename=\"notes.txt\"").expect("file part");
    assert!(body[file_part..].contains("Content-Type: text/plain"));
    assert!(!body.contains("Content-Type: application/octet-stream"));
}

#[tokio::test]
async fn test_request_upload_url_rejects_non_presigned_methods() {
    let server = MockServer::start().await;
    let store = client_for(&server).store();

    for method in [TransferMethod::Multipart, TransferMethod::DestUrl, TransferMethod::SourceUrl] {
        let err = store
            .request_upload_url(&CallContext::new(), &PutRequest::new(method))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{method}");
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}
