//! Integration tests for service dispatch
//!
//! **Coverage:**
//! - Success envelopes decode into typed results with header fields intact
//! - Failure envelopes surface `result.errors` and the HTTP status
//! - Retryable statuses are retried; retry can be disabled
//! - Platform headers on every call; the configured logger sees events

#[path = "support.rs"]
mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pangea_core::{CallContext, ServiceDispatch};
use pangea_domain::{ErrorKind, PangeaError, ResponseStatus};
use pangea_infra::PangeaClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use support::{client_for, config_for, envelope, success, CountingLayer, TOKEN};
use tracing_subscriber::layer::SubscriberExt;
use wiremock::matchers::{body_json, header, header_regex, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

#[derive(Debug, Serialize)]
struct EchoRequest {
    message: String,
}

#[derive(Debug, Deserialize, PartialEq)]
struct EchoResult {
    echoed: String,
    length: usize,
}

fn echo_request() -> EchoRequest {
    EchoRequest { message: "hello".to_string() }
}

#[tokio::test]
async fn test_success_decodes_typed_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/echo"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .and(header("content-type", "application/json"))
        .and(header_regex("user-agent", "^pangea-rust/"))
        .and(body_json(json!({ "message": "hello" })))
        .respond_with(success("prq_echo", json!({ "echoed": "hello", "length": 5 })))
        .expect(1)
        .mount(&server)
        .await;

    let echo = client_for(&server).service("echo");
    let response = echo
        .post::<_, EchoResult>(&CallContext::new(), "v1/echo", &echo_request())
        .await
        .expect("echo should succeed");

    assert_eq!(response.request_id(), "prq_echo");
    assert_eq!(response.header.summary, "Success summary");
    assert_eq!(response.header.request_time, "2024-05-01T10:00:00.000000Z");
    assert_eq!(response.http_status, 200);
    assert_eq!(response.result, EchoResult { echoed: "hello".to_string(), length: 5 });
}

#[tokio::test]
async fn test_failure_surfaces_error_fields() {
    let server = MockServer::start().await;
    let errors = json!([
        { "code": "Missing", "detail": "message is required", "source": "/message" },
        { "code": "TooLong", "detail": "message is too long", "source": "/message", "path": "/message" },
    ]);
    Mock::given(method("POST"))
        .and(path("/v1/echo"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(envelope("prq_bad", "ValidationError", json!({ "errors": errors }))),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .service("echo")
        .post::<_, EchoResult>(&CallContext::new(), "v1/echo", &echo_request())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ApiError);
    assert_eq!(err.request_id(), Some("prq_bad"));
    let api = err.api_error().unwrap();
    assert_eq!(api.status, ResponseStatus::ValidationError);
    assert_eq!(api.http_status, 400);
    let received: Vec<_> = api.errors.iter().map(|field| (field.code.as_str(), field.detail.as_str())).collect();
    assert_eq!(received, [("Missing", "message is required"), ("TooLong", "message is too long")]);
    assert_eq!(api.errors[1].path.as_deref(), Some("/message"));
}

#[tokio::test]
async fn test_unauthorized_is_its_own_kind() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(envelope("prq_auth", "Unauthorized", json!({}))),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .service("echo")
        .post_no_queue::<_, EchoResult>(&CallContext::new(), "v1/echo", &echo_request())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_retryable_status_is_retried() {
    let server = MockServer::start().await;
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);

    Mock::given(method("POST"))
        .and(path("/v1/echo"))
        .respond_with(move |_: &Request| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                ResponseTemplate::new(503)
            } else {
                success("prq_retry", json!({ "echoed": "hello", "length": 5 }))
            }
        })
        .mount(&server)
        .await;

    let response = client_for(&server)
        .service("echo")
        .post::<_, EchoResult>(&CallContext::new(), "v1/echo", &echo_request())
        .await
        .expect("third attempt succeeds");

    assert_eq!(response.request_id(), "prq_retry");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_disabled_returns_first_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(envelope("prq_down", "ServiceNotAvailable", Value::Null)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client =
        PangeaClient::new(config_for(&server).retry_enabled(false).build().unwrap()).unwrap();
    let err = client
        .service("echo")
        .post::<_, EchoResult>(&CallContext::new(), "v1/echo", &echo_request())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ApiError);
    assert!(err.is_retryable());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_non_envelope_body_keeps_raw_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such route"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .service("echo")
        .post::<_, EchoResult>(&CallContext::new(), "v1/missing", &echo_request())
        .await
        .unwrap_err();

    match err {
        PangeaError::Unmarshal { body, .. } => assert_eq!(body, b"no such route".to_vec()),
        other => panic!("expected Unmarshal, got {other:?}"),
    }
}

#[tokio::test]
async fn test_additional_headers_and_user_agent_suffix() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-pangea-tenant", "acme"))
        .and(header_regex("user-agent", "^pangea-rust/[^ ]+ my-app/1.2$"))
        .respond_with(success("prq_hdr", json!({ "echoed": "", "length": 0 })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server)
        .additional_header("X-Pangea-Tenant", "acme")
        .custom_user_agent("my-app/1.2")
        .build()
        .unwrap();
    let response = PangeaClient::new(config)
        .unwrap()
        .service("echo")
        .post::<_, EchoResult>(&CallContext::new(), "v1/echo", &echo_request())
        .await
        .expect("headers should match");

    assert_eq!(response.result.length, 0);
}

#[tokio::test]
async fn test_header_only_call_rejects_unexpected_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/empty"))
        .respond_with(success("prq_empty", Value::Null))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/full"))
        .respond_with(success("prq_full", json!({ "unexpected": true })))
        .mount(&server)
        .await;

    let echo = client_for(&server).service("echo");
    let ctx = CallContext::new();

    let response = echo.post_without_result(&ctx, "v1/empty", &echo_request()).await.unwrap();
    assert_eq!(response.request_id(), "prq_empty");

    let err = echo.post_without_result(&ctx, "v1/full", &echo_request()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnmarshalError);
    assert_eq!(err.request_id(), Some("prq_full"));
}

#[tokio::test]
async fn test_configured_logger_receives_call_events() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(success("prq_log", json!({ "echoed": "hello", "length": 5 })))
        .mount(&server)
        .await;

    let layer = CountingLayer::default();
    let dispatch = tracing::Dispatch::new(tracing_subscriber::registry().with(layer.clone()));
    let config = config_for(&server).logger(dispatch).build().unwrap();

    PangeaClient::new(config)
        .unwrap()
        .service("echo")
        .post::<_, EchoResult>(&CallContext::new(), "v1/echo", &echo_request())
        .await
        .expect("call succeeds");

    assert!(layer.count() >= 2, "attempt and decode events expected, saw {}", layer.count());
}

#[tokio::test]
async fn test_cancelled_context_short_circuits() {
    let server = MockServer::start().await;
    let ctx = CallContext::new();
    ctx.cancel();

    let err = client_for(&server)
        .service("echo")
        .post::<_, EchoResult>(&ctx, "v1/echo", &echo_request())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_derived_client_applies_its_request_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/echo"))
        .respond_with(
            success("prq_slow", json!({ "echoed": "hello", "length": 5 }))
                .set_delay(std::time::Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let base = client_for(&server);
    let derived_config = base
        .config()
        .to_builder()
        .request_timeout(std::time::Duration::from_millis(200))
        .retry_enabled(false)
        .build()
        .expect("valid config");
    let derived = base.with_config(derived_config).expect("derived client");

    let started = std::time::Instant::now();
    let err = derived
        .service("echo")
        .post::<_, EchoResult>(&CallContext::new(), "v1/echo", &echo_request())
        .await
        .expect_err("slow response must time out");

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() < std::time::Duration::from_secs(1));
}
