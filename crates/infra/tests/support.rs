//! Shared helpers for the infra integration suites

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use pangea_domain::{Config, ConfigBuilder};
use pangea_infra::PangeaClient;
use serde_json::{json, Value};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use wiremock::{MockServer, ResponseTemplate};

pub const TOKEN: &str = "pts_integration_token";

/// Route global tracing to the test writer once per binary
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Builder pointed at the mock server with fast retries
pub fn config_for(server: &MockServer) -> ConfigBuilder {
    Config::builder(TOKEN)
        .base_url_template(format!("{}/", server.uri()))
        .backoff(Duration::from_millis(1), Duration::from_millis(5))
}

pub fn client_for(server: &MockServer) -> PangeaClient {
    init_tracing();
    PangeaClient::new(config_for(server).build().expect("valid config")).expect("client")
}

pub fn header(request_id: &str, status: &str) -> Value {
    json!({
        "request_id": request_id,
        "request_time": "2024-05-01T10:00:00.000000Z",
        "response_time": "2024-05-01T10:00:00.120000Z",
        "status": status,
        "summary": format!("{status} summary"),
    })
}

pub fn envelope(request_id: &str, status: &str, result: Value) -> Value {
    let mut body = header(request_id, status);
    body["result"] = result;
    body
}

pub fn success(request_id: &str, result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(envelope(request_id, "Success", result))
}

pub fn accepted(request_id: &str, accepted_result: Value) -> ResponseTemplate {
    let mut body = header(request_id, "Accepted");
    body["result"] = Value::Null;
    body["accepted_result"] = accepted_result;
    ResponseTemplate::new(202).set_body_json(body)
}

/// Counts every event it sees
#[derive(Clone, Default)]
pub struct CountingLayer {
    pub events: Arc<AtomicUsize>,
}

impl CountingLayer {
    pub fn count(&self) -> usize {
        self.events.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for CountingLayer {
    fn on_event(&self, _event: &Event<'_>, _ctx: Context<'_, S>) {
        self.events.fetch_add(1, Ordering::SeqCst);
    }
}

/// Body of a captured request as lossy text
pub fn body_text(request: &wiremock::Request) -> String {
    String::from_utf8_lossy(&request.body).into_owned()
}
