//! Pangea transport
//!
//! Resolves service URLs, attaches the platform headers and sends through
//! the retrying [`HttpClient`]. Service calls use a pooled client; presigned
//! uploads and downloads go through a second, non-pooled client that never
//! sees the bearer token.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::Lazy;
use pangea_core::CallContext;
use pangea_domain::constants::{CONTENT_TYPE_JSON, USER_AGENT_PREFIX};
use pangea_domain::{resolve_url, Config, PangeaError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, RequestBuilder};
use url::Url;

use super::client::{retry_config_for, HttpClient, RequestLabels, UPLOAD_RETRY_STATUSES};
use crate::errors::InfraError;

static BASE_USER_AGENT: Lazy<String> =
    Lazy::new(|| format!("{USER_AGENT_PREFIX}/{}", env!("CARGO_PKG_VERSION")));

/// Process-wide user agent, with the caller's suffix appended
pub fn user_agent(custom: Option<&str>) -> String {
    match custom.map(str::trim).filter(|suffix| !suffix.is_empty()) {
        Some(suffix) => format!("{} {suffix}", *BASE_USER_AGENT),
        None => BASE_USER_AGENT.clone(),
    }
}

/// A fully read HTTP response
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub url: Url,
}

impl RawResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as lossy text, for error messages
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends service and presigned requests for one client configuration
pub struct Transport {
    config: Arc<Config>,
    api: HttpClient,
    direct: HttpClient,
    headers: HeaderMap,
    direct_headers: HeaderMap,
}

impl Transport {
    /// Build the HTTP clients and validate the configured headers.
    ///
    /// # Errors
    ///
    /// [`PangeaError::InvalidConfig`] when an additional header name or
    /// value, the token or the user agent is not a valid header.
    pub fn new(config: Config) -> Result<Self> {
        let retry = retry_config_for(&config);
        let api = HttpClient::builder()
            .timeout(config.request_timeout())
            .retry(retry.clone())
            .build()?;
        let direct = HttpClient::builder()
            .timeout(config.request_timeout())
            .pooled(false)
            .retry(retry)
            .retry_statuses(UPLOAD_RETRY_STATUSES)
            .build()?;
        Self::assemble(config, api, direct)
    }

    /// Transport for a derived configuration, sharing this one's connections
    ///
    /// # Errors
    ///
    /// Same as [`Transport::new`].
    pub fn derive(&self, config: Config) -> Result<Self> {
        let retry = retry_config_for(&config);
        let timeout = config.request_timeout();
        let api = self.api.with_settings(retry.clone(), timeout);
        let direct = self.direct.with_settings(retry, timeout);
        Self::assemble(config, api, direct)
    }

    fn assemble(config: Config, api: HttpClient, direct: HttpClient) -> Result<Self> {
        let agent = header_value(&user_agent(config.custom_user_agent()), "user agent")?;

        let mut headers = HeaderMap::new();
        for (name, value) in config.additional_headers() {
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                PangeaError::InvalidConfig(format!("invalid header name {name:?}: {err}"))
            })?;
            headers.insert(header, header_value(value, name)?);
        }
        let bearer = header_value(&format!("Bearer {}", config.token()), "authorization")?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(USER_AGENT, agent.clone());

        let mut direct_headers = HeaderMap::new();
        direct_headers.insert(USER_AGENT, agent);

        Ok(Self { config: Arc::new(config), api, direct, headers, direct_headers })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Headers attached to every service call
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Absolute URL of `path` on `service`
    pub fn url(&self, service: &str, path: &str) -> Result<Url> {
        resolve_url(&self.config, service, path)
    }

    /// POST a JSON body to a service endpoint
    pub async fn post_json(
        &self,
        ctx: &CallContext,
        labels: RequestLabels<'_>,
        url: Url,
        body: Bytes,
    ) -> Result<RawResponse> {
        self.post_body(ctx, labels, url, body, CONTENT_TYPE_JSON).await
    }

    /// POST a body with its own content type (multipart) to a service endpoint
    pub async fn post_body(
        &self,
        ctx: &CallContext,
        labels: RequestLabels<'_>,
        url: Url,
        body: Bytes,
        content_type: &str,
    ) -> Result<RawResponse> {
        let builder = self
            .api
            .request(Method::POST, url)
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, header_value(content_type, "content type")?)
            .body(body);
        self.execute(&self.api, ctx, builder, labels).await
    }

    /// GET a service endpoint (result polling)
    pub async fn get(
        &self,
        ctx: &CallContext,
        labels: RequestLabels<'_>,
        url: Url,
    ) -> Result<RawResponse> {
        let builder = self.api.request(Method::GET, url).headers(self.headers.clone());
        self.execute(&self.api, ctx, builder, labels).await
    }

    /// Send to a presigned URL without platform credentials
    pub async fn send_direct(
        &self,
        ctx: &CallContext,
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Result<RawResponse> {
        let path = url.path().to_string();
        let mut builder =
            self.direct.request(method, url).headers(self.direct_headers.clone()).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        let labels = RequestLabels { service: "presigned", path: &path, request_id: None };
        self.execute(&self.direct, ctx, builder, labels).await
    }

    async fn execute(
        &self,
        client: &HttpClient,
        ctx: &CallContext,
        builder: RequestBuilder,
        labels: RequestLabels<'_>,
    ) -> Result<RawResponse> {
        bounded(ctx, async {
            let response = client.send(ctx, builder, labels).await?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let url = response.url().clone();
            let body = response.bytes().await.map_err(|err| PangeaError::from(InfraError::from(err)))?;
            Ok(RawResponse { status, headers, body, url })
        })
        .await
    }
}

/// Run `fut` under the context's cancellation token and deadline
///
/// # Errors
///
/// `Cancelled` when the token fires first, `Timeout` when the deadline
/// passes first.
pub async fn bounded<T, F>(ctx: &CallContext, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if ctx.is_cancelled() {
        return Err(PangeaError::Cancelled);
    }
    let Some(remaining) = ctx.remaining() else {
        return tokio::select! {
            biased;
            () = ctx.cancellation().cancelled() => Err(PangeaError::Cancelled),
            result = fut => result,
        };
    };
    if remaining.is_zero() {
        return Err(PangeaError::Timeout(remaining));
    }
    tokio::select! {
        biased;
        () = ctx.cancellation().cancelled() => Err(PangeaError::Cancelled),
        result = tokio::time::timeout(remaining, fut) => {
            result.unwrap_or(Err(PangeaError::Timeout(remaining)))
        }
    }
}

fn header_value(value: &str, what: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|err| PangeaError::InvalidConfig(format!("invalid header value for {what}: {err}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config() -> Config {
        Config::builder("pts_token").build().unwrap()
    }

    #[test]
    fn user_agent_appends_custom_suffix() {
        let base = user_agent(None);
        assert!(base.starts_with("pangea-rust/"));
        assert_eq!(user_agent(Some("my-app/1.0")), format!("{base} my-app/1.0"));
        assert_eq!(user_agent(Some("   ")), base);
    }

    #[test]
    fn core_headers_override_additional_ones() {
        let with_extras = config()
            .to_builder()
            .additional_header("Authorization", "Basic nope")
            .additional_header("X-Pangea-Trace", "abc")
            .build()
            .unwrap();

        let transport = Transport::new(with_extras).unwrap();

        assert_eq!(transport.headers()[AUTHORIZATION], "Bearer pts_token");
        assert_eq!(transport.headers()["x-pangea-trace"], "abc");
        assert!(transport.headers()[USER_AGENT].to_str().unwrap().starts_with("pangea-rust/"));
    }

    #[test]
    fn invalid_header_names_are_rejected_at_construction() {
        let bad_name = config().to_builder().additional_header("bad header", "x").build().unwrap();
        let err = Transport::new(bad_name).err().unwrap();
        assert!(matches!(err, PangeaError::InvalidConfig(_)));

        let bad_value =
            config().to_builder().additional_header("X-Ok", "line\nbreak").build().unwrap();
        assert!(Transport::new(bad_value).is_err());
    }

    #[test]
    fn derived_transport_takes_new_timeout() {
        let base = Transport::new(config()).unwrap();
        let derived_config =
            config().to_builder().request_timeout(Duration::from_millis(200)).build().unwrap();

        let derived = base.derive(derived_config).unwrap();

        assert_eq!(derived.api.timeout(), Duration::from_millis(200));
        assert_eq!(derived.direct.timeout(), Duration::from_millis(200));
        assert_eq!(base.api.timeout(), config().request_timeout());
    }

    #[tokio::test]
    async fn bounded_reports_timeout_and_cancellation() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(20));
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        };
        assert!(matches!(bounded(&ctx, slow).await, Err(PangeaError::Timeout(_))));

        let ctx = CallContext::new();
        ctx.cancel();
        assert!(matches!(bounded(&ctx, async { Ok(1) }).await, Err(PangeaError::Cancelled)));
    }
}
