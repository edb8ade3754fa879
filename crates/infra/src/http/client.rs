use std::sync::Arc;
use std::time::{Duration, Instant};

use pangea_common::resilience::{
    RetryConfig, RetryDecision, RetryError, RetryExecutor, RetryPolicy,
};
use pangea_core::CallContext;
use pangea_domain::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS, POOL_IDLE_TIMEOUT_SECS,
    RETRYABLE_HTTP_STATUSES, TCP_KEEPALIVE_SECS,
};
use pangea_domain::{Config, PangeaError};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response};
use tracing::debug;

use crate::errors::InfraError;

/// Statuses retried on service calls
pub const API_RETRY_STATUSES: &[u16] = &RETRYABLE_HTTP_STATUSES;

/// Statuses retried on presigned transfers; 4xx is never retried there
pub const UPLOAD_RETRY_STATUSES: &[u16] = &[500, 502, 503, 504];

/// Correlation fields attached to every per-attempt log event
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLabels<'a> {
    pub service: &'a str,
    pub path: &'a str,
    pub request_id: Option<&'a str>,
}

/// HTTP client with built-in retry, cancellation and per-attempt logging.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    timeout: Duration,
    retry: RetryConfig,
    retry_statuses: Arc<[u16]>,
}

/// Why a single attempt did not produce a usable response
#[derive(Debug)]
enum AttemptError {
    Status(Response),
    Transport(reqwest::Error),
    Unreplayable,
    Cancelled,
}

struct StatusRetryPolicy {
    statuses: Arc<[u16]>,
}

impl RetryPolicy<AttemptError> for StatusRetryPolicy {
    fn should_retry(&self, error: &AttemptError, _attempt: u32) -> RetryDecision {
        match error {
            AttemptError::Status(response) if self.statuses.contains(&response.status().as_u16()) => {
                RetryDecision::Retry
            }
            AttemptError::Transport(err) if should_retry_error(err) => RetryDecision::Retry,
            _ => RetryDecision::Stop,
        }
    }
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Same pool, different retry behaviour and request timeout.
    ///
    /// The timeout is applied per request, so it overrides the one the
    /// shared pool was built with.
    pub fn with_settings(&self, retry: RetryConfig, timeout: Duration) -> Self {
        Self {
            client: self.client.clone(),
            timeout,
            retry,
            retry_statuses: Arc::clone(&self.retry_statuses),
        }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute the provided request builder with retry semantics.
    ///
    /// Retryable statuses are retried until the attempt budget is spent;
    /// the last response is then returned as-is, so callers always see the
    /// server's final answer. Transport faults that survive the retries
    /// become errors.
    ///
    /// # Errors
    ///
    /// `Cancelled` when the context's token fires, `Transport`/`Timeout`
    /// for network faults, `InvalidArgument` for a body that cannot be
    /// replayed.
    pub async fn send(
        &self,
        ctx: &CallContext,
        builder: RequestBuilder,
        labels: RequestLabels<'_>,
    ) -> Result<Response, PangeaError> {
        let executor = RetryExecutor::new(
            self.retry.clone(),
            StatusRetryPolicy { statuses: Arc::clone(&self.retry_statuses) },
        );
        let cancel = ctx.cancellation();

        let result = executor
            .execute(cancel, |attempt| {
                let cloned = builder.try_clone();
                async move {
                    let cloned = cloned.ok_or(AttemptError::Unreplayable)?;
                    self.attempt(cloned, cancel, labels, attempt).await
                }
            })
            .await;

        match result {
            Ok(response) => Ok(response),
            Err(RetryError::InvalidConfiguration { message }) => {
                Err(PangeaError::InvalidConfig(message))
            }
            Err(err) => match err.into_last_error() {
                Some(AttemptError::Status(response)) => Ok(response),
                Some(AttemptError::Transport(err)) if err.is_timeout() => {
                    Err(PangeaError::Timeout(self.timeout))
                }
                Some(AttemptError::Transport(err)) => Err(InfraError::from(err).into()),
                Some(AttemptError::Unreplayable) => Err(PangeaError::InvalidArgument(
                    "request body cannot be cloned; buffer the body to enable retries".into(),
                )),
                Some(AttemptError::Cancelled) | None => Err(PangeaError::Cancelled),
            },
        }
    }

    async fn attempt(
        &self,
        builder: RequestBuilder,
        cancel: &tokio_util::sync::CancellationToken,
        labels: RequestLabels<'_>,
        attempt: u32,
    ) -> Result<Response, AttemptError> {
        let request = builder.timeout(self.timeout).build().map_err(AttemptError::Transport)?;
        let method = request.method().clone();
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(AttemptError::Cancelled),
            result = self.client.execute(request) => result.map_err(AttemptError::Transport),
        };

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &outcome {
            Ok(response) => debug!(
                service = labels.service,
                %method,
                path = labels.path,
                request_id = labels.request_id,
                attempt,
                elapsed_ms,
                status = response.status().as_u16(),
                "pangea request attempt"
            ),
            Err(AttemptError::Transport(err)) => debug!(
                service = labels.service,
                %method,
                path = labels.path,
                request_id = labels.request_id,
                attempt,
                elapsed_ms,
                error = %err,
                "pangea request attempt failed"
            ),
            Err(_) => {}
        }

        match outcome {
            Ok(response) if self.retry_statuses.contains(&response.status().as_u16()) => {
                Err(AttemptError::Status(response))
            }
            other => other,
        }
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    connect_timeout: Duration,
    pooled: bool,
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Duration,
    tcp_keepalive: Duration,
    user_agent: Option<String>,
    retry: RetryConfig,
    retry_statuses: Vec<u16>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            pooled: true,
            pool_max_idle_per_host: default_idle_per_host(),
            pool_idle_timeout: Duration::from_secs(POOL_IDLE_TIMEOUT_SECS),
            tcp_keepalive: Duration::from_secs(TCP_KEEPALIVE_SECS),
            user_agent: None,
            retry: RetryConfig::single_attempt(),
            retry_statuses: API_RETRY_STATUSES.to_vec(),
        }
    }
}

fn default_idle_per_host() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get) + 1
}

/// Retry configuration derived from the client settings
pub fn retry_config_for(config: &Config) -> RetryConfig {
    if !config.retry_enabled() {
        return RetryConfig::single_attempt();
    }
    let settings = config.retry();
    RetryConfig {
        max_attempts: settings.retry_max.saturating_add(1),
        backoff: pangea_common::resilience::BackoffStrategy::Exponential {
            initial_delay: settings.min_backoff,
            base: 2.0,
            max_delay: settings.max_backoff,
        },
        jitter: pangea_common::resilience::Jitter::Full,
        min_delay: settings.min_backoff,
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// A non-pooled client opens a fresh connection per request.
    pub fn pooled(mut self, pooled: bool) -> Self {
        self.pooled = pooled;
        self
    }

    pub fn pool_max_idle_per_host(mut self, max_idle: usize) -> Self {
        self.pool_max_idle_per_host = max_idle;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_statuses(mut self, statuses: &[u16]) -> Self {
        self.retry_statuses = statuses.to_vec();
        self
    }

    pub fn build(self) -> Result<HttpClient, PangeaError> {
        self.retry.validate().map_err(|err| PangeaError::InvalidConfig(err.to_string()))?;

        let idle_per_host = if self.pooled { self.pool_max_idle_per_host } else { 0 };
        let mut builder = ReqwestClient::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(idle_per_host)
            .pool_idle_timeout(self.pool_idle_timeout)
            .tcp_keepalive(self.tcp_keepalive)
            .no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        let client = builder.build().map_err(|err| PangeaError::from(InfraError::from(err)))?;

        Ok(HttpClient {
            client,
            timeout: self.timeout,
            retry: self.retry,
            retry_statuses: self.retry_statuses.into(),
        })
    }
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    if err.is_builder() {
        return false;
    }
    if err.is_timeout() || err.is_request() {
        return true;
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        if err.is_connect() {
            return true;
        }
    }
    false
}
