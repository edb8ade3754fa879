//! Client configuration
//!
//! A [`Config`] is built once through [`ConfigBuilder`] and never mutated.
//! Deriving a variant goes through [`Config::to_builder`], which copies the
//! settings so the original stays untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BASE_URL_TEMPLATE, DEFAULT_DOMAIN, DEFAULT_MAX_BACKOFF_MS, DEFAULT_MIN_BACKOFF_MS,
    DEFAULT_POLL_RESULT_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RETRY_MAX,
    TEMPLATE_PLACEHOLDERS,
};
use crate::errors::PangeaError;

/// Retry settings for the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// Retries after the first attempt
    pub retry_max: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            retry_max: DEFAULT_RETRY_MAX,
            min_backoff: Duration::from_millis(DEFAULT_MIN_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

/// Immutable client settings
#[derive(Clone)]
pub struct Config {
    token: String,
    domain: String,
    base_url_template: String,
    additional_headers: BTreeMap<String, String>,
    request_timeout: Duration,
    poll_result_timeout: Duration,
    queued_retry_enabled: bool,
    retry_enabled: bool,
    retry: RetrySettings,
    logger: Option<tracing::Dispatch>,
    insecure: bool,
    custom_user_agent: Option<String>,
}

impl Config {
    pub fn builder(token: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(token)
    }

    /// Copy these settings into a builder for deriving a new config
    pub fn to_builder(&self) -> ConfigBuilder {
        ConfigBuilder { config: self.clone() }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn base_url_template(&self) -> &str {
        &self.base_url_template
    }

    pub fn additional_headers(&self) -> &BTreeMap<String, String> {
        &self.additional_headers
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn poll_result_timeout(&self) -> Duration {
        self.poll_result_timeout
    }

    pub fn queued_retry_enabled(&self) -> bool {
        self.queued_retry_enabled
    }

    pub fn retry_enabled(&self) -> bool {
        self.retry_enabled
    }

    pub fn retry(&self) -> RetrySettings {
        self.retry
    }

    pub fn logger(&self) -> Option<&tracing::Dispatch> {
        self.logger.as_ref()
    }

    pub fn insecure(&self) -> bool {
        self.insecure
    }

    pub fn scheme(&self) -> &'static str {
        if self.insecure {
            "http"
        } else {
            "https"
        }
    }

    pub fn custom_user_agent(&self) -> Option<&str> {
        self.custom_user_agent.as_deref()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("token", &"<redacted>")
            .field("domain", &self.domain)
            .field("base_url_template", &self.base_url_template)
            .field("additional_headers", &self.additional_headers.keys().collect::<Vec<_>>())
            .field("request_timeout", &self.request_timeout)
            .field("poll_result_timeout", &self.poll_result_timeout)
            .field("queued_retry_enabled", &self.queued_retry_enabled)
            .field("retry_enabled", &self.retry_enabled)
            .field("retry", &self.retry)
            .field("logger", &self.logger.is_some())
            .field("insecure", &self.insecure)
            .field("custom_user_agent", &self.custom_user_agent)
            .finish()
    }
}

/// Fluent builder for [`Config`], validated at [`ConfigBuilder::build`]
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            config: Config {
                token: token.into(),
                domain: DEFAULT_DOMAIN.to_string(),
                base_url_template: DEFAULT_BASE_URL_TEMPLATE.to_string(),
                additional_headers: BTreeMap::new(),
                request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
                poll_result_timeout: Duration::from_secs(DEFAULT_POLL_RESULT_TIMEOUT_SECS),
                queued_retry_enabled: true,
                retry_enabled: true,
                retry: RetrySettings::default(),
                logger: None,
                insecure: false,
                custom_user_agent: None,
            },
        }
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = token.into();
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.config.domain = domain.into();
        self
    }

    pub fn base_url_template(mut self, template: impl Into<String>) -> Self {
        self.config.base_url_template = template.into();
        self
    }

    pub fn additional_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.additional_headers.insert(name.into(), value.into());
        self
    }

    pub fn additional_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.config
            .additional_headers
            .extend(headers.into_iter().map(|(name, value)| (name.into(), value.into())));
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn poll_result_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll_result_timeout = timeout;
        self
    }

    pub fn queued_retry_enabled(mut self, enabled: bool) -> Self {
        self.config.queued_retry_enabled = enabled;
        self
    }

    pub fn retry_enabled(mut self, enabled: bool) -> Self {
        self.config.retry_enabled = enabled;
        self
    }

    pub fn retry_max(mut self, retry_max: u32) -> Self {
        self.config.retry.retry_max = retry_max;
        self
    }

    pub fn backoff(mut self, min: Duration, max: Duration) -> Self {
        self.config.retry.min_backoff = min;
        self.config.retry.max_backoff = max;
        self
    }

    pub fn logger(mut self, dispatch: tracing::Dispatch) -> Self {
        self.config.logger = Some(dispatch);
        self
    }

    pub fn insecure(mut self, insecure: bool) -> Self {
        self.config.insecure = insecure;
        self
    }

    pub fn custom_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.custom_user_agent = Some(user_agent.into());
        self
    }

    /// Validate and freeze the settings
    ///
    /// # Errors
    ///
    /// Returns [`PangeaError::InvalidConfig`] for an empty token, an
    /// unknown template placeholder, inverted backoff bounds or a zero
    /// timeout.
    pub fn build(self) -> Result<Config, PangeaError> {
        let config = self.config;

        if config.token.trim().is_empty() {
            return Err(PangeaError::InvalidConfig("token must not be empty".to_string()));
        }
        validate_template(&config.base_url_template)?;
        if config.retry.min_backoff > config.retry.max_backoff {
            return Err(PangeaError::InvalidConfig(format!(
                "min backoff {:?} exceeds max backoff {:?}",
                config.retry.min_backoff, config.retry.max_backoff
            )));
        }
        if config.request_timeout.is_zero() {
            return Err(PangeaError::InvalidConfig("request timeout must be positive".to_string()));
        }
        if config.poll_result_timeout.is_zero() {
            return Err(PangeaError::InvalidConfig(
                "poll result timeout must be positive".to_string(),
            ));
        }

        Ok(config)
    }
}

/// Placeholders named in `template`, in order of appearance
pub(crate) fn placeholders(template: &str) -> Result<Vec<&str>, PangeaError> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            PangeaError::InvalidConfig(format!("unterminated placeholder in template {template:?}"))
        })?;
        names.push(&after[..close]);
        rest = &after[close + 1..];
    }
    Ok(names)
}

fn validate_template(template: &str) -> Result<(), PangeaError> {
    if template.is_empty() {
        return Err(PangeaError::InvalidConfig("base URL template must not be empty".to_string()));
    }
    for name in placeholders(template)? {
        if !TEMPLATE_PLACEHOLDERS.contains(&name) {
            return Err(PangeaError::InvalidConfig(format!(
                "unknown placeholder {{{name}}} in base URL template"
            )));
        }
    }
    Ok(())
}
