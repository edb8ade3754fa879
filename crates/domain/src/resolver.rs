//! Service URL resolution
//!
//! Turns `(service, path)` into an absolute URL by filling the config's
//! base-URL template.

use url::Url;

use crate::config::{placeholders, Config};
use crate::errors::PangeaError;

/// Resolve the absolute URL of `path` on `service`
///
/// Paths that already carry a scheme (presigned URLs, `location` handles)
/// are returned as-is.
///
/// # Errors
///
/// [`PangeaError::InvalidConfig`] for an empty token, a placeholder left
/// unresolved or a result that is not a valid URL.
pub fn resolve_url(config: &Config, service: &str, path: &str) -> Result<Url, PangeaError> {
    if config.token().trim().is_empty() {
        return Err(PangeaError::InvalidConfig("token must not be empty".to_string()));
    }

    if has_scheme(path) {
        return Url::parse(path)
            .map_err(|err| PangeaError::InvalidArgument(format!("invalid URL {path:?}: {err}")));
    }

    let base = config
        .base_url_template()
        .replace("{SCHEME}", config.scheme())
        .replace("{SERVICE_NAME}", service)
        .replace("{DOMAIN}", config.domain());
    if let Some(left) = placeholders(&base)?.first() {
        return Err(PangeaError::InvalidConfig(format!("unresolved placeholder {{{left}}}")));
    }

    let mut joined = base;
    if !joined.ends_with('/') {
        joined.push('/');
    }
    joined.push_str(path.trim_start_matches('/'));

    Url::parse(&joined)
        .map_err(|err| PangeaError::InvalidConfig(format!("invalid service URL {joined:?}: {err}")))
}

fn has_scheme(path: &str) -> bool {
    let lower = path.get(..8).unwrap_or(path).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
