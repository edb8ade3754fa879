//! Platform constants
//!
//! Defaults and wire-level names shared by the domain and infra crates.

// Endpoint resolution
pub const DEFAULT_DOMAIN: &str = "aws.us.pangea.cloud";
pub const DEFAULT_BASE_URL_TEMPLATE: &str = "{SCHEME}://{SERVICE_NAME}.{DOMAIN}/";
pub const TEMPLATE_PLACEHOLDERS: [&str; 3] = ["SCHEME", "SERVICE_NAME", "DOMAIN"];

// Timeouts
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_POLL_RESULT_TIMEOUT_SECS: u64 = 30;
pub const CONNECT_TIMEOUT_SECS: u64 = 10;
pub const POOL_IDLE_TIMEOUT_SECS: u64 = 90;
pub const TCP_KEEPALIVE_SECS: u64 = 30;

// Retry
pub const DEFAULT_RETRY_MAX: u32 = 3;
pub const DEFAULT_MIN_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;
pub const RETRYABLE_HTTP_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

// Async completion
pub const RESULT_ENDPOINT_PREFIX: &str = "request/";
pub const POLL_INITIAL_DELAY_MS: u64 = 1_000;
pub const POLL_MAX_DELAY_MS: u64 = 30_000;
pub const POLL_JITTER_FRACTION: f64 = 0.25;
pub const HTTP_ACCEPTED: u16 = 202;

// Headers
pub const USER_AGENT_PREFIX: &str = "pangea-rust";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

// Multipart
pub const MULTIPART_REQUEST_PART: &str = "request";
pub const MULTIPART_RESULT_PART: &str = "result";
pub const POST_URL_FILE_FIELD: &str = "file";

// Attached files
pub const DOWNLOAD_FILENAME_PREFIX: &str = "download_";
pub const DOWNLOAD_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
