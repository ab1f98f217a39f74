//! Unified error types for scrapegate.
//!
//! Every failure the fetch pipeline, the parser seam, or the cache can surface
//! is one variant of [`Error`]. Variants carry only the fields their kind needs;
//! callers branch on the variant instead of probing for optional fields.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Unified error types for the scrapegate pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty URL list, malformed selector).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// URL could not be parsed or uses an unsupported scheme.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Upstream answered with a bad status and the retry budget is spent
    /// (or the status was never retryable).
    #[error("FETCH_FAILED: status {status} from {url} (site {site}, attempt {attempt})")]
    FetchFailed { attempt: u32, status: u16, url: String, site: String },

    /// Every attempt timed out.
    #[error("FETCH_TIMEOUT: {url} (site {site}, attempt {attempt})")]
    Timeout { attempt: u32, url: String, site: String },

    /// Connection-level failure on the final attempt.
    #[error("NETWORK_ERROR: {message} ({url}, site {site}, attempt {attempt})")]
    Network { attempt: u32, url: String, site: String, message: String },

    /// Transport error that retrying cannot fix (redirect loop, invalid
    /// redirect target, request build failure).
    #[error("FETCH_FATAL: {message} ({url})")]
    Fatal { url: String, message: String },

    /// The caller cancelled the request.
    #[error("ABORTED: {url}")]
    Aborted { url: String },

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Expected page structure was not found by the parser.
    #[error("SELECTOR_MISSING: {selector} not found on {site} (selectors {version})")]
    Selector { selector: String, version: String, site: String },

    /// Configuration could not be loaded or validated.
    #[error("CONFIG_ERROR: {0}")]
    Config(String),
}

impl Error {
    /// Stable machine-readable code, the prefix of the display string.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::FetchFailed { .. } => "FETCH_FAILED",
            Error::Timeout { .. } => "FETCH_TIMEOUT",
            Error::Network { .. } => "NETWORK_ERROR",
            Error::Fatal { .. } => "FETCH_FATAL",
            Error::Aborted { .. } => "ABORTED",
            Error::FetchTooLarge(_) => "FETCH_TOO_LARGE",
            Error::Selector { .. } => "SELECTOR_MISSING",
            Error::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Upstream HTTP status, when the failure came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::FetchFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// URL the failure relates to, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            Error::FetchFailed { url, .. }
            | Error::Timeout { url, .. }
            | Error::Network { url, .. }
            | Error::Fatal { url, .. }
            | Error::Aborted { url } => Some(url),
            _ => None,
        }
    }

    /// Site identifier the failure was recorded against, if any.
    pub fn site(&self) -> Option<&str> {
        match self {
            Error::FetchFailed { site, .. }
            | Error::Timeout { site, .. }
            | Error::Network { site, .. }
            | Error::Selector { site, .. } => Some(site),
            _ => None,
        }
    }

    /// Attempt number on which the fetch gave up.
    pub fn attempt(&self) -> Option<u32> {
        match self {
            Error::FetchFailed { attempt, .. } | Error::Timeout { attempt, .. } | Error::Network { attempt, .. } => {
                Some(*attempt)
            }
            _ => None,
        }
    }

    /// Transport status a route layer should answer with.
    ///
    /// Upstream 404s pass through as 404; every other upstream failure is a
    /// bad gateway, and exhausted timeouts are a gateway timeout.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidInput(_) | Error::InvalidUrl(_) => 400,
            Error::FetchFailed { status: 404, .. } => 404,
            Error::FetchFailed { .. } | Error::Network { .. } | Error::Fatal { .. } => 502,
            Error::Timeout { .. } => 504,
            Error::Aborted { .. } => 499,
            Error::FetchTooLarge(_) => 413,
            Error::Selector { .. } => 502,
            Error::Config(_) => 500,
        }
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::InvalidInput(_) => -32602,
            Error::InvalidUrl(_) => -32003,
            Error::FetchFailed { .. } => -32008,
            Error::Timeout { .. } => -32006,
            Error::Network { .. } => -32009,
            Error::Fatal { .. } => -32010,
            Error::Aborted { .. } => -32011,
            Error::FetchTooLarge(_) => -32007,
            Error::Selector { .. } => -32000,
            Error::Config(_) => -32603,
        };
        let data = serde_json::json!({ "code": err.code(), "http_status": err.http_status() });

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: Some(data) }
    }
}
