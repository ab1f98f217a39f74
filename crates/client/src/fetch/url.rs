//! URL canonicalization and host keys.
//!
//! Rate limits, cookies, and default health records are all scoped by the
//! host key: the lowercase hostname plus an explicit port, if any.

use url::Url;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("missing host: {0}")]
    MissingHost(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<UrlError> for scrapegate_core::Error {
    fn from(err: UrlError) -> Self {
        scrapegate_core::Error::InvalidUrl(err.to_string())
    }
}

/// Canonicalize a URL string before fetching.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    let host = parsed
        .host_str()
        .map(str::to_lowercase)
        .ok_or_else(|| UrlError::MissingHost(trimmed.to_string()))?;
    parsed
        .set_host(Some(&host))
        .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Host key (`hostname[:port]`) scoping per-host state.
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}

/// Default `Referer` for a request: the origin of its URL with a trailing slash.
pub fn origin_referer(url: &Url) -> String {
    format!("{}/", url.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_basic() {
        let url = canonicalize("https://example.com").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_canonicalize_default_scheme() {
        let url = canonicalize("example.com/list").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.path(), "/list");
    }

    #[test]
    fn test_canonicalize_lowercase_host_and_fragment() {
        let url = canonicalize("  https://EXAMPLE.COM/Path?a=1#top ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/Path?a=1");
    }

    #[test]
    fn test_canonicalize_rejects_bad_input() {
        assert!(matches!(canonicalize(""), Err(UrlError::Empty)));
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
        assert!(matches!(canonicalize("file:///etc/passwd"), Err(UrlError::UnsupportedScheme(_))));
        assert!(matches!(canonicalize("http://"), Err(UrlError::InvalidUrl(_))));
    }

    #[test]
    fn test_host_key() {
        let url = canonicalize("https://Example.com/a").unwrap();
        assert_eq!(host_key(&url).as_deref(), Some("example.com"));

        let url = canonicalize("http://127.0.0.1:8080/a").unwrap();
        assert_eq!(host_key(&url).as_deref(), Some("127.0.0.1:8080"));

        // default ports are dropped by the parser
        let url = canonicalize("https://example.com:443/a").unwrap();
        assert_eq!(host_key(&url).as_deref(), Some("example.com"));
    }

    #[test]
    fn test_origin_referer() {
        let url = canonicalize("https://example.com/anime/one-piece?ep=3").unwrap();
        assert_eq!(origin_referer(&url), "https://example.com/");

        let url = canonicalize("http://localhost:3000/x").unwrap();
        assert_eq!(origin_referer(&url), "http://localhost:3000/");
    }
}
