//! Per-host cookie jar.
//!
//! Cookies from `Set-Cookie` headers are kept per host key and replayed on
//! every later request to that host. Attributes (Path, Expires, Max-Age, ...)
//! are ignored and entries never expire; clearing the jar (or restarting the
//! process) is the only way to drop them.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use dashmap::DashMap;
use regex::Regex;
use reqwest::header::{HeaderMap, SET_COOKIE};

/// A comma that starts a new cookie: followed by `token=`.
///
/// Commas inside attribute values (`Expires=Wed, 21 Oct 2015 ...`) are not
/// followed by `token=` and are left alone.
static COOKIE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*[^;,=\s]+=").expect("invalid cookie boundary pattern"));

/// Cookie store keyed by host, then by cookie name.
#[derive(Debug, Default)]
pub struct CookieJar {
    store: DashMap<String, BTreeMap<String, String>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the `Cookie` header value for `host`.
    ///
    /// `override_cookies` is a raw `"k=v; k2=v2"` string applied on top of the
    /// stored cookies; its values win on name collisions. Returns `None` when
    /// there is nothing to send. Names are emitted in sorted order.
    pub fn build_cookie_header(&self, host: &str, override_cookies: Option<&str>) -> Option<String> {
        let mut merged = self.store.get(host).map(|c| c.clone()).unwrap_or_default();

        if let Some(raw) = override_cookies {
            merged.extend(parse_cookie_pairs(raw));
        }

        if merged.is_empty() {
            return None;
        }

        Some(
            merged
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Upsert every cookie set by a response's headers.
    pub fn store_cookies(&self, host: &str, headers: &HeaderMap) {
        let values = headers.get_all(SET_COOKIE).iter().filter_map(|v| v.to_str().ok());
        self.store_set_cookie_values(host, values);
    }

    /// Upsert cookies from raw `Set-Cookie` values.
    ///
    /// Each value may hold several comma-joined cookies. Malformed entries are
    /// skipped.
    pub fn store_set_cookie_values<'a>(&self, host: &str, values: impl IntoIterator<Item = &'a str>) {
        let pairs: Vec<(String, String)> = values
            .into_iter()
            .flat_map(split_set_cookie)
            .filter_map(parse_set_cookie)
            .collect();

        if pairs.is_empty() {
            return;
        }

        tracing::debug!(host, count = pairs.len(), "storing cookies");
        self.store.entry(host.to_string()).or_default().extend(pairs);
    }

    /// Copy of the cookies stored for `host`.
    pub fn cookies(&self, host: &str) -> BTreeMap<String, String> {
        self.store.get(host).map(|c| c.clone()).unwrap_or_default()
    }

    /// Hosts that currently hold cookies.
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.store.iter().map(|e| e.key().clone()).collect();
        hosts.sort();
        hosts
    }

    /// Drop one host's cookies, or all cookies when `host` is `None`.
    pub fn clear(&self, host: Option<&str>) {
        match host {
            Some(host) => {
                self.store.remove(host);
            }
            None => self.store.clear(),
        }
    }
}

/// Split a possibly comma-joined `Set-Cookie` value into single cookies.
pub fn split_set_cookie(header: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;

    for m in COOKIE_BOUNDARY.find_iter(header) {
        parts.push(&header[start..m.start()]);
        start = m.start() + 1;
    }
    parts.push(&header[start..]);

    parts.into_iter().map(str::trim).filter(|p| !p.is_empty()).collect()
}

/// Extract `name=value` from one `Set-Cookie` entry, dropping attributes.
fn parse_set_cookie(entry: &str) -> Option<(String, String)> {
    let pair = entry.split(';').next()?;
    parse_pair(pair)
}

/// Parse a `Cookie`-style `"k=v; k2=v2"` string, skipping malformed pairs.
pub fn parse_cookie_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(';').filter_map(parse_pair).collect()
}

fn parse_pair(pair: &str) -> Option<(String, String)> {
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_empty_jar_builds_nothing() {
        let jar = CookieJar::new();
        assert_eq!(jar.build_cookie_header("a.test", None), None);
        assert_eq!(jar.build_cookie_header("a.test", Some("")), None);
        assert_eq!(jar.build_cookie_header("a.test", Some(" ; =x; junk")), None);
    }

    #[test]
    fn test_override_wins_and_merges() {
        let jar = CookieJar::new();
        jar.store_set_cookie_values("a.test", ["cf_clearance=stored; Path=/", "session=abc"]);

        let header = jar.build_cookie_header("a.test", Some("cf_clearance=override; extra=1"));
        assert_eq!(header.as_deref(), Some("cf_clearance=override; extra=1; session=abc"));

        // the override does not leak into the store
        assert_eq!(jar.cookies("a.test").get("cf_clearance").map(String::as_str), Some("stored"));
    }

    #[test]
    fn test_header_is_deterministic() {
        let jar = CookieJar::new();
        jar.store_set_cookie_values("a.test", ["z=1", "a=2", "m=3"]);

        let first = jar.build_cookie_header("a.test", Some("b=4"));
        let second = jar.build_cookie_header("a.test", Some("b=4"));
        assert_eq!(first, second);
        assert_eq!(first.as_deref(), Some("a=2; b=4; m=3; z=1"));
    }

    #[test]
    fn test_split_respects_expires_commas() {
        let joined = "id=a3fWa; Expires=Wed, 21 Oct 2015 07:28:00 GMT; Secure, lang=en-US; Path=/, theme=dark";
        let parts = split_set_cookie(joined);
        assert_eq!(
            parts,
            vec!["id=a3fWa; Expires=Wed, 21 Oct 2015 07:28:00 GMT; Secure", "lang=en-US; Path=/", "theme=dark"]
        );
    }

    #[test]
    fn test_store_from_header_map() {
        let jar = CookieJar::new();
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("a=1; HttpOnly"));
        headers.append(SET_COOKIE, HeaderValue::from_static("b=2; Expires=Thu, 01 Jan 2099 00:00:00 GMT, c=3"));

        jar.store_cookies("a.test", &headers);

        let cookies = jar.cookies("a.test");
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies["a"], "1");
        assert_eq!(cookies["b"], "2");
        assert_eq!(cookies["c"], "3");
    }

    #[test]
    fn test_upsert_replaces_value() {
        let jar = CookieJar::new();
        jar.store_set_cookie_values("a.test", ["token=old"]);
        jar.store_set_cookie_values("a.test", ["token=new"]);
        assert_eq!(jar.build_cookie_header("a.test", None).as_deref(), Some("token=new"));
    }

    #[test]
    fn test_malformed_entries_ignored() {
        let jar = CookieJar::new();
        jar.store_set_cookie_values("a.test", ["novalue", "=orphan", "", "ok=1"]);
        assert_eq!(jar.build_cookie_header("a.test", None).as_deref(), Some("ok=1"));
    }

    #[test]
    fn test_hosts_are_isolated_and_clearable() {
        let jar = CookieJar::new();
        jar.store_set_cookie_values("a.test", ["x=1"]);
        jar.store_set_cookie_values("b.test:8080", ["y=2"]);

        assert_eq!(jar.build_cookie_header("b.test", None), None);
        assert_eq!(jar.hosts(), vec!["a.test".to_string(), "b.test:8080".to_string()]);

        jar.clear(Some("a.test"));
        assert_eq!(jar.hosts(), vec!["b.test:8080".to_string()]);

        jar.clear(None);
        assert!(jar.hosts().is_empty());
    }
}
