//! Cache key generation.
//!
//! A key is the normalized request path plus the query string with its
//! parameters sorted, so `?b=2&a=1` and `?a=1&b=2` share one entry.

/// Compute the cache key for a request path and optional raw query string.
pub fn cache_key(path: &str, query: Option<&str>) -> String {
    let path = normalize_path(path);

    let mut pairs: Vec<&str> = query
        .unwrap_or("")
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .collect();

    if pairs.is_empty() {
        return path;
    }

    pairs.sort_unstable();
    format!("{}?{}", path, pairs.join("&"))
}

/// Compute the cache key from already-split query parameters.
///
/// Pairs are joined verbatim; callers are expected to pass values that do not
/// contain `&`.
pub fn cache_key_from_pairs<K, V>(path: &str, pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let query = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k.as_ref(), v.as_ref()))
        .collect::<Vec<_>>()
        .join("&");

    cache_key(path, Some(&query))
}

fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.trim().split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}
