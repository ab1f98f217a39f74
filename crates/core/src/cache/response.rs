//! Read-through response cache.
//!
//! Wraps a downstream handler: fresh entries are served without calling it,
//! misses call it and keep the result only when the payload is explicitly
//! successful. Entries leave the cache on TTL expiry or LRU eviction,
//! whichever comes first.
//!
//! Concurrent misses for one key are not coalesced; each caller runs the
//! handler.

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use moka::Expiry;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use serde::{Deserialize, Serialize};

/// TTL applied when an endpoint does not choose one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Longest TTL any entry may be stored with (30 days).
pub const MAX_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// [`MAX_TTL`] expressed in minutes, for validating caller input.
pub const MAX_TTL_MINUTES: f64 = 30.0 * 24.0 * 60.0;

/// How a cached payload is rendered back to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Json,
    Text,
}

/// Per-endpoint cache settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheOptions {
    pub ttl: Duration,
    pub response_type: ResponseType,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL, response_type: ResponseType::Json }
    }
}

impl CacheOptions {
    pub fn new(ttl: Duration, response_type: ResponseType) -> Self {
        Self { ttl: ttl.min(MAX_TTL), response_type }
    }

    /// Build options from a TTL in minutes; `None` means one minute.
    ///
    /// Negative or non-finite values disable caching for the endpoint. Values
    /// above [`MAX_TTL`] are clamped to it.
    pub fn from_minutes(ttl_minutes: Option<f64>, response_type: ResponseType) -> Self {
        let ttl = match ttl_minutes {
            None => DEFAULT_TTL,
            Some(m) if m.is_finite() && m > 0.0 => {
                Duration::try_from_secs_f64(m * 60.0).map_or(MAX_TTL, |ttl| ttl.min(MAX_TTL))
            }
            Some(_) => Duration::ZERO,
        };
        Self { ttl, response_type }
    }
}

/// A handler result as seen by the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// JSON body; successful only when its top-level `ok` field is `true`.
    Json(serde_json::Value),
    /// Text body with an explicit success flag.
    Text { ok: bool, body: String },
}

impl Payload {
    pub fn text(body: impl Into<String>) -> Self {
        Payload::Text { ok: true, body: body.into() }
    }

    /// Whether the payload is explicitly successful and therefore cacheable.
    pub fn is_ok(&self) -> bool {
        match self {
            Payload::Json(value) => value.get("ok").and_then(serde_json::Value::as_bool) == Some(true),
            Payload::Text { ok, .. } => *ok,
        }
    }
}

/// Result of a cached invocation.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub payload: Payload,
    pub response_type: ResponseType,
    /// True when served from the cache without calling the handler.
    pub hit: bool,
    /// When the stored entry expires, if the payload was stored.
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Payload,
    response_type: ResponseType,
    ttl: Duration,
    expires_at: DateTime<Utc>,
}

struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, entry: &CacheEntry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self, _key: &String, entry: &CacheEntry, _updated_at: Instant, _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-memory read-through cache bounded by entry count and per-entry TTL.
#[derive(Clone)]
pub struct ResponseCache {
    entries: Cache<String, CacheEntry>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entry_count", &self.entries.entry_count())
            .finish()
    }
}

impl ResponseCache {
    /// Create a cache holding at most `max_entries` responses.
    pub fn new(max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(EntryExpiry)
            .build();

        Self { entries }
    }

    /// Serve `key` from the cache, or run `handler` and store a successful result.
    ///
    /// Handler errors are returned untouched and never cached.
    pub async fn get_or_fetch<F, Fut, E>(
        &self, key: &str, options: &CacheOptions, handler: F,
    ) -> Result<CachedResponse, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Payload, E>>,
    {
        if let Some(entry) = self.entries.get(key).await {
            tracing::debug!(key, "cache hit");
            return Ok(CachedResponse {
                payload: entry.payload,
                response_type: entry.response_type,
                hit: true,
                expires_at: Some(entry.expires_at),
            });
        }

        tracing::debug!(key, "cache miss");
        let payload = handler().await?;

        let mut expires_at = None;
        if payload.is_ok() && !options.ttl.is_zero() {
            let ttl = chrono::Duration::from_std(options.ttl).unwrap_or(chrono::Duration::MAX);
            let at = Utc::now().checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
            let entry = CacheEntry {
                payload: payload.clone(),
                response_type: options.response_type,
                ttl: options.ttl,
                expires_at: at,
            };
            self.entries.insert(key.to_string(), entry).await;
            expires_at = Some(at);
        } else {
            tracing::debug!(key, ok = payload.is_ok(), "response not cached");
        }

        Ok(CachedResponse { payload, response_type: options.response_type, hit: false, expires_at })
    }

    /// Drop a single entry.
    pub async fn invalidate(&self, key: &str) {
        self.entries.invalidate(key).await;
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Apply pending evictions so that `entry_count` is exact.
    pub async fn sync(&self) {
        self.entries.run_pending_tasks().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(
        calls: &Arc<AtomicUsize>, payload: Payload,
    ) -> impl FnOnce() -> std::future::Ready<Result<Payload, Error>> {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(payload))
        }
    }

    #[test]
    fn test_payload_is_ok() {
        assert!(Payload::Json(json!({"ok": true, "data": []})).is_ok());
        assert!(!Payload::Json(json!({"ok": false})).is_ok());
        assert!(!Payload::Json(json!({"ok": "true"})).is_ok());
        assert!(!Payload::Json(json!({"data": 1})).is_ok());
        assert!(Payload::text("<html>").is_ok());
        assert!(!Payload::Text { ok: false, body: String::new() }.is_ok());
    }

    #[test]
    fn test_options_from_minutes() {
        assert_eq!(CacheOptions::from_minutes(None, ResponseType::Json).ttl, Duration::from_secs(60));
        assert_eq!(CacheOptions::from_minutes(Some(10.0), ResponseType::Json).ttl, Duration::from_secs(600));
        assert_eq!(CacheOptions::from_minutes(Some(0.5), ResponseType::Text).ttl, Duration::from_secs(30));
        assert_eq!(CacheOptions::from_minutes(Some(-1.0), ResponseType::Json).ttl, Duration::ZERO);
        assert_eq!(CacheOptions::from_minutes(Some(f64::NAN), ResponseType::Json).ttl, Duration::ZERO);
    }

    #[test]
    fn test_options_clamp_huge_ttl() {
        assert_eq!(CacheOptions::from_minutes(Some(1e18), ResponseType::Json).ttl, MAX_TTL);
        assert_eq!(CacheOptions::from_minutes(Some(f64::MAX), ResponseType::Json).ttl, MAX_TTL);
        assert_eq!(CacheOptions::from_minutes(Some(MAX_TTL_MINUTES), ResponseType::Text).ttl, MAX_TTL);
        assert_eq!(CacheOptions::new(Duration::MAX, ResponseType::Json).ttl, MAX_TTL);
    }

    #[tokio::test]
    async fn test_huge_ttl_entry_is_stored() {
        let cache = ResponseCache::new(4);
        let calls = Arc::new(AtomicUsize::new(0));
        let options = CacheOptions::from_minutes(Some(1e18), ResponseType::Json);

        let first = cache
            .get_or_fetch("/long", &options, counting_handler(&calls, Payload::Json(json!({"ok": true}))))
            .await
            .unwrap();
        assert!(first.expires_at.is_some());

        let second = cache
            .get_or_fetch("/long", &options, counting_handler(&calls, Payload::Json(json!({"ok": true}))))
            .await
            .unwrap();
        assert!(second.hit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hit_short_circuits_handler() {
        let cache = ResponseCache::new(16);
        let calls = Arc::new(AtomicUsize::new(0));
        let options = CacheOptions::new(Duration::from_secs(60), ResponseType::Json);
        let payload = Payload::Json(json!({"ok": true, "items": [1, 2, 3]}));

        let first = cache
            .get_or_fetch("/recent", &options, counting_handler(&calls, payload.clone()))
            .await
            .unwrap();
        assert!(!first.hit);
        assert!(first.expires_at.is_some());

        let second = cache
            .get_or_fetch("/recent", &options, counting_handler(&calls, Payload::Json(json!({"ok": true}))))
            .await
            .unwrap();
        assert!(second.hit);
        assert_eq!(second.payload, payload);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_ok_is_never_cached() {
        let cache = ResponseCache::new(16);
        let calls = Arc::new(AtomicUsize::new(0));
        let options = CacheOptions::default();

        for _ in 0..3 {
            let res = cache
                .get_or_fetch("/broken", &options, counting_handler(&calls, Payload::Json(json!({"ok": false}))))
                .await
                .unwrap();
            assert!(!res.hit);
            assert!(res.expires_at.is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_errors_propagate_and_are_not_cached() {
        let cache = ResponseCache::new(16);
        let options = CacheOptions::default();

        let err = cache
            .get_or_fetch("/err", &options, || async {
                Err::<Payload, _>(Error::Timeout { attempt: 2, url: "u".into(), site: "s".into() })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { attempt: 2, .. }));

        let calls = Arc::new(AtomicUsize::new(0));
        let res = cache
            .get_or_fetch("/err", &options, counting_handler(&calls, Payload::Json(json!({"ok": true}))))
            .await
            .unwrap();
        assert!(!res.hit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_not_cached() {
        let cache = ResponseCache::new(16);
        let calls = Arc::new(AtomicUsize::new(0));
        let options = CacheOptions::new(Duration::ZERO, ResponseType::Text);

        for _ in 0..2 {
            cache
                .get_or_fetch("/page", &options, counting_handler(&calls, Payload::text("body")))
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let cache = ResponseCache::new(16);
        let calls = Arc::new(AtomicUsize::new(0));
        let options = CacheOptions::new(Duration::from_millis(50), ResponseType::Json);
        let payload = Payload::Json(json!({"ok": true}));

        cache
            .get_or_fetch("/ttl", &options, counting_handler(&calls, payload.clone()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let res = cache
            .get_or_fetch("/ttl", &options, counting_handler(&calls, payload))
            .await
            .unwrap();

        assert!(!res.hit);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_max_entries_bound() {
        let cache = ResponseCache::new(2);
        let options = CacheOptions::default();
        let calls = Arc::new(AtomicUsize::new(0));

        for i in 0..6 {
            let key = format!("/item/{i}");
            cache
                .get_or_fetch(&key, &options, counting_handler(&calls, Payload::Json(json!({"ok": true, "i": i}))))
                .await
                .unwrap();
        }
        cache.sync().await;

        assert!(cache.entry_count() <= 2);
    }

    #[tokio::test]
    async fn test_recently_read_entry_survives_eviction() {
        let cache = ResponseCache::new(2);
        let options = CacheOptions::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let ok = |name: &str| Payload::Json(json!({"ok": true, "name": name}));

        cache.get_or_fetch("/a", &options, counting_handler(&calls, ok("a"))).await.unwrap();
        cache.sync().await;
        cache.get_or_fetch("/b", &options, counting_handler(&calls, ok("b"))).await.unwrap();
        cache.sync().await;

        // touch A so that B becomes least recently used
        let a = cache.get_or_fetch("/a", &options, counting_handler(&calls, ok("a2"))).await.unwrap();
        assert!(a.hit);
        cache.sync().await;

        cache.get_or_fetch("/c", &options, counting_handler(&calls, ok("c"))).await.unwrap();
        cache.sync().await;
        assert_eq!(cache.entry_count(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let a = cache.get_or_fetch("/a", &options, counting_handler(&calls, ok("a3"))).await.unwrap();
        assert!(a.hit);
        assert_eq!(a.payload, ok("a"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let b = cache.get_or_fetch("/b", &options, counting_handler(&calls, ok("b2"))).await.unwrap();
        assert!(!b.hit);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_text_payload_round_trip() {
        let cache = ResponseCache::new(4);
        let options = CacheOptions::new(Duration::from_secs(60), ResponseType::Text);
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_fetch("/raw", &options, counting_handler(&calls, Payload::text("<p>hi</p>")))
            .await
            .unwrap();
        let res = cache
            .get_or_fetch("/raw", &CacheOptions::default(), counting_handler(&calls, Payload::text("other")))
            .await
            .unwrap();

        assert!(res.hit);
        assert_eq!(res.response_type, ResponseType::Text);
        assert_eq!(res.payload, Payload::text("<p>hi</p>"));
    }

    #[tokio::test]
    async fn test_concurrent_misses_each_call_handler() {
        let cache = ResponseCache::new(4);
        let options = CacheOptions::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let slow = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok::<_, Error>(Payload::Json(json!({"ok": true})))
            }
        };

        let (a, b) = tokio::join!(
            cache.get_or_fetch("/same", &options, slow(calls.clone())),
            cache.get_or_fetch("/same", &options, slow(calls.clone())),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = ResponseCache::new(4);
        let options = CacheOptions::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let ok = || Payload::Json(json!({"ok": true}));

        cache.get_or_fetch("/a", &options, counting_handler(&calls, ok())).await.unwrap();
        cache.get_or_fetch("/b", &options, counting_handler(&calls, ok())).await.unwrap();

        cache.invalidate("/a").await;
        let a = cache.get_or_fetch("/a", &options, counting_handler(&calls, ok())).await.unwrap();
        assert!(!a.hit);

        cache.clear().await;
        let b = cache.get_or_fetch("/b", &options, counting_handler(&calls, ok())).await.unwrap();
        assert!(!b.hit);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
