//! Resilient HTTP fetch pipeline.
//!
//! ### Per attempt
//! - Wait for a token from the host's rate bucket
//! - Build browser-like headers (rotating User-Agent and Accept-Language,
//!   origin Referer, stored cookies merged with any override)
//! - Send with a per-attempt timeout
//!
//! ### Retry
//! - 403, 429, and 5xx gateway statuses back off `500ms * 2^(n-1)` plus jitter
//! - Timeouts and connection errors back off `300ms * 2^(n-1)` plus jitter
//! - Anything else fails immediately
//!
//! ### Cancellation
//! - A [`CancellationToken`] on the request aborts the rate-limit wait, the
//!   in-flight request, and the backoff sleep. Aborts are never retried and
//!   never reach the health records.

pub mod backoff;
pub mod context;
pub mod cookies;
pub mod headers;
pub mod rate_limit;
pub mod url;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::{Client, Method, Response, StatusCode, Url, header, redirect};
use scrapegate_core::{AppConfig, Error};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub use backoff::{RETRYABLE_STATUSES, RetryPolicy, calculate_backoff, is_retryable_status};
pub use context::FetchContext;
pub use cookies::CookieJar;
pub use headers::HeaderRotation;
pub use rate_limit::RateLimiter;
pub use self::url::{UrlError, canonicalize, host_key, origin_referer};

use crate::health::FailureReport;

/// Redirect targets resolved at once by [`FetchClient::get_final_urls`].
const RESOLVE_CONCURRENCY: usize = 4;

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-attempt timeout (default: 25s)
    pub timeout: Duration,

    /// Retries after the first attempt (default: 3)
    pub max_retries: u32,

    /// Token refill rate per host (default: 0.5/s)
    pub rps: f64,

    /// Token bucket capacity per host (default: 2)
    pub burst: f64,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Backoff delays between attempts
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_retries: config.max_retries,
            rps: config.default_rps,
            burst: config.default_burst,
            max_bytes: config.max_bytes,
            max_redirects: config.max_redirects,
            retry: RetryPolicy::default(),
        }
    }
}

/// One logical fetch. Unset fields fall back to the client's [`FetchConfig`].
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    /// Health record key; defaults to the host key.
    pub site: Option<String>,
    pub max_retries: Option<u32>,
    pub timeout: Option<Duration>,
    /// Raw `"k=v; k2=v2"` cookies applied over the jar.
    pub cookies_override: Option<String>,
    pub cancel: Option<CancellationToken>,
    pub rps: Option<f64>,
    pub burst: Option<f64>,
    /// Defaults to the request's origin.
    pub referer: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Vec::new(),
            body: None,
            site: None,
            max_retries: None,
            timeout: None,
            cookies_override: None,
            cancel: None,
            rps: None,
            burst: None,
            referer: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cookies(mut self, cookies: impl Into<String>) -> Self {
        self.cookies_override = Some(cookies.into());
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn rate(mut self, rps: f64, burst: f64) -> Self {
        self.rps = Some(rps);
        self.burst = Some(burst);
        self
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }
}

/// Response from a fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The original URL requested
    pub url: Url,
    /// The final URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Content-Type header
    pub content_type: Option<String>,
    /// Response body bytes
    pub bytes: Bytes,
    /// Response headers
    pub headers: header::HeaderMap,
    /// Time taken to fetch in milliseconds, including retries
    pub fetch_ms: u64,
}

/// How one attempt ended.
enum AttemptOutcome {
    Success(Response),
    Status(StatusCode),
    Timeout,
    Network(String),
    Fatal(String),
}

impl AttemptOutcome {
    fn classify(result: Result<Response, reqwest::Error>) -> Self {
        match result {
            Ok(response) if response.status().is_success() => AttemptOutcome::Success(response),
            Ok(response) => AttemptOutcome::Status(response.status()),
            Err(e) if e.is_timeout() => AttemptOutcome::Timeout,
            Err(e) if e.is_redirect() || e.is_builder() => AttemptOutcome::Fatal(e.without_url().to_string()),
            Err(e) => AttemptOutcome::Network(e.without_url().to_string()),
        }
    }
}

/// Settings resolved for one logical fetch.
struct Plan {
    url: Url,
    host: String,
    site: String,
    referer: String,
    max_retries: u32,
    timeout: Duration,
    rps: f64,
    burst: f64,
    cancel: CancellationToken,
}

/// HTTP fetch client with rate limiting, retries, and cookie persistence.
#[derive(Debug, Clone)]
pub struct FetchClient {
    http: Client,
    /// Never follows redirects; used to resolve them.
    no_follow: Client,
    config: FetchConfig,
    ctx: FetchContext,
}

impl FetchClient {
    /// Create a new fetch client over shared state.
    pub fn new(config: FetchConfig, ctx: FetchContext) -> Result<Self, Error> {
        let http = build_http(&config, redirect::Policy::limited(config.max_redirects))?;
        let no_follow = build_http(&config, redirect::Policy::none())?;

        Ok(Self { http, no_follow, config, ctx })
    }

    /// Fetch with retries, returning the raw response of the successful attempt.
    pub async fn fetch_response(&self, request: FetchRequest) -> Result<Response, Error> {
        let plan = self.plan(&request)?;
        let mut attempt = 0u32;

        loop {
            attempt = attempt.saturating_add(1);

            let acquire = self.ctx.rate_limiter.acquire(&plan.host, plan.rps, plan.burst);
            if until_cancelled(&plan.cancel, acquire).await.is_none() {
                return Err(aborted(&plan));
            }

            let cookie = self.ctx.cookies.build_cookie_header(&plan.host, request.cookies_override.as_deref());
            let headers = self.ctx.headers.build(&plan.host, attempt, &plan.referer, &request.headers, cookie)?;

            let mut builder = self
                .http
                .request(request.method.clone(), plan.url.clone())
                .headers(headers)
                .timeout(plan.timeout);
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            tracing::debug!(url = %plan.url, attempt, "sending request");
            let Some(result) = until_cancelled(&plan.cancel, builder.send()).await else {
                return Err(aborted(&plan));
            };

            let can_retry = attempt <= plan.max_retries;

            let delay = match AttemptOutcome::classify(result) {
                AttemptOutcome::Success(response) => {
                    self.ctx.cookies.store_cookies(&plan.host, response.headers());
                    self.ctx.health.record_success(&plan.site);
                    tracing::debug!(url = %plan.url, attempt, status = response.status().as_u16(), "fetch succeeded");
                    return Ok(response);
                }
                AttemptOutcome::Status(status) if can_retry && is_retryable_status(status.as_u16()) => {
                    let delay = self.config.retry.status_delay(attempt);
                    tracing::warn!(
                        url = %plan.url, attempt, status = status.as_u16(), delay_ms = delay.as_millis() as u64,
                        "retryable status, backing off"
                    );
                    delay
                }
                AttemptOutcome::Status(status) => {
                    let status = status.as_u16();
                    tracing::warn!(url = %plan.url, attempt, status, "fetch failed");
                    self.record_failure(&plan, FailureReport::new(format!("status {status}")).status(status));
                    return Err(Error::FetchFailed {
                        attempt,
                        status,
                        url: plan.url.to_string(),
                        site: plan.site.clone(),
                    });
                }
                AttemptOutcome::Timeout | AttemptOutcome::Network(_) if can_retry => {
                    let delay = self.config.retry.network_delay(attempt);
                    tracing::warn!(url = %plan.url, attempt, delay_ms = delay.as_millis() as u64, "transport error, backing off");
                    delay
                }
                AttemptOutcome::Timeout => {
                    tracing::warn!(url = %plan.url, attempt, "fetch timed out");
                    self.record_failure(&plan, FailureReport::new(format!("timed out after {attempt} attempts")));
                    return Err(Error::Timeout { attempt, url: plan.url.to_string(), site: plan.site.clone() });
                }
                AttemptOutcome::Network(message) => {
                    tracing::warn!(url = %plan.url, attempt, error = %message, "fetch failed");
                    self.record_failure(&plan, FailureReport::new(message.clone()));
                    return Err(Error::Network { attempt, url: plan.url.to_string(), site: plan.site.clone(), message });
                }
                AttemptOutcome::Fatal(message) => {
                    tracing::warn!(url = %plan.url, attempt, error = %message, "unrecoverable fetch error");
                    self.record_failure(&plan, FailureReport::new(message.clone()));
                    return Err(Error::Fatal { url: plan.url.to_string(), message });
                }
            };

            if until_cancelled(&plan.cancel, tokio::time::sleep(delay)).await.is_none() {
                return Err(aborted(&plan));
            }
        }
    }

    /// Fetch a URL, returning raw bytes and metadata.
    ///
    /// Respects the byte limit both on `Content-Length` and on the body read.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, Error> {
        let start = Instant::now();
        let url = canonicalize(&request.url)?;

        let response = self.fetch_response(request).await?;
        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let final_url = response.url().clone();
        let headers = response.headers().clone();

        let bytes = response.bytes().await.map_err(|e| Error::Fatal {
            url: url.to_string(),
            message: format!("failed to read response: {}", e.without_url()),
        })?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!("fetched {} -> {} in {}ms ({} bytes)", url, final_url, fetch_ms, bytes.len());

        Ok(FetchResponse { url, final_url, status, content_type, bytes, headers, fetch_ms })
    }

    /// Fetch and decode the body as text, replacing invalid UTF-8.
    pub async fn fetch_html(&self, request: FetchRequest) -> Result<String, Error> {
        let response = self.fetch(request).await?;
        Ok(String::from_utf8_lossy(&response.bytes).into_owned())
    }

    /// Resolve one redirect hop with a no-follow `HEAD`.
    ///
    /// Returns the `Location` target resolved against `url`, or `url` itself
    /// when the server does not redirect. Statuses of 400 and above fail.
    pub async fn get_final_url(&self, url: &str, referer: Option<&str>) -> Result<String, Error> {
        let parsed = canonicalize(url)?;
        let host = host_key(&parsed).ok_or_else(|| Error::InvalidUrl(format!("missing host: {url}")))?;
        let referer = referer.map(str::to_string).unwrap_or_else(|| origin_referer(&parsed));

        self.ctx.rate_limiter.acquire(&host, self.config.rps, self.config.burst).await;

        let cookie = self.ctx.cookies.build_cookie_header(&host, None);
        let headers = self.ctx.headers.build(&host, 1, &referer, &[], cookie)?;

        let response = self
            .no_follow
            .head(parsed.clone())
            .headers(headers)
            .send()
            .await
            .map_err(|e| match AttemptOutcome::classify(Err(e)) {
                AttemptOutcome::Timeout => Error::Timeout { attempt: 1, url: parsed.to_string(), site: host.clone() },
                AttemptOutcome::Fatal(message) => Error::Fatal { url: parsed.to_string(), message },
                AttemptOutcome::Network(message) => {
                    Error::Network { attempt: 1, url: parsed.to_string(), site: host.clone(), message }
                }
                AttemptOutcome::Success(_) | AttemptOutcome::Status(_) => {
                    Error::Fatal { url: parsed.to_string(), message: "unexpected response".to_string() }
                }
            })?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(Error::FetchFailed { attempt: 1, status: status.as_u16(), url: parsed.to_string(), site: host });
        }

        if status.is_redirection()
            && let Some(location) = response.headers().get(header::LOCATION).and_then(|v| v.to_str().ok())
        {
            let target = parsed
                .join(location)
                .map_err(|e| Error::Fatal { url: parsed.to_string(), message: format!("invalid redirect target: {e}") })?;
            tracing::debug!(from = %parsed, to = %target, "resolved redirect");
            return Ok(target.to_string());
        }

        Ok(url.to_string())
    }

    /// Resolve a batch of redirects, `retries` extra tries per URL.
    ///
    /// Output order matches input order; URLs that never resolve yield `""`.
    pub async fn get_final_urls(&self, urls: &[String], referer: Option<&str>, retries: u32) -> Vec<String> {
        let semaphore = Arc::new(Semaphore::new(RESOLVE_CONCURRENCY));
        let mut join_set = JoinSet::new();

        for (index, url) in urls.iter().cloned().enumerate() {
            let client = self.clone();
            let referer = referer.map(str::to_string);
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, String::new());
                };
                (index, client.resolve_with_retries(&url, referer.as_deref(), retries).await)
            });
        }

        let mut resolved = vec![String::new(); urls.len()];
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((index, url)) => resolved[index] = url,
                Err(e) => tracing::warn!(error = %e, "redirect resolution task failed"),
            }
        }
        resolved
    }

    async fn resolve_with_retries(&self, url: &str, referer: Option<&str>, retries: u32) -> String {
        let attempts = retries.saturating_add(1);
        for attempt in 1..=attempts {
            match self.get_final_url(url, referer).await {
                Ok(resolved) => return resolved,
                Err(e @ Error::InvalidUrl(_)) => {
                    tracing::warn!(url, error = %e, "cannot resolve redirect");
                    return String::new();
                }
                Err(e) if attempt == attempts => {
                    tracing::warn!(url, attempt, error = %e, "giving up on redirect resolution");
                }
                Err(e) => {
                    tracing::debug!(url, attempt, error = %e, "redirect resolution failed, retrying");
                    tokio::time::sleep(self.config.retry.network_delay(attempt)).await;
                }
            }
        }
        String::new()
    }

    /// Shared state behind this client.
    pub fn context(&self) -> &FetchContext {
        &self.ctx
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn plan(&self, request: &FetchRequest) -> Result<Plan, Error> {
        let url = canonicalize(&request.url)?;
        let host = host_key(&url).ok_or_else(|| Error::InvalidUrl(format!("missing host: {}", request.url)))?;

        Ok(Plan {
            site: request.site.clone().unwrap_or_else(|| host.clone()),
            referer: request.referer.clone().unwrap_or_else(|| origin_referer(&url)),
            max_retries: request.max_retries.unwrap_or(self.config.max_retries),
            timeout: request.timeout.unwrap_or(self.config.timeout),
            rps: request.rps.unwrap_or(self.config.rps),
            burst: request.burst.unwrap_or(self.config.burst),
            cancel: request.cancel.clone().unwrap_or_default(),
            url,
            host,
        })
    }

    fn record_failure(&self, plan: &Plan, report: FailureReport) {
        self.ctx.health.record_failure(&plan.site, report.url(plan.url.to_string()));
    }
}

fn build_http(config: &FetchConfig, policy: redirect::Policy) -> Result<Client, Error> {
    Client::builder()
        .timeout(config.timeout)
        .redirect(policy)
        .use_rustls_tls()
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))
}

fn aborted(plan: &Plan) -> Error {
    tracing::debug!(url = %plan.url, "fetch aborted");
    Error::Aborted { url: plan.url.to_string() }
}

/// Run `fut` unless `cancel` fires first.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}
