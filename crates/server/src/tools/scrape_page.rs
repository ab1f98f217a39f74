//! scrape_page tool implementation.
//!
//! Fetches a page and runs a selector set over it, returning one JSON record.
//! Detail pages are cached for ten minutes.

use chrono::Utc;
use rmcp::ErrorData as McpError;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use scrapegate_client::fetch::{canonicalize, host_key};
use scrapegate_client::{FetchRequest, Parser, Record, SelectorParser, SelectorSet};
use scrapegate_core::{CacheOptions, Error, MAX_TTL_MINUTES, Payload, ResponseType};
use serde::{Deserialize, Serialize};

use super::{json_result, tool_cache_key};
use crate::state::AppState;

pub const SCRAPE_PAGE_TTL_MINUTES: f64 = 10.0;

/// Input parameters for scrape_page tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScrapePageParams {
    /// The URL to fetch.
    pub url: String,

    /// Versioned selectors describing the fields to extract.
    pub selectors: SelectorSet,

    /// Site identifier for health tracking and selector errors (default: the URL's host).
    #[serde(default)]
    pub site: Option<String>,

    /// Raw `name=value; name2=value2` cookies sent on top of stored ones.
    #[serde(default)]
    pub cookies: Option<String>,

    /// Cache lifetime in minutes (default: 10; 0 disables caching; max 43200).
    #[serde(default)]
    pub ttl_minutes: Option<f64>,
}

/// Output structure for scrape_page tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScrapePageOutput {
    pub ok: bool,
    /// The URL requested.
    pub url: String,
    /// Site the record was scraped for.
    pub site: String,
    /// Selector set version used.
    pub version: String,
    /// Extracted fields.
    pub record: Record,
    /// ISO8601 timestamp of when the page was fetched.
    pub fetched_at: String,
    /// Whether this result came from the cache.
    #[serde(default)]
    pub cached: bool,
}

impl ScrapePageParams {
    fn cache_key(&self) -> Result<String, Error> {
        let selectors = serde_json::to_string(&self.selectors)
            .map_err(|e| Error::InvalidInput(format!("Failed to encode selectors: {e}")))?;

        Ok(tool_cache_key(
            "scrape_page",
            &[
                ("url", Some(self.url.as_str())),
                ("site", self.site.as_deref()),
                ("cookies", self.cookies.as_deref()),
                ("selectors", Some(selectors.as_str())),
            ],
        ))
    }

    fn resolve_site(&self) -> Result<String, Error> {
        if let Some(site) = &self.site {
            return Ok(site.clone());
        }
        let url = canonicalize(&self.url)?;
        host_key(&url).ok_or_else(|| Error::InvalidUrl(format!("missing host: {}", self.url)))
    }
}

/// Implementation of the scrape_page tool.
pub async fn scrape_page_impl(state: &AppState, params: ScrapePageParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }

    let ttl_minutes = params.ttl_minutes.unwrap_or(SCRAPE_PAGE_TTL_MINUTES);
    if !ttl_minutes.is_finite() || !(0.0..=MAX_TTL_MINUTES).contains(&ttl_minutes) {
        return Err(Error::InvalidInput(format!("ttl_minutes must be between 0 and {MAX_TTL_MINUTES}")).into());
    }

    let site = params.resolve_site()?;
    let version = params.selectors.version.clone();
    let parser = SelectorParser::new(params.selectors.clone())?;
    let key = params.cache_key()?;
    let options = CacheOptions::from_minutes(Some(ttl_minutes), ResponseType::Json);

    let cached = state
        .cache
        .get_or_fetch(&key, &options, || async {
            let mut request = FetchRequest::get(params.url.clone()).site(site.clone());
            if let Some(cookies) = &params.cookies {
                request = request.cookies(cookies.clone());
            }

            let html = state.client.fetch_html(request).await?;
            let record = parser.parse(&html, &site)?;

            let output = ScrapePageOutput {
                ok: true,
                url: params.url.clone(),
                site: site.clone(),
                version: version.clone(),
                record,
                fetched_at: Utc::now().to_rfc3339(),
                cached: false,
            };
            let value = serde_json::to_value(&output)
                .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
            Ok::<_, Error>(Payload::Json(value))
        })
        .await?;

    let mut value = match cached.payload {
        Payload::Json(value) => value,
        Payload::Text { body, .. } => serde_json::Value::String(body),
    };
    if let Some(object) = value.as_object_mut() {
        object.insert("cached".into(), cached.hit.into());
    }

    json_result(&value).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{json, state};
    use scrapegate_client::FieldSelector;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DETAIL: &str = r#"<html><body><h1>Frieren</h1><span class="score">9.1</span></body></html>"#;

    fn selectors(fields: &[(&str, &str)]) -> SelectorSet {
        SelectorSet {
            version: "v3".into(),
            fields: fields
                .iter()
                .map(|(name, sel)| FieldSelector {
                    name: name.to_string(),
                    selector: sel.to_string(),
                    attr: None,
                    many: false,
                    required: true,
                })
                .collect(),
        }
    }

    async fn detail_server(expected: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/anime/frieren"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DETAIL))
            .expect(expected)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_scrape_and_cache() {
        let server = detail_server(1).await;
        let state = state();
        let params = ScrapePageParams {
            url: format!("{}/anime/frieren", server.uri()),
            selectors: selectors(&[("title", "h1"), ("score", ".score")]),
            site: Some("anime".into()),
            cookies: None,
            ttl_minutes: None,
        };

        let first = json(&scrape_page_impl(&state, params.clone()).await.unwrap());
        assert_eq!(first["ok"], true);
        assert_eq!(first["cached"], false);
        assert_eq!(first["version"], "v3");
        assert_eq!(first["record"]["title"], "Frieren");
        assert_eq!(first["record"]["score"], "9.1");

        let second = json(&scrape_page_impl(&state, params).await.unwrap());
        assert_eq!(second["cached"], true);
        assert_eq!(second["record"], first["record"]);
    }

    #[tokio::test]
    async fn test_selector_miss_is_error_and_not_cached() {
        let server = detail_server(2).await;
        let state = state();
        let params = ScrapePageParams {
            url: format!("{}/anime/frieren", server.uri()),
            selectors: selectors(&[("studio", ".studio")]),
            site: Some("anime".into()),
            cookies: None,
            ttl_minutes: None,
        };

        for _ in 0..2 {
            let err = scrape_page_impl(&state, params.clone()).await.unwrap_err();
            assert_eq!(err.data.unwrap()["code"], "SELECTOR_MISSING");
        }
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let server = detail_server(2).await;
        let state = state();
        let params = ScrapePageParams {
            url: format!("{}/anime/frieren", server.uri()),
            selectors: selectors(&[("title", "h1")]),
            site: None,
            cookies: None,
            ttl_minutes: Some(0.0),
        };

        for _ in 0..2 {
            let out = json(&scrape_page_impl(&state, params.clone()).await.unwrap());
            assert_eq!(out["cached"], false);
            assert!(out["site"].as_str().unwrap().starts_with("127.0.0.1:"));
        }
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_rejected() {
        let server = detail_server(0).await;
        let state = state();

        for ttl in [1e18, -1.0, f64::INFINITY] {
            let params = ScrapePageParams {
                url: format!("{}/anime/frieren", server.uri()),
                selectors: selectors(&[("title", "h1")]),
                site: None,
                cookies: None,
                ttl_minutes: Some(ttl),
            };
            let err = scrape_page_impl(&state, params).await.unwrap_err();
            assert_eq!(err.data.unwrap()["code"], "INVALID_INPUT", "ttl {ttl}");
        }
    }

    #[tokio::test]
    async fn test_bad_selector_fails_before_fetch() {
        let server = detail_server(0).await;
        let params = ScrapePageParams {
            url: format!("{}/anime/frieren", server.uri()),
            selectors: selectors(&[("broken", "h1[")]),
            site: None,
            cookies: None,
            ttl_minutes: None,
        };

        let err = scrape_page_impl(&state(), params).await.unwrap_err();
        assert_eq!(err.data.unwrap()["code"], "INVALID_INPUT");
    }
}
