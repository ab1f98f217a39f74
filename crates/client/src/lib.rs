//! Client code for scrapegate.
//!
//! This crate provides the resilient HTTP fetch pipeline (rate limiting,
//! cookie persistence, retries), per-site health metrics, and the parser
//! seam used by the server.

pub mod extract;
pub mod fetch;
pub mod health;

pub use extract::{FieldSelector, Parser, Record, SelectorParser, SelectorSet};

pub use fetch::{
    CookieJar, FetchClient, FetchConfig, FetchContext, FetchRequest, FetchResponse, HeaderRotation, RateLimiter,
    RetryPolicy,
};

pub use health::{FailureReport, HealthMetrics, HealthSnapshot, LastError};
