//! Per-site health records.
//!
//! Every terminal fetch outcome lands here: successes reset the failure
//! streak, failures record what went wrong. Readers always get copies.

use std::collections::BTreeMap;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Details of the most recent failure for a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    /// Epoch milliseconds.
    pub at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Point-in-time copy of a site's health record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub site: String,
    /// Epoch milliseconds of the last successful fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastError>,
    pub consecutive_failures: u32,
}

/// What a failed fetch reports to [`HealthMetrics::record_failure`].
#[derive(Debug, Clone, Default)]
pub struct FailureReport {
    pub status: Option<u16>,
    pub message: String,
    pub url: Option<String>,
}

impl FailureReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), ..Default::default() }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Health records keyed by site.
#[derive(Debug, Default)]
pub struct HealthMetrics {
    records: DashMap<String, HealthSnapshot>,
}

impl HealthMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, site: &str) {
        let mut record = self.entry(site);
        record.last_success = Some(Utc::now().timestamp_millis());
        record.consecutive_failures = 0;
    }

    pub fn record_failure(&self, site: &str, report: FailureReport) {
        let status = report.status;
        let mut record = self.entry(site);
        let at = Utc::now().timestamp_millis();
        record.last_error = Some(LastError { at, status, message: report.message, url: report.url });
        record.consecutive_failures = record.consecutive_failures.saturating_add(1);

        tracing::debug!(site, failures = record.consecutive_failures, ?status, "recorded fetch failure");
    }

    /// Snapshot of one site, if it has ever been recorded.
    pub fn get(&self, site: &str) -> Option<HealthSnapshot> {
        self.records.get(site).map(|r| r.value().clone())
    }

    /// Snapshots of every recorded site, ordered by site.
    pub fn get_all(&self) -> BTreeMap<String, HealthSnapshot> {
        self.records
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    /// Forget one site, or every site when `site` is `None`.
    pub fn reset(&self, site: Option<&str>) {
        match site {
            Some(site) => {
                self.records.remove(site);
            }
            None => self.records.clear(),
        }
    }

    fn entry(&self, site: &str) -> dashmap::mapref::one::RefMut<'_, String, HealthSnapshot> {
        self.records
            .entry(site.to_string())
            .or_insert_with(|| HealthSnapshot { site: site.to_string(), ..Default::default() })
    }
}
