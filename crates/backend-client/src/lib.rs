//! REST client for the log collection backend.
//!
//! [`HttpBackend`] serves the dashboard core (it is both the [`FeedSource`] and the
//! [`Classifier`]) and the read-only listings. Administrative calls live on
//! [`AdminClient`], which is the only type that ever holds the master key.

mod admin;

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client as Http, Response};
use serde::de::DeserializeOwned;

use dashboard_core::types::status_map_from_wire;
use dashboard_core::{Classifier, FeedSource, LogEvent, LogId, StatusMap, WindowQuery};
use protocol::{AnalyzeResponse, DailyStatsRow, LogRecord, ReportRecord, StatusMapWire, SystemRecord};

pub use admin::{AdminClient, CleanupConfirmation};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct HttpBackend {
    http: Http,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_http(timeout)?,
            base_url: normalize_base(base_url)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Latest `limit` logs, newest first, optionally for one system.
    pub async fn logs(&self, limit: usize, system_id: Option<&str>) -> Result<Vec<LogRecord>> {
        let mut req = self.http.get(self.url("logs")).query(&[("limit", limit.to_string())]);
        if let Some(system) = system_id {
            req = req.query(&[("system_id", system)]);
        }
        let resp = req.send().await.context("logs request failed")?;
        decode(resp, "logs").await
    }

    pub async fn log_statuses(&self) -> Result<StatusMapWire> {
        let resp = self.http.get(self.url("logs/status")).send().await.context("status request failed")?;
        decode(resp, "logs/status").await
    }

    pub async fn daily_stats(&self) -> Result<Vec<DailyStatsRow>> {
        self.get_json("stats/daily").await
    }

    pub async fn systems(&self) -> Result<Vec<SystemRecord>> {
        self.get_json("systems").await
    }

    pub async fn system(&self, system_id: &str) -> Result<SystemRecord> {
        self.get_json(&format!("systems/{system_id}")).await
    }

    pub async fn reports(&self, limit: usize) -> Result<Vec<ReportRecord>> {
        let resp = self
            .http
            .get(self.url("reports"))
            .query(&[("limit", limit.to_string())])
            .send()
            .await
            .context("reports request failed")?;
        decode(resp, "reports").await
    }

    pub async fn report(&self, report_id: i64) -> Result<ReportRecord> {
        self.get_json(&format!("reports/{report_id}")).await
    }

    /// Raw classification reply. Error bodies are returned as `AnalyzeResponse::Failed`
    /// whatever the HTTP status, so callers can show the backend's message.
    pub async fn analyze_log(&self, log_id: LogId) -> Result<AnalyzeResponse> {
        let resp = self
            .http
            .post(self.url(&format!("analyze/{log_id}")))
            .send()
            .await
            .context("could not reach the analysis endpoint")?;

        let status = resp.status();
        let body = resp.text().await.context("failed to read analysis reply")?;
        match serde_json::from_str::<AnalyzeResponse>(&body) {
            Ok(reply) => {
                if !status.is_success() && !matches!(reply, AnalyzeResponse::Failed { .. }) {
                    return Err(anyhow!("analyze {status}: {body}"));
                }
                Ok(reply)
            }
            Err(_) if !status.is_success() => Err(anyhow!("analyze {status}: {body}")),
            Err(e) => Err(anyhow!("invalid analysis reply: {e}")),
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) fn http(&self) -> &Http {
        &self.http
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("{path} request failed"))?;
        decode(resp, path).await
    }
}

#[async_trait]
impl FeedSource for HttpBackend {
    async fn fetch_window(&self, query: &WindowQuery) -> Result<Vec<LogEvent>> {
        let records = self.logs(query.limit, query.system_id.as_deref()).await?;
        Ok(records.into_iter().map(LogEvent::from).collect())
    }

    async fn fetch_statuses(&self) -> Result<StatusMap> {
        Ok(status_map_from_wire(self.log_statuses().await?))
    }
}

#[async_trait]
impl Classifier for HttpBackend {
    async fn analyze(&self, log_id: LogId) -> Result<AnalyzeResponse> {
        tracing::debug!(log_id, "requesting classification");
        self.analyze_log(log_id).await
    }
}

pub(crate) fn build_http(timeout: Duration) -> Result<Http> {
    Http::builder()
        .pool_max_idle_per_host(8)
        .timeout(timeout)
        .build()
        .context("failed to build http client")
}

pub(crate) fn normalize_base(base_url: &str) -> Result<String> {
    let trimmed = base_url.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(anyhow!("backend url must start with http:// or https://, got {base_url:?}"));
    }
    Ok(trimmed.to_string())
}

pub(crate) async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        return Err(anyhow!("{what} {}: {}", status, resp.text().await.unwrap_or_default()));
    }
    resp.json().await.with_context(|| format!("invalid json from {what}"))
}
