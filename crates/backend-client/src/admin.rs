use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::RequestBuilder;

use protocol::{
    CleanupResponse, FilterRecord, PatternBody, SystemCreate, SystemRecord, SystemUpdate, MASTER_KEY_HEADER,
};

use crate::{decode, HttpBackend, DEFAULT_TIMEOUT};

/// Explicit go-ahead for a retroactive cleanup. Only valid for the exact pattern it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupConfirmation {
    pattern: String,
}

impl CleanupConfirmation {
    pub fn for_pattern(pattern: &str) -> Self {
        Self { pattern: pattern.to_string() }
    }
}

/// Client for the administrative endpoints. Every request carries the master key.
#[derive(Clone)]
pub struct AdminClient {
    backend: HttpBackend,
    master_key: String,
}

impl fmt::Debug for AdminClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminClient")
            .field("base_url", &self.backend.base_url())
            .field("master_key", &"<redacted>")
            .finish()
    }
}

impl AdminClient {
    pub fn new(base_url: &str, master_key: &str) -> Result<Self> {
        Self::with_timeout(base_url, master_key, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, master_key: &str, timeout: Duration) -> Result<Self> {
        let master_key = master_key.trim();
        if master_key.is_empty() {
            return Err(anyhow!("master key is empty"));
        }
        Ok(Self {
            backend: HttpBackend::with_timeout(base_url, timeout)?,
            master_key: master_key.to_string(),
        })
    }

    pub async fn register(&self, system: &SystemCreate) -> Result<SystemRecord> {
        let resp = self
            .authed(self.backend.http().post(self.backend.url("register")))
            .json(system)
            .send()
            .await
            .context("register request failed")?;
        decode(resp, "register").await
    }

    pub async fn update_system(&self, system_id: &str, update: &SystemUpdate) -> Result<SystemRecord> {
        let path = format!("systems/{system_id}");
        let resp = self
            .authed(self.backend.http().put(self.backend.url(&path)))
            .json(update)
            .send()
            .await
            .context("system update failed")?;
        decode(resp, &path).await
    }

    /// Replace the technical notes of a system.
    pub async fn update_notes(&self, system_id: &str, notes: &str) -> Result<SystemRecord> {
        self.update_system(system_id, &SystemUpdate::technical_info(notes)).await
    }

    pub async fn filters(&self, system_id: &str) -> Result<Vec<FilterRecord>> {
        let path = format!("systems/{system_id}/filters");
        let resp = self
            .authed(self.backend.http().get(self.backend.url(&path)))
            .send()
            .await
            .context("filters request failed")?;
        decode(resp, &path).await
    }

    pub async fn add_filter(&self, system_id: &str, pattern: &str) -> Result<FilterRecord> {
        let pattern = non_empty_pattern(pattern)?;
        let path = format!("systems/{system_id}/filters");
        let resp = self
            .authed(self.backend.http().post(self.backend.url(&path)))
            .json(&PatternBody { pattern })
            .send()
            .await
            .context("filter create failed")?;
        decode(resp, &path).await
    }

    pub async fn remove_filter(&self, system_id: &str, filter_id: i64) -> Result<()> {
        let path = format!("systems/{system_id}/filters/{filter_id}");
        let resp = self
            .authed(self.backend.http().delete(self.backend.url(&path)))
            .send()
            .await
            .context("filter delete failed")?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("{path} {}: {}", status, resp.text().await.unwrap_or_default()));
        }
        Ok(())
    }

    /// Delete every stored log of `system_id` matching `pattern`. The backend's count is
    /// returned as is.
    pub async fn cleanup(
        &self,
        system_id: &str,
        pattern: &str,
        confirmation: CleanupConfirmation,
    ) -> Result<CleanupResponse> {
        let pattern = non_empty_pattern(pattern)?;
        if confirmation.pattern != pattern {
            return Err(anyhow!("cleanup confirmation does not match pattern {pattern:?}"));
        }
        let path = format!("systems/{system_id}/cleanup");
        let resp = self
            .authed(self.backend.http().post(self.backend.url(&path)))
            .json(&PatternBody { pattern })
            .send()
            .await
            .context("cleanup request failed")?;
        let reply: CleanupResponse = decode(resp, &path).await?;
        tracing::info!(system_id, cleaned = reply.cleaned_count, "cleanup finished");
        Ok(reply)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(MASTER_KEY_HEADER, &self.master_key)
    }
}

fn non_empty_pattern(pattern: &str) -> Result<String> {
    if pattern.trim().is_empty() {
        return Err(anyhow!("pattern must not be empty"));
    }
    Ok(pattern.to_string())
}
