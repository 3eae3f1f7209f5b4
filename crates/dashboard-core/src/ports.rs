use anyhow::Result;
use async_trait::async_trait;

use crate::poller::FeedSnapshot;
use crate::types::{LogEvent, LogId, StatusMap};

/// Which half of a poll tick a result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchHalf {
    Window,
    Statuses,
}

impl std::fmt::Display for FetchHalf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchHalf::Window => f.write_str("log window"),
            FetchHalf::Statuses => f.write_str("status map"),
        }
    }
}

/// Parameters of a log window fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowQuery {
    pub limit: usize,
    pub system_id: Option<String>,
}

impl WindowQuery {
    pub fn latest(limit: usize) -> Self {
        Self { limit, system_id: None }
    }
}

/// Pull access to the backend's log window and status map.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_window(&self, query: &WindowQuery) -> Result<Vec<LogEvent>>;

    async fn fetch_statuses(&self) -> Result<StatusMap>;
}

/// The external classification service.
///
/// `Err` means the service could not be reached; a reachable service that
/// refuses reports it through [`protocol::AnalyzeResponse::Failed`].
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn analyze(&self, log_id: LogId) -> Result<protocol::AnalyzeResponse>;
}

/// Passive notifications from the poller. All methods default to no-ops.
pub trait FeedObserver: Send + Sync {
    fn on_published(&self, _snapshot: &FeedSnapshot) {}

    fn on_tick_failed(&self, _seq: u64, _half: FetchHalf, _error: &anyhow::Error) {}

    fn on_stale_discarded(&self, _seq: u64, _latest: u64) {}
}
