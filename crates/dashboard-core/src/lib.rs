pub mod coordinator;
pub mod mocks;
pub mod poller;
pub mod ports;
pub mod presenter;
pub mod stats;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;

pub use coordinator::{AnalysisCoordinator, AnalysisError, AnalysisHandle, AnalysisOutcome};
pub use poller::{FeedPoller, FeedSnapshot, TickOutcome};
pub use ports::{Classifier, FeedObserver, FeedSource, FetchHalf, WindowQuery};
pub use presenter::{ClassificationPresenter, Theme, ThemeColor};
pub use stats::{AggregateSnapshot, StatsAggregator};
pub use types::{AnalysisResult, AnalysisStatus, LogEvent, LogId, Severity, StatusMap};

/// One row of the live feed as presented.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRow {
    pub event: LogEvent,
    pub status: AnalysisStatus,
}

/// Read-only projection consumed by the presentation layer.
#[derive(Debug, Clone)]
pub struct FeedView {
    pub seq: u64,
    pub rows: Vec<FeedRow>,
    pub stats: AggregateSnapshot,
    pub loaded: bool,
    pub window_error: Option<String>,
    pub status_error: Option<String>,
}

impl FeedView {
    pub fn is_degraded(&self) -> bool {
        self.window_error.is_some() || self.status_error.is_some()
    }
}

/// Headless dashboard core: a feed poller and an analysis coordinator over the same backend.
pub struct DashboardCore<S: FeedSource + 'static, C: Classifier + 'static> {
    poller: FeedPoller<S>,
    coordinator: AnalysisCoordinator<C>,
}

impl<B: FeedSource + Classifier + 'static> DashboardCore<B, B> {
    /// Build both halves over one backend that serves the feed and classifies.
    pub fn over(backend: Arc<B>) -> Self {
        Self {
            poller: FeedPoller::from_arc(backend.clone()),
            coordinator: AnalysisCoordinator::from_arc(backend),
        }
    }
}

impl<S: FeedSource + 'static, C: Classifier + 'static> DashboardCore<S, C> {
    pub fn new(poller: FeedPoller<S>, coordinator: AnalysisCoordinator<C>) -> Self {
        Self { poller, coordinator }
    }

    pub fn poller(&self) -> &FeedPoller<S> {
        &self.poller
    }

    pub fn coordinator(&self) -> &AnalysisCoordinator<C> {
        &self.coordinator
    }

    pub fn request_analysis(&self, log_id: LogId) -> AnalysisHandle {
        self.coordinator.request_analysis(log_id)
    }

    /// Merge the latest snapshot with local analysis state.
    pub fn view(&self) -> FeedView {
        self.project(&self.poller.snapshot())
    }

    pub fn project(&self, snapshot: &FeedSnapshot) -> FeedView {
        self.coordinator.reconcile(&snapshot.statuses);
        if snapshot.loaded {
            let visible: HashSet<LogId> = snapshot.window.iter().map(|e| e.id).collect();
            self.coordinator.retain_window(&visible);
        }

        let rows = snapshot
            .window
            .iter()
            .map(|event| FeedRow {
                status: self.coordinator.merged_status(event.id, &snapshot.statuses),
                event: event.clone(),
            })
            .collect();

        FeedView {
            seq: snapshot.seq,
            rows,
            stats: snapshot.aggregate(),
            loaded: snapshot.loaded,
            window_error: snapshot.window_error.clone(),
            status_error: snapshot.status_error.clone(),
        }
    }
}
