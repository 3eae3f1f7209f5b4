use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::ports::Classifier;
use crate::types::{AnalysisResult, AnalysisStatus, LogId, StatusMap};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    /// The classification service could not be reached.
    #[error("Could not reach the classification service ({0})")]
    Connection(String),
    /// The service answered with an error of its own.
    #[error("{message}")]
    Backend { code: String, message: String },
    #[error("Analysis task ended unexpectedly ({0})")]
    Aborted(String),
}

pub type AnalysisOutcome = Result<AnalysisResult, AnalysisError>;

type SharedOutcome = Shared<BoxFuture<'static, AnalysisOutcome>>;

/// Handle to an analysis request. Dropping it does not cancel the request.
#[derive(Clone)]
pub struct AnalysisHandle {
    log_id: LogId,
    dispatched: bool,
    outcome: SharedOutcome,
}

impl AnalysisHandle {
    pub fn log_id(&self) -> LogId {
        self.log_id
    }

    /// False when the call joined a request that was already in flight.
    pub fn dispatched(&self) -> bool {
        self.dispatched
    }

    pub async fn outcome(self) -> AnalysisOutcome {
        self.outcome.await
    }
}

#[derive(Default)]
struct Entry {
    status: AnalysisStatus,
    outcome: Option<AnalysisOutcome>,
    request: Option<(u64, SharedOutcome)>,
}

/// Owns the lifecycle of "analyze this log" requests.
///
/// At most one request per log id is outstanding at any time. Cloning yields
/// another handle onto the same state.
pub struct AnalysisCoordinator<C: Classifier + 'static> {
    classifier: Arc<C>,
    entries: Arc<Mutex<HashMap<LogId, Entry>>>,
    next_request: Arc<AtomicU64>,
}

impl<C: Classifier + 'static> Clone for AnalysisCoordinator<C> {
    fn clone(&self) -> Self {
        Self {
            classifier: self.classifier.clone(),
            entries: self.entries.clone(),
            next_request: self.next_request.clone(),
        }
    }
}

impl<C: Classifier + 'static> AnalysisCoordinator<C> {
    pub fn new(classifier: C) -> Self {
        Self::from_arc(Arc::new(classifier))
    }

    pub fn from_arc(classifier: Arc<C>) -> Self {
        Self {
            classifier,
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_request: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Ask for `log_id` to be classified. Joins the in-flight request if there is one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn request_analysis(&self, log_id: LogId) -> AnalysisHandle {
        let mut entries = lock(&self.entries);
        let entry = entries.entry(log_id).or_default();

        if let Some((_, outcome)) = &entry.request {
            debug!(log_id, "analysis already in flight; joining it");
            return AnalysisHandle { log_id, dispatched: false, outcome: outcome.clone() };
        }

        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        entry.status = AnalysisStatus::Analyzing;
        entry.outcome = None;

        let classifier = self.classifier.clone();
        let task_entries = self.entries.clone();
        let task = tokio::spawn(async move {
            let outcome = classify(classifier.as_ref(), log_id).await;
            finish(&task_entries, log_id, request_id, &outcome);
            outcome
        });

        let join_entries = self.entries.clone();
        let outcome: SharedOutcome = task
            .map(move |joined| match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    let outcome = Err(AnalysisError::Aborted(e.to_string()));
                    finish(&join_entries, log_id, request_id, &outcome);
                    outcome
                }
            })
            .boxed()
            .shared();

        entry.request = Some((request_id, outcome.clone()));
        info!(log_id, request_id, "analysis dispatched");
        AnalysisHandle { log_id, dispatched: true, outcome }
    }

    /// Status as known locally, ignoring the backend.
    pub fn local_status(&self, log_id: LogId) -> AnalysisStatus {
        lock(&self.entries).get(&log_id).map(|e| e.status).unwrap_or_default()
    }

    /// Last finished outcome for `log_id`, for the detail view.
    pub fn outcome(&self, log_id: LogId) -> Option<AnalysisOutcome> {
        lock(&self.entries).get(&log_id).and_then(|e| e.outcome.clone())
    }

    pub fn is_in_flight(&self, log_id: LogId) -> bool {
        lock(&self.entries).get(&log_id).is_some_and(|e| e.request.is_some())
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.entries).values().filter(|e| e.request.is_some()).count()
    }

    /// Status to present for `log_id` given the backend's map.
    pub fn merged_status(&self, log_id: LogId, backend: &StatusMap) -> AnalysisStatus {
        let local = lock(&self.entries).get(&log_id).map(|e| e.status);
        merge_one(local, backend.get(&log_id).copied())
    }

    /// Merged status for every id known locally or to the backend. Idle entries are left out.
    pub fn merged(&self, backend: &StatusMap) -> StatusMap {
        let entries = lock(&self.entries);
        let ids: HashSet<LogId> = entries.keys().chain(backend.keys()).copied().collect();
        ids.into_iter()
            .filter_map(|id| {
                let status = merge_one(entries.get(&id).map(|e| e.status), backend.get(&id).copied());
                (status != AnalysisStatus::Idle).then_some((id, status))
            })
            .collect()
    }

    /// Adopt terminal backend statuses for logs with no request in flight.
    pub fn reconcile(&self, backend: &StatusMap) {
        let mut entries = lock(&self.entries);
        for (id, entry) in entries.iter_mut() {
            if entry.request.is_some() {
                continue;
            }
            if let Some(remote) = backend.get(id).filter(|s| s.is_terminal()) {
                if entry.status != *remote {
                    debug!(log_id = *id, local = %entry.status, remote = %remote, "backend status wins");
                    entry.status = *remote;
                }
            }
        }
    }

    /// Forget finished entries whose log left the window. In-flight entries are kept.
    pub fn retain_window(&self, visible: &HashSet<LogId>) {
        lock(&self.entries).retain(|id, entry| entry.request.is_some() || visible.contains(id));
    }
}

/// Backend terminal wins; a local in-flight state survives an absent or stale backend entry.
fn merge_one(local: Option<AnalysisStatus>, remote: Option<AnalysisStatus>) -> AnalysisStatus {
    match (local, remote) {
        (_, Some(remote)) if remote.is_terminal() => remote,
        (Some(AnalysisStatus::Analyzing), _) => AnalysisStatus::Analyzing,
        (_, Some(remote)) if remote != AnalysisStatus::Idle => remote,
        (Some(local), _) => local,
        (None, remote) => remote.unwrap_or_default(),
    }
}

async fn classify<C: Classifier + ?Sized>(classifier: &C, log_id: LogId) -> AnalysisOutcome {
    match classifier.analyze(log_id).await {
        Ok(protocol::AnalyzeResponse::Analysis { analysis, explanation }) => {
            Ok(AnalysisResult::from_reply(analysis, explanation))
        }
        Ok(protocol::AnalyzeResponse::Failed { error, message }) => {
            warn!(log_id, error = %error, "classifier reported an error");
            Err(AnalysisError::Backend { message: message.unwrap_or_else(|| error.clone()), code: error })
        }
        Err(e) => {
            warn!(log_id, error = %format!("{e:#}"), "classifier unreachable");
            Err(AnalysisError::Connection(format!("{e:#}")))
        }
    }
}

fn finish(entries: &Mutex<HashMap<LogId, Entry>>, log_id: LogId, request_id: u64, outcome: &AnalysisOutcome) {
    let mut entries = lock(entries);
    let Some(entry) = entries.get_mut(&log_id) else { return };
    if !matches!(entry.request, Some((id, _)) if id == request_id) {
        return;
    }
    entry.request = None;
    entry.status = match outcome {
        Ok(_) => AnalysisStatus::Completed,
        Err(_) => AnalysisStatus::Error,
    };
    entry.outcome = Some(outcome.clone());
    debug!(log_id, request_id, status = %entry.status, "analysis finished");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
