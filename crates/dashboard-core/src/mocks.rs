//! In-crate fakes for demos and tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{oneshot, Notify, Semaphore};

use crate::poller::FeedSnapshot;
use crate::ports::{Classifier, FeedObserver, FeedSource, FetchHalf, WindowQuery};
use crate::types::{LogEvent, LogId, Severity, StatusMap};

/// Build a log event with a plain message.
pub fn sample_event(id: LogId, system_id: &str, level: &str) -> LogEvent {
    LogEvent {
        id,
        system_id: system_id.to_string(),
        level: Severity::fold(Some(level)),
        raw_level: level.to_string(),
        content: serde_json::json!({ "message": format!("event {id}") }),
        created_at: Utc::now(),
    }
}

/// Answers every fetch immediately from fixed data. Either half can be made to fail.
#[derive(Default)]
pub struct StaticSource {
    window: Mutex<Vec<LogEvent>>,
    statuses: Mutex<StatusMap>,
    window_failure: Mutex<Option<String>>,
    status_failure: Mutex<Option<String>>,
    window_calls: AtomicUsize,
    status_calls: AtomicUsize,
    last_query: Mutex<Option<WindowQuery>>,
}

impl StaticSource {
    pub fn new(window: Vec<LogEvent>, statuses: StatusMap) -> Self {
        Self { window: Mutex::new(window), statuses: Mutex::new(statuses), ..Self::default() }
    }

    pub fn set_window(&self, window: Vec<LogEvent>) {
        *self.window.lock().unwrap() = window;
    }

    pub fn set_statuses(&self, statuses: StatusMap) {
        *self.statuses.lock().unwrap() = statuses;
    }

    pub fn fail_window(&self, reason: Option<&str>) {
        *self.window_failure.lock().unwrap() = reason.map(str::to_string);
    }

    pub fn fail_statuses(&self, reason: Option<&str>) {
        *self.status_failure.lock().unwrap() = reason.map(str::to_string);
    }

    pub fn window_calls(&self) -> usize {
        self.window_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<WindowQuery> {
        self.last_query.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedSource for StaticSource {
    async fn fetch_window(&self, query: &WindowQuery) -> Result<Vec<LogEvent>> {
        self.window_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some(query.clone());
        if let Some(reason) = self.window_failure.lock().unwrap().clone() {
            return Err(anyhow!(reason));
        }
        let window = self.window.lock().unwrap();
        Ok(window.iter().take(query.limit).cloned().collect())
    }

    async fn fetch_statuses(&self) -> Result<StatusMap> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.status_failure.lock().unwrap().clone() {
            return Err(anyhow!(reason));
        }
        Ok(self.statuses.lock().unwrap().clone())
    }
}

/// Each fetch waits for a reply the test sends explicitly, in call order.
#[derive(Default)]
pub struct GatedSource {
    windows: Mutex<VecDeque<oneshot::Receiver<Result<Vec<LogEvent>>>>>,
    statuses: Mutex<VecDeque<oneshot::Receiver<Result<StatusMap>>>>,
    window_calls: AtomicUsize,
    called: Notify,
}

impl GatedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the reply for the next window fetch.
    pub fn expect_window(&self) -> oneshot::Sender<Result<Vec<LogEvent>>> {
        let (tx, rx) = oneshot::channel();
        self.windows.lock().unwrap().push_back(rx);
        tx
    }

    /// Queue the reply for the next status fetch.
    pub fn expect_statuses(&self) -> oneshot::Sender<Result<StatusMap>> {
        let (tx, rx) = oneshot::channel();
        self.statuses.lock().unwrap().push_back(rx);
        tx
    }

    pub fn window_calls(&self) -> usize {
        self.window_calls.load(Ordering::SeqCst)
    }

    /// Resolve once at least `n` window fetches have started.
    pub async fn wait_for_window_calls(&self, n: usize) {
        loop {
            let notified = self.called.notified();
            if self.window_calls() >= n {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl FeedSource for GatedSource {
    async fn fetch_window(&self, _query: &WindowQuery) -> Result<Vec<LogEvent>> {
        let gate = self.windows.lock().unwrap().pop_front();
        self.window_calls.fetch_add(1, Ordering::SeqCst);
        self.called.notify_waiters();
        match gate {
            Some(rx) => rx.await.map_err(|_| anyhow!("window reply dropped"))?,
            None => Err(anyhow!("unexpected window fetch")),
        }
    }

    async fn fetch_statuses(&self) -> Result<StatusMap> {
        let gate = self.statuses.lock().unwrap().pop_front();
        match gate {
            Some(rx) => rx.await.map_err(|_| anyhow!("status reply dropped"))?,
            None => Err(anyhow!("unexpected status fetch")),
        }
    }
}

/// Classifier that replies with a fixed response once released.
pub struct MockClassifier {
    reply: Mutex<Result<protocol::AnalyzeResponse, String>>,
    calls: AtomicUsize,
    release: Semaphore,
}

impl MockClassifier {
    /// Replies immediately with `category`.
    pub fn answering(category: &str) -> Self {
        let classifier = Self::held(category);
        classifier.release.add_permits(Semaphore::MAX_PERMITS / 2);
        classifier
    }

    /// Replies with `category` only after [`MockClassifier::release`].
    pub fn held(category: &str) -> Self {
        Self {
            reply: Mutex::new(Ok(protocol::AnalyzeResponse::Analysis {
                analysis: Some(category.to_string()),
                explanation: None,
            })),
            calls: AtomicUsize::new(0),
            release: Semaphore::new(0),
        }
    }

    pub fn reply_with(&self, reply: protocol::AnalyzeResponse) {
        *self.reply.lock().unwrap() = Ok(reply);
    }

    /// Make the next replies fail as if the service were unreachable.
    pub fn unreachable(&self, reason: &str) {
        *self.reply.lock().unwrap() = Err(reason.to_string());
    }

    /// Let `n` pending or future calls complete.
    pub fn release(&self, n: usize) {
        self.release.add_permits(n);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn analyze(&self, _log_id: LogId) -> Result<protocol::AnalyzeResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let permit = self.release.acquire().await?;
        permit.forget();
        self.reply.lock().unwrap().clone().map_err(|reason| anyhow!(reason))
    }
}

/// Records every observer notification.
#[derive(Default)]
pub struct RecordingObserver {
    pub published: Mutex<Vec<u64>>,
    pub failures: Mutex<Vec<(u64, FetchHalf, String)>>,
    pub stale: Mutex<Vec<(u64, u64)>>,
}

impl FeedObserver for RecordingObserver {
    fn on_published(&self, snapshot: &FeedSnapshot) {
        self.published.lock().unwrap().push(snapshot.seq);
    }

    fn on_tick_failed(&self, seq: u64, half: FetchHalf, error: &anyhow::Error) {
        self.failures.lock().unwrap().push((seq, half, error.to_string()));
    }

    fn on_stale_discarded(&self, seq: u64, latest: u64) {
        self.stale.lock().unwrap().push((seq, latest));
    }
}
