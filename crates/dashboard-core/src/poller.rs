use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::ports::{FeedObserver, FeedSource, FetchHalf, WindowQuery};
use crate::stats::{AggregateSnapshot, StatsAggregator};
use crate::types::{AnalysisStatus, LogEvent, LogId, StatusMap};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_WINDOW_SIZE: usize = 20;

/// Latest published feed state.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    /// Tick that produced this state; 0 until the first tick lands.
    pub seq: u64,
    pub window: Arc<Vec<LogEvent>>,
    pub statuses: Arc<StatusMap>,
    /// Set while the most recent tick failed to refresh the window.
    pub window_error: Option<String>,
    /// Set while the most recent tick failed to refresh the status map.
    pub status_error: Option<String>,
    /// True once any window fetch has succeeded.
    pub loaded: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl FeedSnapshot {
    pub fn is_degraded(&self) -> bool {
        self.window_error.is_some() || self.status_error.is_some()
    }

    pub fn backend_status(&self, log_id: LogId) -> AnalysisStatus {
        self.statuses.get(&log_id).copied().unwrap_or_default()
    }

    pub fn aggregate(&self) -> AggregateSnapshot {
        StatsAggregator::compute(&self.window)
    }
}

/// What happened to the result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Applied { seq: u64, window_ok: bool, statuses_ok: bool },
    /// A newer tick had already been applied.
    Stale { seq: u64, latest: u64 },
    /// The poller was stopped before the result arrived.
    Stopped { seq: u64 },
}

/// Scheduling state shared with the driver. `epoch` is bumped on every resume so the
/// driver restarts its cadence even when a pause and a resume land between two wakeups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Schedule {
    live: bool,
    epoch: u64,
}

struct Shared<S> {
    source: Arc<S>,
    query: Mutex<WindowQuery>,
    next_seq: AtomicU64,
    stopped: AtomicBool,
    state: watch::Sender<FeedSnapshot>,
    observer: Option<Arc<dyn FeedObserver>>,
}

/// Keeps a bounded log window and the backend status map fresh on a fixed cadence.
pub struct FeedPoller<S: FeedSource + 'static> {
    shared: Arc<Shared<S>>,
    schedule: watch::Sender<Schedule>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl<S: FeedSource + 'static> FeedPoller<S> {
    pub fn new(source: S) -> Self {
        Self::from_arc(Arc::new(source))
    }

    pub fn from_arc(source: Arc<S>) -> Self {
        let (state, _) = watch::channel(FeedSnapshot::default());
        let (schedule, _) = watch::channel(Schedule { live: true, epoch: 0 });
        Self {
            shared: Arc::new(Shared {
                source,
                query: Mutex::new(WindowQuery::latest(DEFAULT_WINDOW_SIZE)),
                next_seq: AtomicU64::new(1),
                stopped: AtomicBool::new(false),
                state,
                observer: None,
            }),
            schedule,
            driver: Mutex::new(None),
        }
    }

    /// Attach an observer. Only valid before the poller is shared.
    pub fn with_observer(mut self, observer: Arc<dyn FeedObserver>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.observer = Some(observer);
        } else {
            warn!("observer attached after the poller was shared; ignoring");
        }
        self
    }

    /// Restrict the window to one system, or lift the restriction. Applies from the next tick.
    pub fn set_system_filter(&self, system_id: Option<String>) {
        lock(&self.shared.query).system_id = system_id;
    }

    /// Begin polling: one tick now, then one every `every`.
    ///
    /// Calling `start` again replaces the cadence. Fails once the poller has been stopped.
    pub fn start(&self, every: Duration, window_size: usize) -> Result<()> {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return Err(anyhow!("feed poller has been stopped"));
        }
        if every.is_zero() {
            return Err(anyhow!("poll interval must be greater than zero"));
        }
        lock(&self.shared.query).limit = window_size;

        let shared = self.shared.clone();
        let schedule = self.schedule.subscribe();
        let handle = tokio::spawn(drive(shared, schedule, every));
        if let Some(previous) = lock(&self.driver).replace(handle) {
            previous.abort();
        }
        info!(interval_ms = every.as_millis() as u64, window_size, "feed poller started");
        Ok(())
    }

    /// Stop scheduling ticks. A tick already in flight is still applied.
    pub fn pause(&self) {
        let paused = self.schedule.send_if_modified(|schedule| std::mem::replace(&mut schedule.live, false));
        if paused {
            info!("feed poller paused");
        }
    }

    /// Resume scheduling with an immediate tick. No-op while already live.
    pub fn resume(&self) {
        let resumed = self.schedule.send_if_modified(|schedule| {
            if schedule.live {
                return false;
            }
            schedule.live = true;
            schedule.epoch += 1;
            true
        });
        if resumed {
            info!("feed poller resumed");
        }
    }

    pub fn is_live(&self) -> bool {
        self.schedule.borrow().live
    }

    /// Sequence number of the most recently issued tick, 0 before the first.
    pub fn last_issued(&self) -> u64 {
        self.shared.next_seq.load(Ordering::SeqCst) - 1
    }

    /// Tear down. No state change is published after this returns.
    pub fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(driver) = lock(&self.driver).take() {
            driver.abort();
        }
        // Wait out any apply currently holding the state lock.
        self.shared.state.send_if_modified(|_| false);
        info!("feed poller stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Issue one tick outside the cadence.
    pub fn poll_now(&self) -> JoinHandle<TickOutcome> {
        dispatch(&self.shared)
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.shared.state.subscribe()
    }
}

impl<S: FeedSource + 'static> Drop for FeedPoller<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn drive<S: FeedSource + 'static>(
    shared: Arc<Shared<S>>,
    mut schedule: watch::Receiver<Schedule>,
    every: Duration,
) {
    loop {
        let epoch = loop {
            let current = *schedule.borrow_and_update();
            if current.live {
                break current.epoch;
            }
            if schedule.changed().await.is_err() {
                return;
            }
        };

        // The first tick of a fresh interval completes immediately.
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;

                changed = schedule.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let current = *schedule.borrow_and_update();
                    if !current.live || current.epoch != epoch {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if shared.stopped.load(Ordering::SeqCst) {
                        return;
                    }
                    let current = *schedule.borrow();
                    if !current.live || current.epoch != epoch {
                        break;
                    }
                    dispatch(&shared);
                }
            }
        }
    }
}

fn dispatch<S: FeedSource + 'static>(shared: &Arc<Shared<S>>) -> JoinHandle<TickOutcome> {
    let seq = shared.next_seq.fetch_add(1, Ordering::SeqCst);
    let shared = shared.clone();
    tokio::spawn(async move {
        let query = lock(&shared.query).clone();
        debug!(seq, limit = query.limit, system = ?query.system_id, "tick dispatched");
        let (window, statuses) = tokio::join!(
            shared.source.fetch_window(&query),
            shared.source.fetch_statuses(),
        );
        shared.apply(seq, window, statuses)
    })
}

impl<S> Shared<S> {
    fn apply(&self, seq: u64, window: Result<Vec<LogEvent>>, statuses: Result<StatusMap>) -> TickOutcome {
        let (window, window_err) = split(window);
        let (statuses, status_err) = split(statuses);
        let window_msg = window_err.as_ref().map(|e| format!("{e:#}"));
        let status_msg = status_err.as_ref().map(|e| format!("{e:#}"));

        let mut outcome = TickOutcome::Stopped { seq };
        let published = self.state.send_if_modified(|snap| {
            if self.stopped.load(Ordering::SeqCst) {
                return false;
            }
            if seq <= snap.seq {
                outcome = TickOutcome::Stale { seq, latest: snap.seq };
                return false;
            }
            snap.seq = seq;
            if let Some(window) = window {
                snap.window = Arc::new(window);
                snap.loaded = true;
            }
            if let Some(statuses) = statuses {
                snap.statuses = Arc::new(statuses);
            }
            snap.window_error = window_msg;
            snap.status_error = status_msg;
            snap.updated_at = Some(Utc::now());
            outcome = TickOutcome::Applied {
                seq,
                window_ok: window_err.is_none(),
                statuses_ok: status_err.is_none(),
            };
            true
        });

        match &outcome {
            TickOutcome::Applied { .. } => {
                for (half, err) in [(FetchHalf::Window, &window_err), (FetchHalf::Statuses, &status_err)] {
                    if let Some(err) = err {
                        warn!(seq, %half, error = %format!("{err:#}"), "poll tick failed; keeping previous value");
                        if let Some(observer) = &self.observer {
                            observer.on_tick_failed(seq, half, err);
                        }
                    }
                }
                if published {
                    if let Some(observer) = &self.observer {
                        observer.on_published(&self.state.borrow());
                    }
                }
            }
            TickOutcome::Stale { seq, latest } => {
                debug!(seq, latest, "discarding stale tick");
                if let Some(observer) = &self.observer {
                    observer.on_stale_discarded(*seq, *latest);
                }
            }
            TickOutcome::Stopped { seq } => debug!(seq, "discarding tick after stop"),
        }
        outcome
    }
}

fn split<T>(result: Result<T>) -> (Option<T>, Option<anyhow::Error>) {
    match result {
        Ok(value) => (Some(value), None),
        Err(e) => (None, Some(e)),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
