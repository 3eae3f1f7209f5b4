use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

use backend_client::HttpBackend;
use dashboard_core::{
    AnalysisCoordinator, AnalysisOutcome, AnalysisStatus, DashboardCore, FeedObserver, FeedPoller, FeedRow,
    FeedSnapshot, FeedView, LogId, ThemeColor,
};

use crate::render;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveCommand {
    Analyze(LogId),
    Pause,
    Resume,
    Quit,
    Help,
}

pub fn parse_command(line: &str) -> Result<LiveCommand, String> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next().unwrap_or_default();
    let arg = parts.next();
    match (cmd, arg) {
        ("a" | "analyze", Some(id)) => id
            .trim_start_matches('#')
            .parse()
            .map(LiveCommand::Analyze)
            .map_err(|_| format!("not a log id: {id}")),
        ("a" | "analyze", None) => Err("usage: a <log id>".to_string()),
        ("p" | "pause", None) => Ok(LiveCommand::Pause),
        ("r" | "resume", None) => Ok(LiveCommand::Resume),
        ("q" | "quit", None) => Ok(LiveCommand::Quit),
        ("h" | "help" | "?", None) => Ok(LiveCommand::Help),
        _ => Err(format!("unknown command: {}", line.trim())),
    }
}

const HELP: &str = "commands: a <id> analyze | p pause | r resume | q quit";

/// Forwards feed diagnostics to tracing. Failed halves are already logged by the poller.
struct TracingObserver;

impl FeedObserver for TracingObserver {
    fn on_published(&self, snapshot: &FeedSnapshot) {
        debug!(seq = snapshot.seq, logs = snapshot.window.len(), "feed updated");
    }

    fn on_stale_discarded(&self, seq: u64, latest: u64) {
        debug!(seq, latest, "discarded stale tick");
    }
}

/// Tracks what was already printed so each row is shown once per status change.
#[derive(Default)]
pub struct FeedPrinter {
    shown: HashMap<LogId, AnalysisStatus>,
    degraded: bool,
}

impl FeedPrinter {
    /// Rows that are new or whose status changed, oldest first.
    pub fn changes<'a>(&mut self, view: &'a FeedView) -> Vec<&'a FeedRow> {
        let mut out = Vec::new();
        for row in view.rows.iter().rev() {
            if self.shown.insert(row.event.id, row.status) != Some(row.status) {
                out.push(row);
            }
        }
        let visible: HashSet<LogId> = view.rows.iter().map(|r| r.event.id).collect();
        self.shown.retain(|id, _| visible.contains(id));
        out
    }

    /// `Some(new state)` when the degraded indicator flips.
    pub fn degraded_changed(&mut self, view: &FeedView) -> Option<bool> {
        let now = view.is_degraded();
        (now != self.degraded).then(|| {
            self.degraded = now;
            now
        })
    }

    fn print(&mut self, view: &FeedView) {
        match self.degraded_changed(view) {
            Some(true) => {
                let reason = view.window_error.as_deref().or(view.status_error.as_deref()).unwrap_or_default();
                let notice = format!("! backend unreachable, showing last data ({reason})");
                eprintln!("{}", render::paint(&notice, ThemeColor::Yellow));
            }
            Some(false) => eprintln!("{}", render::paint("backend reachable again", ThemeColor::Green)),
            None => {}
        }
        for row in self.changes(view) {
            let color = render::severity_color(row.event.level);
            println!("{}", render::paint(&render::feed_line(row), color));
        }
    }
}

fn print_outcome(log_id: LogId, outcome: &AnalysisOutcome) {
    let (color, lines) = render::analysis_lines(log_id, outcome);
    for line in lines {
        println!("  {}", render::paint(&line, color));
    }
}

pub async fn run(backend: Arc<HttpBackend>, system: Option<String>, every: Duration, window: usize) -> Result<()> {
    let poller = FeedPoller::from_arc(backend.clone()).with_observer(Arc::new(TracingObserver));
    let core = DashboardCore::new(poller, AnalysisCoordinator::from_arc(backend.clone()));
    core.poller().set_system_filter(system.clone());

    let mut updates = core.poller().subscribe();
    core.poller().start(every, window)?;
    info!(url = backend.base_url(), system = system.as_deref().unwrap_or("all"), "live feed started");
    println!("{HELP}");

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(LogId, AnalysisOutcome)>();
    let mut printer = FeedPrinter::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                printer.print(&core.project(&snapshot));
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    stdin_open = false;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(LiveCommand::Analyze(log_id)) => {
                        let handle = core.request_analysis(log_id);
                        if handle.dispatched() {
                            println!("analyzing #{log_id}...");
                        } else {
                            println!("#{log_id} is already being analyzed");
                        }
                        let done = done_tx.clone();
                        tokio::spawn(async move {
                            let outcome = handle.outcome().await;
                            let _ = done.send((log_id, outcome));
                        });
                        printer.print(&core.view());
                    }
                    Ok(LiveCommand::Pause) => {
                        core.poller().pause();
                        println!("paused");
                    }
                    Ok(LiveCommand::Resume) => {
                        core.poller().resume();
                        println!("resumed");
                    }
                    Ok(LiveCommand::Quit) => break,
                    Ok(LiveCommand::Help) => println!("{HELP}"),
                    Err(msg) => println!("{msg}\n{HELP}"),
                }
            }
            Some((log_id, outcome)) = done_rx.recv() => {
                print_outcome(log_id, &outcome);
                printer.print(&core.view());
            }
            _ = &mut ctrl_c => break,
        }
    }

    core.poller().stop();
    info!("live feed stopped");
    Ok(())
}
