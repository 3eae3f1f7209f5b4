//! Plain-text rendering of feed rows, analysis outcomes and stats.
//!
//! Everything here returns `String`s without styling; [`paint`] adds color at print time.

use chrono::{DateTime, Utc};
use crossterm::style::{Color, Stylize};

use dashboard_core::stats::{system_keys, SeverityCount};
use dashboard_core::{
    AggregateSnapshot, AnalysisOutcome, AnalysisStatus, ClassificationPresenter, FeedRow, LogEvent, LogId, Severity,
    ThemeColor,
};
use protocol::{DailyStatsRow, ReportRecord, SystemRecord};

pub const EMPTY_MESSAGE: &str = "Empty Message";
const BAR_WIDTH: usize = 30;

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%d/%m/%Y %H:%M:%S").to_string()
}

pub fn message_line(event: &LogEvent) -> String {
    event.message_text().unwrap_or_else(|| EMPTY_MESSAGE.to_string())
}

pub fn status_badge(status: AnalysisStatus) -> Option<&'static str> {
    match status {
        AnalysisStatus::Idle => None,
        AnalysisStatus::Analyzing => Some("[Analyzing...]"),
        AnalysisStatus::Completed => Some("[Completed]"),
        AnalysisStatus::Error => Some("[Failed]"),
    }
}

pub fn severity_color(severity: Severity) -> ThemeColor {
    ClassificationPresenter::theme_for(severity).color
}

pub fn paint(text: &str, color: ThemeColor) -> String {
    let color = match color {
        ThemeColor::Slate => Color::Grey,
        ThemeColor::Yellow => Color::Yellow,
        ThemeColor::Red => Color::Red,
        ThemeColor::Green => Color::Green,
    };
    text.with(color).to_string()
}

/// `[01/05/2024 10:11:12] #12 billing      ATTENTION (worker-1) payment declined [Completed]`
pub fn feed_line(row: &FeedRow) -> String {
    let event = &row.event;
    let mut line = format!(
        "[{}] #{} {:<12} {:<9}",
        format_timestamp(&event.created_at),
        event.id,
        event.system_id,
        event.level.as_str().to_uppercase(),
    );
    if let Some(container) = event.container() {
        line.push_str(&format!(" ({container})"));
    }
    line.push(' ');
    line.push_str(&message_line(event));
    if let Some(badge) = status_badge(row.status) {
        line.push(' ');
        line.push_str(badge);
    }
    line
}

/// Verdict for a finished analysis, or the failure message.
pub fn analysis_lines(log_id: LogId, outcome: &AnalysisOutcome) -> (ThemeColor, Vec<String>) {
    match outcome {
        Ok(result) => {
            let theme = ClassificationPresenter::theme_for(result.category);
            let mut lines = vec![
                format!("#{log_id} {}", theme.label),
                ClassificationPresenter::verdict(&theme),
            ];
            if let Some(explanation) = result.explanation.as_deref().filter(|e| !e.trim().is_empty()) {
                lines.push(explanation.to_string());
            }
            (theme.color, lines)
        }
        Err(err) => (ThemeColor::Red, vec![format!("#{log_id} analysis failed: {err}")]),
    }
}

/// Headline cards of the stats page.
pub fn headline_cards(stats: &AggregateSnapshot, systems: usize) -> Vec<String> {
    vec![
        format!("Total logs:         {}", stats.total),
        format!("Errors:             {}", stats.count(Severity::Error)),
        format!("Attention:          {}", stats.count(Severity::Attention)),
        format!("Registered systems: {systems}"),
    ]
}

/// One bar per non-empty severity, in display order.
pub fn distribution_lines(stats: &AggregateSnapshot) -> Vec<(Severity, String)> {
    stats
        .distribution
        .iter()
        .map(|&SeverityCount { severity, count }| {
            let share = if stats.total == 0 { 0.0 } else { count as f64 / stats.total as f64 };
            let filled = (share * BAR_WIDTH as f64).round() as usize;
            let line = format!(
                "{:<9} {:>4} {:>5.1}% {}",
                ClassificationPresenter::theme_for(severity).label,
                count,
                share * 100.0,
                "#".repeat(filled),
            );
            (severity, line)
        })
        .collect()
}

/// Table of the backend's daily series. Missing system counts are zero.
pub fn daily_table(rows: &[DailyStatsRow]) -> Vec<String> {
    let systems = system_keys(rows);
    if systems.is_empty() {
        return vec!["No daily data".to_string()];
    }
    let width = systems.iter().map(String::len).max().unwrap_or(0).max(5);

    let mut header = format!("{:<10}", "date");
    for system in &systems {
        header.push_str(&format!(" {system:>width$}"));
    }
    let mut lines = vec![header];
    for row in rows {
        let mut line = format!("{:<10}", row.date);
        for system in &systems {
            let count = row.counts.get(system).copied().unwrap_or(0);
            line.push_str(&format!(" {count:>width$}"));
        }
        lines.push(line);
    }
    lines
}

/// Day by system counts derived from the fetched window. Missing pairs are zero.
pub fn window_daily_table(stats: &AggregateSnapshot) -> Vec<String> {
    let systems: Vec<&str> = stats.systems().into_iter().collect();
    if systems.is_empty() {
        return vec!["No logs in window".to_string()];
    }
    let width = systems.iter().map(|s| s.len()).max().unwrap_or(0).max(5);

    let mut header = format!("{:<10}", "date");
    for system in &systems {
        header.push_str(&format!(" {system:>width$}"));
    }
    let mut lines = vec![header];
    for day in stats.daily.keys() {
        let mut line = format!("{:<10}", day.format("%Y-%m-%d"));
        for system in &systems {
            line.push_str(&format!(" {:>width$}", stats.daily_count(*day, system)));
        }
        lines.push(line);
    }
    lines
}

pub fn system_line(system: &SystemRecord) -> String {
    let mut line = format!("{:<12} {:<24} {:<10} {}", system.id, system.name, system.status, system.client_email);
    if let Some(client) = system.client_name.as_deref() {
        line.push_str(&format!(" ({client})"));
    }
    line
}

pub fn report_line(report: &ReportRecord) -> String {
    let summary = report.content.lines().next().unwrap_or_default();
    format!(
        "[{}] report #{} {} log #{}: {}",
        format_timestamp(&report.created_at),
        report.id,
        report.system_id,
        report.log_id,
        summary,
    )
}
